//! Lamp control wire message.
//!
//! One compact JSON object per TCP read:
//!
//! ```text
//! {"device":"lamp-esp","event":"update","arg0":0,"arg1":2}
//! ```
//!
//! `device` and `event` are required; `arg0`/`arg1` default to `0`.

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Device name this protocol's peer uses for the lamp node.
pub const NAME: &str = "lamp-esp";

pub const REQ_UPDATE: &str = "req-update";
pub const USER_CLICK: &str = "user-click";
pub const UPDATE: &str = "update";

/// Recognised values of the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampVerb {
    /// Peer asks for the current lamp state.
    ReqUpdate,
    /// Peer simulates a click; `arg0` is the button id.
    UserClick,
    /// State push; `arg1` is the encoded `LampState`.
    Update,
}

impl LampVerb {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            REQ_UPDATE => Some(Self::ReqUpdate),
            USER_CLICK => Some(Self::UserClick),
            UPDATE => Some(Self::Update),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReqUpdate => REQ_UPDATE,
            Self::UserClick => USER_CLICK,
            Self::Update => UPDATE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LampModel {
    device: String,
    event: String,
    arg0: i32,
    arg1: i32,
}

/// Inbound shape; required fields are checked after deserialisation so the
/// error names the missing key.
#[derive(Deserialize)]
struct Inbound {
    device: Option<String>,
    event: Option<String>,
    #[serde(default)]
    arg0: i32,
    #[serde(default)]
    arg1: i32,
}

impl LampModel {
    pub fn build(device: &str, event: &str, arg0: i32, arg1: i32) -> Self {
        Self {
            device: device.into(),
            event: event.into(),
            arg0,
            arg1,
        }
    }

    /// Decode a fresh model from one inbound chunk.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        let mut model = Self::default();
        model.parse(Some(text))?;
        Ok(model)
    }

    /// Replace the content with the decoded `text`. On error the previous
    /// content is left untouched.
    pub fn parse(&mut self, text: Option<&str>) -> Result<(), WireError> {
        let text = text.ok_or(WireError::MissingInput)?;
        if text.trim().is_empty() {
            return Err(WireError::Malformed);
        }
        let inbound: Inbound = serde_json::from_str(text).map_err(|_| WireError::Malformed)?;
        let device = inbound.device.ok_or(WireError::MissingField("device"))?;
        let event = inbound.event.ok_or(WireError::MissingField("event"))?;

        *self = Self {
            device,
            event,
            arg0: inbound.arg0,
            arg1: inbound.arg1,
        };
        Ok(())
    }

    /// Compact JSON encoding of the current content.
    pub fn stringify(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|_| WireError::Encode)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn arg0(&self) -> i32 {
        self.arg0
    }

    pub fn arg1(&self) -> i32 {
        self.arg1
    }

    pub fn verb(&self) -> Option<LampVerb> {
        LampVerb::from_wire(&self.event)
    }

    /// Whether the message names this node.
    pub fn is_for_lamp(&self) -> bool {
        self.device == NAME
    }
}
