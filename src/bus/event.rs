//! Typed view of [`Message`].
//!
//! Handlers never look at raw `i_param` / `u_param` / `l_param`; they
//! `match` on [`Event`]. Decoding is the single place where an unknown
//! sub-discriminant is detected.

use crate::error::ConnectionError;

use super::{EventId, Message};

/// Command the companion controller (or the local button) issues to the
/// application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Peer asked for the current lamp state.
    ReqUpdate,
    /// Simulated or physical click on `button`.
    Click { button: u32 },
}

/// Device whose state is being pushed to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DeviceKind {
    Lamp = 1,
}

/// Worker verdict on one TCP session.
pub type TcpReport = Result<(), ConnectionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Null,

    // --- App ---
    UserCommand(UserCommand),
    /// Current state of `device`, encoded as its wire integer.
    DeviceUpdate { device: DeviceKind, state: u32 },
    /// Outcome reported by the network worker for `session`.
    TcpConnection { session: u16, report: TcpReport },

    // --- System ---
    /// Debounced single click on the GPIO `pin`.
    ButtonClick { pin: u16 },
    NetworkAvailable(bool),
    SoftwareTimer { id: u32 },

    // --- BLE LED node ---
    ToggleLed,
    BleConnection { connected: bool },
    SetLed(bool),
}

// Sub-discriminants carried in `i_param`.
const APP_USER_COMMAND: i16 = 1;
const APP_DEVICE_UPDATE: i16 = 2;
const APP_TCP_CONNECTION: i16 = 3;

const SYS_BUTTON_CLICK: i16 = 1;
const SYS_NETWORK_AVAILABLE: i16 = 2;
const SYS_SOFTWARE_TIMER: i16 = 3;

const CMD_REQ_UPDATE: u16 = 1;
const CMD_CLICK: u16 = 2;

const INPUT_TOGGLE_LED: i16 = 1;
const BLE_DISCONNECTED: i16 = 1;
const BLE_CONNECTED: i16 = 2;
const BLE_SET_LED: i16 = 1;

impl Event {
    pub const fn encode(self) -> Message {
        match self {
            Self::Null => Message::null(),
            Self::UserCommand(UserCommand::ReqUpdate) => {
                Message::new(EventId::App, APP_USER_COMMAND, CMD_REQ_UPDATE, 0)
            }
            Self::UserCommand(UserCommand::Click { button }) => {
                Message::new(EventId::App, APP_USER_COMMAND, CMD_CLICK, button)
            }
            Self::DeviceUpdate { device, state } => {
                Message::new(EventId::App, APP_DEVICE_UPDATE, device as u16, state)
            }
            Self::TcpConnection { session, report } => {
                let code = match report {
                    Ok(()) => 0,
                    Err(e) => e.code(),
                };
                Message::new(EventId::App, APP_TCP_CONNECTION, session, code)
            }
            Self::ButtonClick { pin } => Message::new(EventId::System, SYS_BUTTON_CLICK, pin, 0),
            Self::NetworkAvailable(up) => {
                Message::new(EventId::System, SYS_NETWORK_AVAILABLE, up as u16, 0)
            }
            Self::SoftwareTimer { id } => Message::new(EventId::System, SYS_SOFTWARE_TIMER, 0, id),
            Self::ToggleLed => Message::new(EventId::UserInput, INPUT_TOGGLE_LED, 0, 0),
            Self::BleConnection { connected } => Message::new(
                EventId::BleConnection,
                if connected { BLE_CONNECTED } else { BLE_DISCONNECTED },
                0,
                0,
            ),
            Self::SetLed(on) => Message::new(EventId::BleLed, BLE_SET_LED, 0, on as u32),
        }
    }

    /// `None` when the sub-discriminant or a parameter is not recognised.
    pub const fn decode(msg: &Message) -> Option<Self> {
        let ev = match (msg.event, msg.i_param) {
            (EventId::Null, _) => Self::Null,

            (EventId::App, APP_USER_COMMAND) => match msg.u_param {
                CMD_REQ_UPDATE => Self::UserCommand(UserCommand::ReqUpdate),
                CMD_CLICK => Self::UserCommand(UserCommand::Click {
                    button: msg.l_param,
                }),
                _ => return None,
            },
            (EventId::App, APP_DEVICE_UPDATE) => match msg.u_param {
                1 => Self::DeviceUpdate {
                    device: DeviceKind::Lamp,
                    state: msg.l_param,
                },
                _ => return None,
            },
            (EventId::App, APP_TCP_CONNECTION) => {
                let report = if msg.l_param == 0 {
                    Ok(())
                } else {
                    match ConnectionError::from_code(msg.l_param) {
                        Some(e) => Err(e),
                        None => return None,
                    }
                };
                Self::TcpConnection {
                    session: msg.u_param,
                    report,
                }
            }

            (EventId::System, SYS_BUTTON_CLICK) => Self::ButtonClick { pin: msg.u_param },
            (EventId::System, SYS_NETWORK_AVAILABLE) => Self::NetworkAvailable(msg.u_param != 0),
            (EventId::System, SYS_SOFTWARE_TIMER) => Self::SoftwareTimer { id: msg.l_param },

            (EventId::UserInput, INPUT_TOGGLE_LED) => Self::ToggleLed,
            (EventId::BleConnection, BLE_CONNECTED) => Self::BleConnection { connected: true },
            (EventId::BleConnection, BLE_DISCONNECTED) => Self::BleConnection { connected: false },
            (EventId::BleLed, BLE_SET_LED) => Self::SetLed(msg.l_param != 0),

            _ => return None,
        };
        Some(ev)
    }

    /// Namespace this event is posted under.
    pub const fn id(self) -> EventId {
        self.encode().event
    }
}
