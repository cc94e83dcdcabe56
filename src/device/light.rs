//! Lamp endpoint controller.
//!
//! Translates lamp-level states into attribute writes and LED driver calls.
//! Owned by the application thread; nothing here is shared.
//!
//! ```text
//!   Off ──click──▶ ColorWhite ──click──▶ ColorYellow ──click──▶ ColorRed
//!    ▲                                                             │
//!    └──────────────────────────click──────────────────────────────┘
//! ```

use log::{info, warn};

use crate::error::DeviceError;

use super::attributes::{AttrValue, AttributeId, AttributeStore, ClusterId, attribute, cluster};

/// Color temperature presets in mireds.
pub const MIREDS_WHITE: u16 = 160;
pub const MIREDS_YELLOW: u16 = 520;
pub const MIREDS_RED: u16 = 1700;

/// Midpoints between presets; a value exactly on a midpoint belongs to the
/// cooler preset.
pub const WHITE_YELLOW_SPLIT: u16 = (MIREDS_WHITE + MIREDS_YELLOW) / 2;
pub const YELLOW_RED_SPLIT: u16 = (MIREDS_YELLOW + MIREDS_RED) / 2;

/// Stack value ranges are 0..=254; driver ranges are the usual units.
const STACK_MAX: u32 = 254;
const BRIGHTNESS_MAX: u32 = 100;
const HUE_MAX: u32 = 360;
const SATURATION_MAX: u32 = 100;
const MIREDS_PER_KELVIN: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LampState {
    Off = 0,
    ColorWhite = 1,
    ColorYellow = 2,
    ColorRed = 3,
    On = 4,
}

impl LampState {
    pub const fn wire(self) -> u32 {
        self as u32
    }

    pub const fn from_wire(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Off),
            1 => Some(Self::ColorWhite),
            2 => Some(Self::ColorYellow),
            3 => Some(Self::ColorRed),
            4 => Some(Self::On),
            _ => None,
        }
    }

    /// Classify a color temperature into its preset bucket.
    pub const fn from_mireds(mireds: u16) -> Self {
        if mireds <= WHITE_YELLOW_SPLIT {
            Self::ColorWhite
        } else if mireds <= YELLOW_RED_SPLIT {
            Self::ColorYellow
        } else {
            Self::ColorRed
        }
    }

    /// Next state of the single-button cycle.
    pub const fn next_on_click(self) -> Self {
        match self {
            Self::Off => Self::ColorWhite,
            Self::ColorWhite => Self::ColorYellow,
            Self::ColorYellow => Self::ColorRed,
            Self::ColorRed | Self::On => Self::Off,
        }
    }

    pub const fn mireds(self) -> Option<u16> {
        match self {
            Self::ColorWhite => Some(MIREDS_WHITE),
            Self::ColorYellow => Some(MIREDS_YELLOW),
            Self::ColorRed => Some(MIREDS_RED),
            Self::Off | Self::On => None,
        }
    }
}

/// Port to the physical LED driver.
pub trait LightDriver {
    fn set_power(&mut self, on: bool) -> Result<(), DeviceError>;
    /// Percent, 0..=100.
    fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError>;
    /// Degrees, 0..=360.
    fn set_hue(&mut self, degrees: u16) -> Result<(), DeviceError>;
    /// Percent, 0..=100.
    fn set_saturation(&mut self, percent: u8) -> Result<(), DeviceError>;
    fn set_temperature(&mut self, kelvin: u32) -> Result<(), DeviceError>;
}

/// What an attribute update resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAction {
    /// Forwarded to the driver.
    Applied,
    /// Known cluster that needs no driver action.
    Logged,
    /// Cluster or attribute not handled by the lamp.
    Unsupported,
}

pub struct LightDevice<A, D> {
    store: A,
    driver: D,
}

impl<A: AttributeStore, D: LightDriver> LightDevice<A, D> {
    pub fn new(store: A, driver: D) -> Self {
        Self { store, driver }
    }

    pub fn store(&self) -> &A {
        &self.store
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Derive the lamp state from the power and color temperature
    /// attributes.
    pub fn get_state(&self) -> Result<LampState, DeviceError> {
        if !self.store.on_off()? {
            return Ok(LampState::Off);
        }
        let mireds = self.store.color_temperature()?;
        let state = LampState::from_mireds(mireds);
        info!("Light: {} mireds -> {:?}", mireds, state);
        Ok(state)
    }

    pub fn set_state(&mut self, state: LampState) -> Result<(), DeviceError> {
        if let Some(mireds) = state.mireds() {
            self.store.set_color_temperature(mireds)?;
            self.driver.set_temperature(mireds_to_kelvin(mireds)?)?;
        }
        let on = state != LampState::Off;
        self.store.set_on_off(on)?;
        self.driver.set_power(on)
    }

    /// Advance the single-button cycle and return the new state.
    pub fn click_button_on(&mut self) -> Result<LampState, DeviceError> {
        let last = self.get_state()?;
        let next = last.next_on_click();
        info!("Light: click {:?} -> {:?}", last, next);
        self.set_state(next)?;
        Ok(next)
    }

    /// Mirror an attribute write made by the smart-home stack onto the
    /// driver.
    pub fn on_attribute_update(
        &mut self,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
        value: AttrValue,
    ) -> Result<AttributeAction, DeviceError> {
        match (cluster_id, attribute_id) {
            (cluster::IDENTIFY, _) => {
                info!("Light: Identify attr 0x{:04x} = {:?}", attribute_id, value);
                Ok(AttributeAction::Logged)
            }
            (cluster::GROUPS, _) => {
                info!("Light: Groups attr 0x{:04x} = {:?}", attribute_id, value);
                Ok(AttributeAction::Logged)
            }
            (cluster::ON_OFF, attribute::ON_OFF) => {
                self.driver.set_power(value.as_bool()?)?;
                Ok(AttributeAction::Applied)
            }
            (cluster::LEVEL_CONTROL, attribute::CURRENT_LEVEL) => {
                let AttrValue::NullableU8(Some(level)) = value else {
                    warn!("Light: CurrentLevel with unexpected type {:?}", value);
                    return Err(DeviceError::InvalidValue);
                };
                self.driver
                    .set_brightness(remap(level, BRIGHTNESS_MAX) as u8)?;
                Ok(AttributeAction::Applied)
            }
            (cluster::COLOR_CONTROL, attribute::CURRENT_HUE) => {
                self.driver.set_hue(remap(value.as_u8()?, HUE_MAX) as u16)?;
                Ok(AttributeAction::Applied)
            }
            (cluster::COLOR_CONTROL, attribute::CURRENT_SATURATION) => {
                self.driver
                    .set_saturation(remap(value.as_u8()?, SATURATION_MAX) as u8)?;
                Ok(AttributeAction::Applied)
            }
            (cluster::COLOR_CONTROL, attribute::COLOR_TEMPERATURE_MIREDS) => {
                self.driver
                    .set_temperature(mireds_to_kelvin(value.as_u16()?)?)?;
                Ok(AttributeAction::Applied)
            }
            (cluster::ON_OFF | cluster::LEVEL_CONTROL | cluster::COLOR_CONTROL, _) => {
                warn!(
                    "Light: cluster 0x{:04x} unsupported attribute 0x{:04x}",
                    cluster_id, attribute_id
                );
                Ok(AttributeAction::Unsupported)
            }
            _ => {
                warn!("Light: unsupported cluster 0x{:04x}", cluster_id);
                Ok(AttributeAction::Unsupported)
            }
        }
    }
}

fn remap(value: u8, max: u32) -> u32 {
    u32::from(value) * max / STACK_MAX
}

fn mireds_to_kelvin(mireds: u16) -> Result<u32, DeviceError> {
    if mireds == 0 {
        return Err(DeviceError::InvalidValue);
    }
    Ok(MIREDS_PER_KELVIN / u32::from(mireds))
}
