//! Smart-home attribute model for the lamp endpoint.
//!
//! The cluster/attribute store is owned by the smart-home stack; the lamp
//! logic only reads and writes it through [`AttributeStore`]. Identifiers
//! follow the Zigbee Cluster Library numbering the stack uses.

use heapless::FnvIndexMap;
use log::debug;

use crate::error::DeviceError;

pub type ClusterId = u32;
pub type AttributeId = u32;

pub mod cluster {
    use super::ClusterId;

    pub const IDENTIFY: ClusterId = 0x0003;
    pub const GROUPS: ClusterId = 0x0004;
    pub const ON_OFF: ClusterId = 0x0006;
    pub const LEVEL_CONTROL: ClusterId = 0x0008;
    pub const COLOR_CONTROL: ClusterId = 0x0300;
}

pub mod attribute {
    use super::AttributeId;

    /// OnOff cluster.
    pub const ON_OFF: AttributeId = 0x0000;
    /// LevelControl cluster.
    pub const CURRENT_LEVEL: AttributeId = 0x0000;
    /// ColorControl cluster.
    pub const CURRENT_HUE: AttributeId = 0x0000;
    pub const CURRENT_SATURATION: AttributeId = 0x0001;
    pub const COLOR_TEMPERATURE_MIREDS: AttributeId = 0x0007;
    pub const COLOR_MODE: AttributeId = 0x0008;
}

/// Typed attribute value as delivered by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    U8(u8),
    NullableU8(Option<u8>),
    U16(u16),
}

impl AttrValue {
    pub fn as_bool(self) -> Result<bool, DeviceError> {
        match self {
            Self::Bool(b) => Ok(b),
            _ => Err(DeviceError::InvalidValue),
        }
    }

    pub fn as_u8(self) -> Result<u8, DeviceError> {
        match self {
            Self::U8(v) | Self::NullableU8(Some(v)) => Ok(v),
            _ => Err(DeviceError::InvalidValue),
        }
    }

    pub fn as_u16(self) -> Result<u16, DeviceError> {
        match self {
            Self::U16(v) => Ok(v),
            Self::U8(v) => Ok(u16::from(v)),
            _ => Err(DeviceError::InvalidValue),
        }
    }
}

/// Color mode values of the ColorControl cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorMode {
    HueSaturation = 0,
    Xy = 1,
    ColorTemperature = 2,
}

/// Port to the endpoint's attribute store.
pub trait AttributeStore {
    fn read(&self, cluster: ClusterId, attribute: AttributeId) -> Result<AttrValue, DeviceError>;

    fn write(
        &mut self,
        cluster: ClusterId,
        attribute: AttributeId,
        value: AttrValue,
    ) -> Result<(), DeviceError>;

    fn on_off(&self) -> Result<bool, DeviceError> {
        self.read(cluster::ON_OFF, attribute::ON_OFF)?.as_bool()
    }

    fn set_on_off(&mut self, on: bool) -> Result<(), DeviceError> {
        self.write(cluster::ON_OFF, attribute::ON_OFF, AttrValue::Bool(on))
    }

    fn color_temperature(&self) -> Result<u16, DeviceError> {
        self.read(cluster::COLOR_CONTROL, attribute::COLOR_TEMPERATURE_MIREDS)?
            .as_u16()
    }

    fn set_color_temperature(&mut self, mireds: u16) -> Result<(), DeviceError> {
        self.write(
            cluster::COLOR_CONTROL,
            attribute::COLOR_TEMPERATURE_MIREDS,
            AttrValue::U16(mireds),
        )
    }
}

/// Endpoint defaults applied when the light endpoint is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightConfig {
    pub on_off: bool,
    pub current_level: u8,
    pub color_mode: ColorMode,
    pub color_temperature_mireds: u16,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            on_off: true,
            current_level: 64,
            color_mode: ColorMode::ColorTemperature,
            // Stack default for an extended color light.
            color_temperature_mireds: 250,
        }
    }
}

const STORE_CAPACITY: usize = 8;

/// In-memory attribute store for the light endpoint.
///
/// Only attributes created from [`LightConfig`] exist; reads or writes of
/// anything else fail with [`DeviceError::Attribute`].
#[derive(Debug, Clone)]
pub struct LocalAttributeStore {
    attrs: FnvIndexMap<(ClusterId, AttributeId), AttrValue, STORE_CAPACITY>,
}

impl LocalAttributeStore {
    pub fn new(config: &LightConfig) -> Self {
        let mut attrs = FnvIndexMap::new();
        let initial = [
            ((cluster::ON_OFF, attribute::ON_OFF), AttrValue::Bool(config.on_off)),
            (
                (cluster::LEVEL_CONTROL, attribute::CURRENT_LEVEL),
                AttrValue::NullableU8(Some(config.current_level)),
            ),
            (
                (cluster::COLOR_CONTROL, attribute::COLOR_MODE),
                AttrValue::U8(config.color_mode as u8),
            ),
            (
                (cluster::COLOR_CONTROL, attribute::COLOR_TEMPERATURE_MIREDS),
                AttrValue::U16(config.color_temperature_mireds),
            ),
            ((cluster::COLOR_CONTROL, attribute::CURRENT_HUE), AttrValue::U8(128)),
            (
                (cluster::COLOR_CONTROL, attribute::CURRENT_SATURATION),
                AttrValue::U8(254),
            ),
        ];
        for (key, value) in initial {
            // Capacity exceeds the attribute count above.
            let _ = attrs.insert(key, value);
        }
        Self { attrs }
    }
}

impl Default for LocalAttributeStore {
    fn default() -> Self {
        Self::new(&LightConfig::default())
    }
}

impl AttributeStore for LocalAttributeStore {
    fn read(&self, cluster: ClusterId, attribute: AttributeId) -> Result<AttrValue, DeviceError> {
        self.attrs
            .get(&(cluster, attribute))
            .copied()
            .ok_or(DeviceError::Attribute)
    }

    fn write(
        &mut self,
        cluster: ClusterId,
        attribute: AttributeId,
        value: AttrValue,
    ) -> Result<(), DeviceError> {
        let slot = self
            .attrs
            .get_mut(&(cluster, attribute))
            .ok_or(DeviceError::Attribute)?;
        if core::mem::discriminant(slot) != core::mem::discriminant(&value) {
            return Err(DeviceError::InvalidValue);
        }
        debug!(
            "Attr: 0x{:04x}/0x{:04x} {:?} -> {:?}",
            cluster, attribute, slot, value
        );
        *slot = value;
        Ok(())
    }
}
