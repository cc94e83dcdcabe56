//! Lamp endpoint: attribute store port and state controller.

pub mod attributes;
pub mod light;

pub use attributes::{AttrValue, AttributeStore, LightConfig, LocalAttributeStore};
pub use light::{AttributeAction, LampState, LightDevice, LightDriver};
