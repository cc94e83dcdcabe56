//! BLE LED node: characteristic semantics, application handler and the
//! Bluedroid binding.

#[cfg(target_os = "espidf")]
pub mod gatt;
pub mod led_node;
pub mod led_service;

pub use led_node::LedNode;
pub use led_service::{GattNotifier, LedService};
