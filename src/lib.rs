//! Lamp accessory firmware library.
//!
//! Exposes the portable modules for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod ble;
pub mod bus;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod model;
pub mod net;
