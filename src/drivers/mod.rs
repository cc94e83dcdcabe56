//! Peripheral drivers and thread helpers.

pub mod button;
pub mod led;
pub mod task_pin;
pub mod ticker;
