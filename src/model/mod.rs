//! Wire data model exchanged with the companion controller.

pub mod lamp;

pub use lamp::{LampModel, LampVerb};
