//! Lamp node thread components.
//!
//! ```text
//!   input/timer ──▶ [main bus]  ──▶ MainQueue   ── DeviceUpdate ──▶ [panel bus]
//!   net stack   ──▶ [panel bus] ──▶ PanelThread ── UserCommand  ──▶ [main bus]
//!                                      │
//!                                      └── ConnectionManager ── worker ──▶ [panel bus]
//! ```

pub mod context;
pub mod main_queue;
pub mod panel;

pub use context::{AppBuses, AppContext};
pub use main_queue::{ButtonId, MainQueue};
pub use panel::PanelThread;
