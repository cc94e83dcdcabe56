//! Wiring between thread components.
//!
//! Built once in `main` and handed by value to each component. Holds only
//! producer handles; every bus is still owned and drained by its thread.

use core::time::Duration;

use crate::bus::{BusHandle, MessageBus};
use crate::config::NodeConfig;

#[derive(Debug, Clone)]
pub struct AppContext {
    /// Application thread: lamp state and button handling.
    pub main: BusHandle,
    /// Device-protocol thread: TCP session and peer updates.
    pub panel: BusHandle,
    /// Bounded wait used by thread handlers when posting.
    pub post_timeout: Duration,
}

/// Owner sides of the lamp node buses, moved into their threads.
#[derive(Debug)]
pub struct AppBuses {
    pub main: MessageBus,
    pub panel: MessageBus,
}

impl AppContext {
    pub fn new(config: &NodeConfig) -> (Self, AppBuses) {
        let (main, main_handle) = MessageBus::new("main", config.main_queue_depth);
        let (panel, panel_handle) = MessageBus::new("panel", config.panel_queue_depth);
        (
            Self {
                main: main_handle,
                panel: panel_handle,
                post_timeout: config.post_timeout(),
            },
            AppBuses { main, panel },
        )
    }
}
