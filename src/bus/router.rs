//! Per-thread dispatch.
//!
//! A thread component implements [`EventHandler`] and its run loop feeds
//! every message popped from its own bus through [`EventRouter`]. The
//! handler runs synchronously on the owning thread; anything that must
//! happen elsewhere is posted to another bus.

use core::time::Duration;
use log::{debug, info, warn};

use super::{Event, Message, MessageBus, RecvError};

/// Component that owns one bus and reacts to its events.
pub trait EventHandler {
    /// Handle one decoded event. Events the component does not care about
    /// are logged and ignored by the implementation.
    fn on_event(&mut self, event: Event);
}

/// Outcome of a single [`EventRouter::pump`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Dispatched,
    /// Message arrived but could not be decoded; it was dropped.
    Dropped,
    Idle,
    Closed,
}

/// Stateless decode-and-dispatch helper bound to one thread name.
#[derive(Debug, Clone, Copy)]
pub struct EventRouter {
    name: &'static str,
}

impl EventRouter {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Decode `msg` and hand it to `handler`. Returns `false` when the
    /// message was not recognised.
    pub fn dispatch<H: EventHandler + ?Sized>(&self, handler: &mut H, msg: &Message) -> bool {
        match Event::decode(msg) {
            Some(event) => {
                handler.on_event(event);
                true
            }
            None => {
                warn!("[{}] unsupported event {:?}, dropped", self.name, msg);
                false
            }
        }
    }

    /// Receive at most one message from `bus` and dispatch it.
    pub fn pump<H: EventHandler + ?Sized>(
        &self,
        bus: &MessageBus,
        handler: &mut H,
        timeout: Option<Duration>,
    ) -> Pump {
        match bus.receive(timeout) {
            Ok(msg) => {
                if self.dispatch(handler, &msg) {
                    Pump::Dispatched
                } else {
                    Pump::Dropped
                }
            }
            Err(RecvError::Timeout) => Pump::Idle,
            Err(RecvError::Closed) => Pump::Closed,
        }
    }

    /// Drain `bus` forever. Returns once every producer handle is gone.
    pub fn run<H: EventHandler + ?Sized>(&self, bus: &MessageBus, handler: &mut H) {
        info!("[{}] event loop started", self.name);
        loop {
            if self.pump(bus, handler, None) == Pump::Closed {
                break;
            }
        }
        debug!("[{}] all producers gone, event loop exiting", self.name);
    }
}
