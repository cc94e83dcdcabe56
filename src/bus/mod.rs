//! Cross-thread message bus.
//!
//! Every thread that owns state also owns exactly one [`MessageBus`] and
//! drains it in its run loop. Other threads, network-stack callbacks and
//! timer threads only ever hold a [`BusHandle`] and post plain-data
//! [`Message`]s to it.
//!
//! ```text
//!  callbacks ─┐
//!  worker ────┼──▶ BusHandle::post ──▶ [ bounded FIFO ] ──▶ MessageBus::receive ──▶ EventRouter
//!  threads ───┘
//! ```
//!
//! ## Post policy
//!
//! - `timeout == 0`: drop if full. Callback and timer contexts use this.
//! - `timeout > 0`: block at most `timeout`, then give up with
//!   [`PostError::Full`].
//! - Owner gone: [`PostError::Closed`] plus a diagnostic; never a panic.

pub mod event;
pub mod router;

use core::time::Duration;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use log::{debug, warn};

pub use crate::error::PostError;
pub use event::Event;
pub use router::{EventHandler, EventRouter, Pump};

// ───────────────────────────────────────────────────────────────
// Message
// ───────────────────────────────────────────────────────────────

/// Event namespace carried in [`Message::event`].
///
/// The sub-discriminant of each namespace lives in `i_param`; see
/// [`Event`] for the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EventId {
    Null = 0,
    App = 1,
    System = 2,
    UserInput = 3,
    BleConnection = 4,
    BleLed = 5,
}

/// Fixed-size, plain-data event record. The only thing that ever crosses
/// a thread boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub event: EventId,
    pub i_param: i16,
    pub u_param: u16,
    pub l_param: u32,
}

impl Message {
    pub const fn new(event: EventId, i_param: i16, u_param: u16, l_param: u32) -> Self {
        Self {
            event,
            i_param,
            u_param,
            l_param,
        }
    }

    pub const fn null() -> Self {
        Self::new(EventId::Null, 0, 0, 0)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        event.encode()
    }
}

// ───────────────────────────────────────────────────────────────
// Receive errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// Nothing arrived within the timeout.
    Timeout,
    /// Every producer handle has been dropped and the queue is empty.
    Closed,
}

// ───────────────────────────────────────────────────────────────
// BusHandle (producer side)
// ───────────────────────────────────────────────────────────────

/// Cloneable producer handle to one bus.
#[derive(Debug, Clone)]
pub struct BusHandle {
    name: &'static str,
    tx: Sender<Message>,
}

impl BusHandle {
    /// Name of the owning thread, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue `msg`, waiting at most `timeout` for space.
    pub fn post(&self, msg: Message, timeout: Duration) -> Result<(), PostError> {
        let result = if timeout.is_zero() {
            self.tx.try_send(msg).map_err(|e| match e {
                TrySendError::Full(_) => PostError::Full,
                TrySendError::Disconnected(_) => PostError::Closed,
            })
        } else {
            self.tx.send_timeout(msg, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PostError::Full,
                SendTimeoutError::Disconnected(_) => PostError::Closed,
            })
        };

        match result {
            Err(PostError::Full) => {
                warn!("Bus[{}]: queue full, dropping {:?}", self.name, msg);
            }
            Err(PostError::Closed) => {
                debug!("Bus[{}]: owner gone, discarding {:?}", self.name, msg);
            }
            Ok(()) => {}
        }
        result
    }

    /// Typed convenience over [`post`](Self::post).
    pub fn post_event(&self, event: Event, timeout: Duration) -> Result<(), PostError> {
        self.post(event.encode(), timeout)
    }

    /// Number of queued messages not yet received.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

// ───────────────────────────────────────────────────────────────
// MessageBus (consumer side)
// ───────────────────────────────────────────────────────────────

/// Bounded FIFO owned by exactly one consuming thread.
#[derive(Debug)]
pub struct MessageBus {
    name: &'static str,
    rx: Receiver<Message>,
    capacity: usize,
}

impl MessageBus {
    /// Create a bus holding at most `capacity` messages, returning the
    /// owner side and a first producer handle.
    pub fn new(name: &'static str, capacity: usize) -> (Self, BusHandle) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                name,
                rx,
                capacity: capacity.max(1),
            },
            BusHandle { name, tx },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Blocking pop. `None` waits until a message arrives or every
    /// producer is gone.
    pub fn receive(&self, timeout: Option<Duration>) -> Result<Message, RecvError> {
        match timeout {
            None => self.rx.recv().map_err(|_| RecvError::Closed),
            Some(t) => self.rx.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => RecvError::Timeout,
                RecvTimeoutError::Disconnected => RecvError::Closed,
            }),
        }
    }

    /// Non-blocking pop.
    pub fn try_receive(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}
