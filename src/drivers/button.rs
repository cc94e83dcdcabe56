//! Polled, debounced single-click button.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up (the XIAO boot button on the
//! lamp node, a board button on the LED node). The input thread samples the
//! level every `button_poll_ms` and feeds it to [`Button::tick`].
//!
//! ## Detection
//!
//! | Phase     | Condition                         | Output  |
//! |-----------|-----------------------------------|---------|
//! | Debounce  | level stable for `DEBOUNCE_MS`    |         |
//! | Pressed   | debounced level is "pressed"      |         |
//! | Release   | debounced release after a press   | `Click` |
//!
//! Long holds still yield one click on release.

use core::time::Duration;

use embedded_hal::digital::InputPin;
use log::{debug, warn};

use crate::bus::{BusHandle, Event, PostError};
use crate::drivers::task_pin::{self, TaskSpec};

pub const DEBOUNCE_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Released,
    Pressed,
}

pub struct Button {
    phase: Phase,
    /// Raw level seen on the previous tick and when it last changed.
    raw: bool,
    raw_since_ms: u32,
}

impl Button {
    pub fn new() -> Self {
        Self {
            phase: Phase::Released,
            raw: false,
            raw_since_ms: 0,
        }
    }

    /// Feed one sample. `pressed` is the logical (already inverted) level.
    pub fn tick(&mut self, now_ms: u32, pressed: bool) -> Option<ButtonEvent> {
        if pressed != self.raw {
            self.raw = pressed;
            self.raw_since_ms = now_ms;
            return None;
        }
        if now_ms.wrapping_sub(self.raw_since_ms) < DEBOUNCE_MS {
            return None;
        }

        match (self.phase, pressed) {
            (Phase::Released, true) => {
                self.phase = Phase::Pressed;
                None
            }
            (Phase::Pressed, false) => {
                self.phase = Phase::Released;
                Some(ButtonEvent::Click)
            }
            _ => None,
        }
    }
}

impl Default for Button {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample `pin` every `period` and post `on_click` with zero timeout for
/// each click. The thread exits when the target bus owner is gone.
pub fn spawn_poller<P>(
    spec: TaskSpec,
    mut pin: P,
    period: Duration,
    bus: BusHandle,
    on_click: Event,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    P: InputPin + Send + 'static,
{
    task_pin::spawn_on_core(spec, move || {
        let mut button = Button::new();
        let started = std::time::Instant::now();
        loop {
            std::thread::sleep(period);
            // Active low.
            let pressed = match pin.is_low() {
                Ok(level) => level,
                Err(e) => {
                    warn!("Button: read failed: {:?}", e);
                    continue;
                }
            };
            let now_ms = started.elapsed().as_millis() as u32;
            if button.tick(now_ms, pressed) == Some(ButtonEvent::Click) {
                debug!("Button: click -> {}", bus.name());
                if bus.post_event(on_click, Duration::ZERO) == Err(PostError::Closed) {
                    break;
                }
            }
        }
    })
}
