//! Periodic software timer.
//!
//! A dedicated thread posts `System.SoftwareTimer` to one bus at a fixed
//! period. Posting uses a zero timeout so a busy owner only loses ticks,
//! and the thread exits once the owner is gone.

use core::time::Duration;
use std::thread::JoinHandle;

use log::debug;

use crate::bus::{BusHandle, Event, PostError};
use crate::drivers::task_pin::{self, TaskSpec};

pub fn spawn_ticker(
    spec: TaskSpec,
    id: u32,
    period: Duration,
    bus: BusHandle,
) -> std::io::Result<JoinHandle<()>> {
    task_pin::spawn_on_core(spec, move || {
        loop {
            std::thread::sleep(period);
            if bus.post_event(Event::SoftwareTimer { id }, Duration::ZERO) == Err(PostError::Closed) {
                debug!("Timer[{}]: {} gone, stopping", id, bus.name());
                break;
            }
        }
    })
}
