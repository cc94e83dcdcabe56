//! Device-protocol thread.
//!
//! Owns the [`ConnectionManager`]. Translates network events into session
//! transitions, forwards peer commands to the application thread, and
//! pushes lamp state to the peer.

use std::time::Instant;

use log::{debug, info, warn};

use crate::bus::event::DeviceKind;
use crate::bus::{Event, EventHandler};
use crate::model::lamp::{self, LampModel};
use crate::net::{ConnectionManager, SocketFactory};

use super::context::AppContext;

pub struct PanelThread<F: SocketFactory> {
    ctx: AppContext,
    connection: ConnectionManager<F>,
}

impl<F: SocketFactory> PanelThread<F> {
    pub fn new(ctx: AppContext, connection: ConnectionManager<F>) -> Self {
        Self { ctx, connection }
    }

    pub fn connection(&self) -> &ConnectionManager<F> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<F> {
        &mut self.connection
    }

    fn push_update(&self, device: DeviceKind, state: u32) {
        if !self.connection.is_connected() {
            warn!("Panel: invalid socket, update for {:?} dropped", device);
            return;
        }
        let text = match LampModel::build(lamp::NAME, lamp::UPDATE, 0, state as i32).stringify() {
            Ok(text) => text,
            Err(e) => {
                warn!("Panel: {}", e);
                return;
            }
        };
        match self.connection.send(text.as_bytes()) {
            Ok(()) => debug!("Panel: sent {}", text),
            Err(e) => warn!("Panel: send failed: {}", e),
        }
    }
}

impl<F: SocketFactory> EventHandler for PanelThread<F> {
    fn on_event(&mut self, event: Event) {
        match event {
            Event::DeviceUpdate { device, state } => self.push_update(device, state),
            Event::UserCommand(_) => {
                let _ = self.ctx.main.post_event(event, self.ctx.post_timeout);
            }
            Event::TcpConnection { session, report } => {
                self.connection
                    .on_tcp_connection(session, report, Instant::now());
            }
            Event::NetworkAvailable(up) => {
                self.connection.on_network_available(up, Instant::now());
            }
            Event::SoftwareTimer { .. } => self.connection.poll(Instant::now()),
            Event::Null => info!("Panel: null event"),
            other => warn!("Panel: unsupported event {:?}", other),
        }
    }
}
