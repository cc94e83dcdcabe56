//! Application thread.
//!
//! Owns the lamp endpoint. Peer commands arrive forwarded from the
//! device-protocol thread; the boot button arrives from the input thread.
//! State changes are pushed back to the peer as `App.DeviceUpdate`.

use log::{info, warn};

use crate::bus::event::{DeviceKind, UserCommand};
use crate::bus::{Event, EventHandler};
use crate::device::attributes::{AttrValue, AttributeId, ClusterId};
use crate::device::{AttributeAction, AttributeStore, LampState, LightDevice, LightDriver};
use crate::error::DeviceError;

use super::context::AppContext;

/// Button identifiers shared with the companion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ButtonId {
    LampEspOn = 2,
}

pub struct MainQueue<A, D> {
    ctx: AppContext,
    light: LightDevice<A, D>,
    boot_button_gpio: u16,
}

impl<A: AttributeStore, D: LightDriver> MainQueue<A, D> {
    pub fn new(ctx: AppContext, light: LightDevice<A, D>, boot_button_gpio: u16) -> Self {
        Self {
            ctx,
            light,
            boot_button_gpio,
        }
    }

    pub fn light(&self) -> &LightDevice<A, D> {
        &self.light
    }

    /// Entry point for attribute writes made by the smart-home stack.
    pub fn on_attribute_update(
        &mut self,
        cluster: ClusterId,
        attribute: AttributeId,
        value: AttrValue,
    ) -> Result<AttributeAction, DeviceError> {
        self.light
            .on_attribute_update(cluster, attribute, value)
            .inspect_err(|e| warn!("Main: attribute 0x{:04x}/0x{:04x}: {}", cluster, attribute, e))
    }

    fn publish_state(&self, state: LampState) {
        let event = Event::DeviceUpdate {
            device: DeviceKind::Lamp,
            state: state.wire(),
        };
        // Full/closed are logged by the bus.
        let _ = self.ctx.panel.post_event(event, self.ctx.post_timeout);
    }

    fn on_user_command(&mut self, cmd: UserCommand) {
        match cmd {
            UserCommand::ReqUpdate => match self.light.get_state() {
                Ok(state) => self.publish_state(state),
                Err(e) => warn!("Main: state read failed: {}", e),
            },
            UserCommand::Click { button } if button == ButtonId::LampEspOn as u32 => {
                match self.light.click_button_on() {
                    Ok(state) => self.publish_state(state),
                    Err(e) => warn!("Main: click failed: {}", e),
                }
            }
            UserCommand::Click { button } => warn!("Main: unsupported button {}", button),
        }
    }
}

impl<A: AttributeStore, D: LightDriver> EventHandler for MainQueue<A, D> {
    fn on_event(&mut self, event: Event) {
        match event {
            Event::UserCommand(cmd) => self.on_user_command(cmd),
            Event::ButtonClick { pin } if pin == self.boot_button_gpio => {
                info!("Main: boot button click");
                let click = Event::UserCommand(UserCommand::Click {
                    button: ButtonId::LampEspOn as u32,
                });
                let _ = self.ctx.main.post_event(click, self.ctx.post_timeout);
            }
            Event::ButtonClick { pin } => info!("Main: click on unmapped pin {}", pin),
            Event::Null => info!("Main: null event"),
            other => warn!("Main: unsupported event {:?}", other),
        }
    }
}
