//! LED node application thread.
//!
//! Drives the user LED from button toggles and GATT writes, mirrors the BLE
//! connection on a status LED, and notifies subscribed centrals of every
//! LED change.

use std::sync::Arc;

use embedded_hal::digital::{OutputPin, PinState};
use log::{debug, info, warn};

use crate::bus::{Event, EventHandler};
use crate::error::NotifyError;

use super::led_service::{GattNotifier, LedService};

pub struct LedNode<U, S, N> {
    user_led: U,
    status_led: S,
    notifier: N,
    service: Arc<LedService>,
    led_on: bool,
}

impl<U, S, N> LedNode<U, S, N>
where
    U: OutputPin,
    S: OutputPin,
    N: GattNotifier,
{
    pub fn new(user_led: U, status_led: S, notifier: N, service: Arc<LedService>) -> Self {
        Self {
            user_led,
            status_led,
            notifier,
            service,
            led_on: false,
        }
    }

    /// Drive both LEDs to their initial state.
    pub fn start(&mut self) {
        let state = PinState::from(self.led_on);
        if let Err(e) = self.user_led.set_state(state) {
            warn!("LED node: user LED: {:?}", e);
        }
        if let Err(e) = self.status_led.set_low() {
            warn!("LED node: status LED: {:?}", e);
        }
        self.service.publish(self.led_on);
        info!("LED node: started (led={})", self.led_on);
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn set_led(&mut self, on: bool) {
        self.led_on = on;
        self.service.publish(on);
        if let Err(e) = self.user_led.set_state(PinState::from(on)) {
            warn!("LED node: user LED: {:?}", e);
        }
        match self.service.notify(&mut self.notifier, on) {
            Ok(()) => debug!("LED node: notified led={}", on),
            Err(NotifyError::NotSubscribed) => debug!("LED node: no subscriber"),
            Err(e) => warn!("LED node: notify failed: {}", e),
        }
    }

    fn set_status(&mut self, connected: bool) {
        info!(
            "LED node: central {}",
            if connected { "connected" } else { "disconnected" }
        );
        if let Err(e) = self.status_led.set_state(PinState::from(connected)) {
            warn!("LED node: status LED: {:?}", e);
        }
    }
}

impl<U, S, N> EventHandler for LedNode<U, S, N>
where
    U: OutputPin,
    S: OutputPin,
    N: GattNotifier,
{
    fn on_event(&mut self, event: Event) {
        match event {
            Event::ToggleLed => self.set_led(!self.led_on),
            Event::SetLed(on) => self.set_led(on),
            Event::BleConnection { connected } => self.set_status(connected),
            Event::Null => debug!("LED node: null event"),
            other => warn!("LED node: unsupported event {:?}", other),
        }
    }
}
