//! LED GATT service semantics.
//!
//! One characteristic with read / write / notify over a single boolean.
//!
//! | Attribute        | UUID                                   | Perms            |
//! |------------------|----------------------------------------|------------------|
//! | LED service      | `00001523-1212-efde-1523-785feabcd123` | primary          |
//! | LED state        | `00001525-1212-efde-1523-785feabcd123` | Read+Write+Notify|
//!
//! The BLE stack calls into [`LedService`] from its own task; the service
//! only touches atomics and posts to the LED node bus with zero timeout.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use log::debug;

use crate::bus::{BusHandle, Event};
use crate::error::{AttError, NotifyError};

pub const SERVICE_UUID: u128 = 0x0000_1523_1212_efde_1523_785f_eabc_d123;
pub const CHAR_LED_UUID: u128 = 0x0000_1525_1212_efde_1523_785f_eabc_d123;

/// Client Characteristic Configuration value enabling notifications.
pub const CCC_NOTIFY: u16 = 0x0001;

/// Sends a notification for the LED characteristic to subscribed centrals.
pub trait GattNotifier {
    fn notify(&mut self, value: &[u8]) -> Result<(), NotifyError>;
}

#[derive(Debug)]
pub struct LedService {
    led_state: AtomicBool,
    notify_enabled: AtomicBool,
    bus: BusHandle,
}

impl LedService {
    pub fn new(bus: BusHandle) -> Self {
        Self {
            led_state: AtomicBool::new(false),
            notify_enabled: AtomicBool::new(false),
            bus,
        }
    }

    /// Characteristic write. Returns the number of bytes accepted.
    pub fn on_write(&self, data: &[u8], offset: u16) -> Result<usize, AttError> {
        if data.len() != 1 {
            debug!("LED write: bad length {}", data.len());
            return Err(AttError::InvalidAttributeLen);
        }
        if offset != 0 {
            debug!("LED write: bad offset {}", offset);
            return Err(AttError::InvalidOffset);
        }
        let on = match data[0] {
            0x00 => false,
            0x01 => true,
            other => {
                debug!("LED write: value 0x{:02x} not allowed", other);
                return Err(AttError::ValueNotAllowed);
            }
        };
        // Dropped if the node is busy; the central can retry.
        let _ = self.bus.post_event(Event::SetLed(on), Duration::ZERO);
        Ok(data.len())
    }

    /// Characteristic read: current LED state as one byte.
    pub fn on_read(&self) -> u8 {
        u8::from(self.led_state.load(Ordering::Acquire))
    }

    pub fn on_ccc_changed(&self, value: u16) {
        let enabled = value == CCC_NOTIFY;
        debug!("LED CCC: 0x{:04x} (notify={})", value, enabled);
        self.notify_enabled.store(enabled, Ordering::Release);
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled.load(Ordering::Acquire)
    }

    /// Record the state the LED node has applied.
    pub fn publish(&self, on: bool) {
        self.led_state.store(on, Ordering::Release);
    }

    pub fn notify<N: GattNotifier + ?Sized>(
        &self,
        notifier: &mut N,
        on: bool,
    ) -> Result<(), NotifyError> {
        if !self.notify_enabled() {
            return Err(NotifyError::NotSubscribed);
        }
        notifier.notify(&[u8::from(on)])
    }
}
