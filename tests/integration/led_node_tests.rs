//! LED node: characteristic writes and button toggles reach the LED
//! through the node's bus, and subscribed centrals hear about every change.

use core::time::Duration;
use std::sync::Arc;

use lampnode::ble::led_service::CCC_NOTIFY;
use lampnode::ble::{LedNode, LedService};
use lampnode::bus::{BusHandle, Event, EventRouter, MessageBus, Pump};
use lampnode::drivers::button;
use lampnode::drivers::task_pin::{Core, TaskSpec};
use lampnode::error::AttError;

use crate::mock_hw::{MockButton, MockNotifier, MockPin};

struct Rig {
    node: LedNode<MockPin, MockPin, MockNotifier>,
    bus: MessageBus,
    handle: BusHandle,
    service: Arc<LedService>,
    user: MockPin,
    status: MockPin,
    notifier: MockNotifier,
    router: EventRouter,
}

impl Rig {
    fn new() -> Self {
        let (bus, handle) = MessageBus::new("led", 32);
        let service = Arc::new(LedService::new(handle.clone()));
        let (user, status, notifier) = (MockPin::new(), MockPin::new(), MockNotifier::new());
        let mut node = LedNode::new(user.clone(), status.clone(), notifier.clone(), Arc::clone(&service));
        node.start();
        Self {
            node,
            bus,
            handle,
            service,
            user,
            status,
            notifier,
            router: EventRouter::new("led-test"),
        }
    }

    fn pump(&mut self, timeout: Duration) -> Pump {
        self.router.pump(&self.bus, &mut self.node, Some(timeout))
    }
}

#[test]
fn start_drives_both_leds_low() {
    let rig = Rig::new();
    assert_eq!(rig.user.level(), Some(false));
    assert_eq!(rig.status.level(), Some(false));
    assert_eq!(rig.service.on_read(), 0);
}

#[test]
fn central_write_drives_led_and_read_reflects_it() {
    let mut rig = Rig::new();
    assert_eq!(rig.service.on_write(&[1], 0), Ok(1));
    assert_eq!(rig.pump(Duration::ZERO), Pump::Dispatched);

    assert!(rig.node.led_on());
    assert_eq!(rig.user.level(), Some(true));
    assert_eq!(rig.service.on_read(), 1);
    // No subscription yet.
    assert!(rig.notifier.sent().is_empty());
}

#[test]
fn subscribed_central_is_notified_of_toggles() {
    let mut rig = Rig::new();
    rig.service.on_ccc_changed(CCC_NOTIFY);

    rig.handle.post_event(Event::ToggleLed, Duration::ZERO).unwrap();
    rig.handle.post_event(Event::ToggleLed, Duration::ZERO).unwrap();
    rig.pump(Duration::ZERO);
    rig.pump(Duration::ZERO);

    assert_eq!(rig.notifier.sent(), vec![vec![1], vec![0]]);
    assert_eq!(rig.user.history(), vec![false, true, false]);

    rig.service.on_ccc_changed(0);
    rig.handle.post_event(Event::ToggleLed, Duration::ZERO).unwrap();
    rig.pump(Duration::ZERO);
    assert_eq!(rig.notifier.sent().len(), 2);
}

#[test]
fn rejected_writes_leave_led_untouched() {
    let mut rig = Rig::new();
    assert_eq!(rig.service.on_write(&[7], 0), Err(AttError::ValueNotAllowed));
    assert_eq!(rig.service.on_write(&[1, 1], 0), Err(AttError::InvalidAttributeLen));
    assert_eq!(rig.service.on_write(&[1], 2), Err(AttError::InvalidOffset));
    assert_eq!(rig.pump(Duration::ZERO), Pump::Idle);
    assert!(!rig.node.led_on());
}

#[test]
fn status_led_follows_ble_link() {
    let mut rig = Rig::new();
    rig.handle
        .post_event(Event::BleConnection { connected: true }, Duration::ZERO)
        .unwrap();
    rig.pump(Duration::ZERO);
    assert_eq!(rig.status.level(), Some(true));

    rig.handle
        .post_event(Event::BleConnection { connected: false }, Duration::ZERO)
        .unwrap();
    rig.pump(Duration::ZERO);
    assert_eq!(rig.status.level(), Some(false));
    assert!(!rig.node.led_on());
}

#[test]
fn button_press_toggles_led() {
    let mut rig = Rig::new();
    let pin = MockButton::new();
    let spec = TaskSpec::new(Core::App, 4, 64, "led-button\0");
    button::spawn_poller(spec, pin.clone(), Duration::from_millis(5), rig.handle.clone(), Event::ToggleLed)
        .unwrap();

    pin.press();
    std::thread::sleep(Duration::from_millis(120));
    pin.release();

    assert_eq!(rig.pump(Duration::from_secs(2)), Pump::Dispatched);
    assert!(rig.node.led_on());
    assert_eq!(rig.user.level(), Some(true));
}
