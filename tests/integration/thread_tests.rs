//! Whole lamp node on real threads: application thread, device-protocol
//! thread, TCP worker and button poller, wired exactly as `main` wires
//! them but with mock ports.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use lampnode::app::{AppContext, MainQueue, PanelThread};
use lampnode::bus::{BusHandle, Event, EventHandler, EventRouter, MessageBus};
use lampnode::config::NodeConfig;
use lampnode::device::{LightConfig, LightDevice, LocalAttributeStore};
use lampnode::drivers::button;
use lampnode::drivers::task_pin::{self, Core, TaskSpec};
use lampnode::net::{ConnectionManager, ConnectionSettings};

use crate::mock_hw::{DriverCall, MockButton, MockDriver, MockSocketFactory, SocketLog};

const PANEL_TASK: TaskSpec = TaskSpec::new(Core::Pro, 6, 64, "panel-test\0");
const MAIN_TASK: TaskSpec = TaskSpec::new(Core::App, 5, 64, "main-test\0");
const BUTTON_TASK: TaskSpec = TaskSpec::new(Core::App, 4, 64, "button-test\0");

const WAIT: Duration = Duration::from_secs(3);

struct Node {
    ctx: AppContext,
    driver: MockDriver,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

fn serve<H>(spec: TaskSpec, name: &'static str, bus: MessageBus, mut handler: H, stop: Arc<AtomicBool>) -> JoinHandle<()>
where
    H: EventHandler + Send + 'static,
{
    task_pin::spawn_on_core(spec, move || {
        let router = EventRouter::new(name);
        while !stop.load(Ordering::Acquire) {
            router.pump(&bus, &mut handler, Some(Duration::from_millis(10)));
        }
    })
    .unwrap()
}

impl Node {
    fn start(factory: MockSocketFactory) -> Self {
        let config = NodeConfig::default();
        let (ctx, buses) = AppContext::new(&config);
        let stop = Arc::new(AtomicBool::new(false));
        let driver = MockDriver::new();

        let connection = ConnectionManager::new(
            factory,
            ConnectionSettings::from_config(&config),
            ctx.panel.clone(),
        );
        let panel = PanelThread::new(ctx.clone(), connection);

        let store = LocalAttributeStore::new(&LightConfig::default());
        let light = LightDevice::new(store, driver.clone());
        let app = MainQueue::new(ctx.clone(), light, config.button_gpio);

        let threads = vec![
            serve(PANEL_TASK, "panel", buses.panel, panel, Arc::clone(&stop)),
            serve(MAIN_TASK, "main", buses.main, app, Arc::clone(&stop)),
        ];
        Self {
            ctx,
            driver,
            stop,
            threads,
        }
    }

    fn panel(&self) -> &BusHandle {
        &self.ctx.panel
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        for t in self.threads {
            t.join().unwrap();
        }
    }
}

fn wait_for(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_sent(log: &SocketLog, count: usize) -> Vec<String> {
    wait_for("outbound update", || log.sent().len() >= count);
    log.sent()
}

#[test]
fn peer_request_update_reports_current_state() {
    let factory = MockSocketFactory::new();
    let log = factory.log();
    let peer = factory.accept();
    let node = Node::start(factory);

    node.panel()
        .post_event(Event::NetworkAvailable(true), Duration::ZERO)
        .unwrap();
    peer.send(r#"{"device":"lamp-esp","event":"req-update","arg0":0,"arg1":0}"#);

    // Default endpoint: on, 250 mireds -> white.
    let sent = wait_sent(&log, 1);
    assert_eq!(sent[0], r#"{"device":"lamp-esp","event":"update","arg0":0,"arg1":1}"#);
    node.stop();
}

#[test]
fn peer_clicks_cycle_the_lamp() {
    let factory = MockSocketFactory::new();
    let log = factory.log();
    let peer = factory.accept();
    let node = Node::start(factory);

    node.panel()
        .post_event(Event::NetworkAvailable(true), Duration::ZERO)
        .unwrap();
    for _ in 0..3 {
        peer.send(r#"{"device":"lamp-esp","event":"user-click","arg0":2,"arg1":0}"#);
    }

    let sent = wait_sent(&log, 3);
    let states: Vec<i64> = sent
        .iter()
        .map(|s| {
            let v: serde_json::Value = serde_json::from_str(s).unwrap();
            v["arg1"].as_i64().unwrap()
        })
        .collect();
    // White -> Yellow -> Red -> Off.
    assert_eq!(states, vec![2, 3, 0]);
    assert_eq!(node.driver.last(), Some(DriverCall::Power(false)));
    node.stop();
}

#[test]
fn unknown_button_from_peer_changes_nothing() {
    let factory = MockSocketFactory::new();
    let log = factory.log();
    let peer = factory.accept();
    let node = Node::start(factory);

    node.panel()
        .post_event(Event::NetworkAvailable(true), Duration::ZERO)
        .unwrap();
    peer.send(r#"{"device":"lamp-esp","event":"user-click","arg0":7,"arg1":0}"#);
    peer.send(r#"{"device":"lamp-esp","event":"req-update","arg0":0,"arg1":0}"#);

    let sent = wait_sent(&log, 1);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].ends_with(r#""arg1":1}"#));
    assert!(node.driver.calls().is_empty());
    node.stop();
}

#[test]
fn boot_button_click_advances_the_lamp_offline() {
    let node = Node::start(MockSocketFactory::new());
    let pin = MockButton::new();
    let config = NodeConfig::default();
    button::spawn_poller(
        BUTTON_TASK,
        pin.clone(),
        Duration::from_millis(5),
        node.ctx.main.clone(),
        Event::ButtonClick { pin: config.button_gpio },
    )
    .unwrap();

    pin.press();
    std::thread::sleep(Duration::from_millis(120));
    pin.release();

    // White -> Yellow: 1_000_000 / 520 mireds.
    wait_for("driver update", || {
        node.driver.calls().contains(&DriverCall::Temperature(1923))
    });
    assert_eq!(node.driver.last(), Some(DriverCall::Power(true)));
    node.stop();
}
