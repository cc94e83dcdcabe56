//! Connection manager driven through the device-protocol thread handler.
//!
//! The test thread plays the device-protocol thread: it owns the panel bus
//! and pumps it, while real worker threads connect and read scripted (or
//! loopback TCP) sockets.

use core::time::Duration;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Instant;

use lampnode::app::{AppContext, PanelThread};
use lampnode::bus::event::{DeviceKind, UserCommand};
use lampnode::bus::{BusHandle, Event, EventRouter, MessageBus, Pump};
use lampnode::config::NodeConfig;
use lampnode::net::{
    ConnectionManager, ConnectionSettings, ConnectionState, SocketFactory, TcpSocketFactory,
};

use crate::mock_hw::MockSocketFactory;

const SETTLE: Duration = Duration::from_secs(3);
const SLICE: Duration = Duration::from_millis(10);

struct Rig<F: SocketFactory> {
    panel: PanelThread<F>,
    panel_bus: MessageBus,
    main_bus: MessageBus,
    handle: BusHandle,
    router: EventRouter,
}

impl<F: SocketFactory> Rig<F> {
    fn new(factory: F, config: &NodeConfig) -> Self {
        let (ctx, buses) = AppContext::new(config);
        let handle = ctx.panel.clone();
        let connection = ConnectionManager::new(
            factory,
            ConnectionSettings::from_config(config),
            ctx.panel.clone(),
        );
        Self {
            panel: PanelThread::new(ctx, connection),
            panel_bus: buses.panel,
            main_bus: buses.main,
            handle,
            router: EventRouter::new("panel-test"),
        }
    }

    fn post(&self, event: Event) {
        self.handle.post_event(event, Duration::ZERO).unwrap();
    }

    fn conn(&self) -> &ConnectionManager<F> {
        self.panel.connection()
    }

    /// Pump the panel bus until `done` holds. Each round also ticks the
    /// timer when `tick` is set.
    fn settle(&mut self, tick: bool, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + SETTLE;
        while Instant::now() < deadline {
            if done(self) {
                return true;
            }
            if tick {
                self.post(Event::SoftwareTimer { id: 1 });
            }
            self.router.pump(&self.panel_bus, &mut self.panel, Some(SLICE));
            assert!(self.conn().live_workers() <= 1, "more than one worker alive");
        }
        done(self)
    }

    fn connect(&mut self) {
        self.post(Event::NetworkAvailable(true));
        assert!(self.settle(false, |r| r.conn().is_connected()), "never connected");
    }
}

fn config(cooldown_ms: u32) -> NodeConfig {
    NodeConfig {
        reconnect_cooldown_ms: cooldown_ms,
        ..NodeConfig::default()
    }
}

fn mock_rig(cooldown_ms: u32) -> (Rig<MockSocketFactory>, MockSocketFactory) {
    let factory = MockSocketFactory::new();
    (Rig::new(factory.clone(), &config(cooldown_ms)), factory)
}

#[test]
fn connects_and_forwards_peer_commands() {
    let (mut rig, factory) = mock_rig(3000);
    let peer = factory.accept();

    rig.connect();
    assert_eq!(rig.conn().session(), Some(1));

    peer.send(r#"{"device":"lamp-esp","event":"req-update","arg0":0,"arg1":0}"#);
    peer.send(r#"{"device":"lamp-esp","event":"user-click","arg0":2,"arg1":0}"#);
    assert!(rig.settle(false, |r| r.main_bus.len() == 2));

    let first = rig.main_bus.try_receive().unwrap();
    let second = rig.main_bus.try_receive().unwrap();
    assert_eq!(Event::decode(&first), Some(Event::UserCommand(UserCommand::ReqUpdate)));
    assert_eq!(
        Event::decode(&second),
        Some(Event::UserCommand(UserCommand::Click { button: 2 }))
    );
}

#[test]
fn malformed_input_keeps_the_session_open() {
    let (mut rig, factory) = mock_rig(3000);
    let peer = factory.accept();
    rig.connect();

    peer.send("{not json");
    peer.send(r#"{"event":"req-update"}"#);
    peer.send(r#"{"device":"lamp-esp","event":"req-update"}"#);
    assert!(rig.settle(false, |r| !r.main_bus.is_empty()));

    assert!(rig.conn().is_connected());
    assert_eq!(factory.log().closes(), 0);
    assert_eq!(rig.main_bus.len(), 1);
}

#[test]
fn peer_close_disconnects_and_reconnects_after_cooldown() {
    let (mut rig, factory) = mock_rig(300);
    let log = factory.log();
    let mut first = factory.accept();
    let _second = factory.accept();
    rig.connect();

    first.hang_up();
    assert!(rig.settle(false, |r| r.conn().state() == ConnectionState::Disconnected));
    assert_eq!(log.closes(), 1, "socket must be closed exactly once");
    assert!(rig.conn().retry_pending());

    // Inside the cooldown the timer does not reconnect.
    rig.post(Event::SoftwareTimer { id: 1 });
    rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
    assert_eq!(log.created(), 1);

    std::thread::sleep(Duration::from_millis(300));
    assert!(rig.settle(true, |r| r.conn().is_connected()));
    assert_eq!(rig.conn().session(), Some(2));
    assert_eq!(log.created(), 2);
    assert_eq!(log.closes(), 1);
}

#[test]
fn network_loss_closes_socket_and_ignores_late_worker_report() {
    let (mut rig, factory) = mock_rig(50);
    let log = factory.log();
    let _peer = factory.accept();
    rig.connect();

    rig.post(Event::NetworkAvailable(false));
    assert!(rig.settle(false, |r| r.conn().state() == ConnectionState::Disconnected));
    assert_eq!(log.closes(), 1);
    assert_eq!(rig.conn().session(), None);
    assert!(!rig.conn().retry_pending());

    // The worker's final report arrives for a session that no longer exists.
    assert!(rig.settle(true, |r| r.conn().live_workers() == 0));
    std::thread::sleep(Duration::from_millis(100));
    for _ in 0..10 {
        rig.post(Event::SoftwareTimer { id: 1 });
        rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    }
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
    assert_eq!(log.created(), 1);
    assert_eq!(log.closes(), 1);
}

#[test]
fn refused_connect_arms_a_retry() {
    let (mut rig, factory) = mock_rig(3000);
    let log = factory.log();
    factory.refuse();

    rig.post(Event::NetworkAvailable(true));
    assert!(rig.settle(false, |r| r.conn().retry_pending()));
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
    assert_eq!(log.created(), 1);
    assert_eq!(log.closes(), 1);
}

#[test]
fn socket_creation_failure_is_retried() {
    let (mut rig, factory) = mock_rig(50);
    let log = factory.log();
    factory.fail_create();
    let _peer = factory.accept();

    rig.post(Event::NetworkAvailable(true));
    assert!(rig.settle(false, |r| r.conn().retry_pending()));
    assert_eq!(log.created(), 0);

    std::thread::sleep(Duration::from_millis(50));
    assert!(rig.settle(true, |r| r.conn().is_connected()));
    assert_eq!(log.created(), 1);
}

#[test]
fn network_up_while_connected_is_ignored() {
    let (mut rig, factory) = mock_rig(3000);
    let log = factory.log();
    let _peer = factory.accept();
    rig.connect();

    rig.post(Event::NetworkAvailable(true));
    rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    assert!(rig.conn().is_connected());
    assert_eq!(rig.conn().session(), Some(1));
    assert_eq!(log.created(), 1);
}

#[test]
fn device_update_is_pushed_to_peer() {
    let (mut rig, factory) = mock_rig(3000);
    let log = factory.log();
    let _peer = factory.accept();
    rig.connect();

    rig.post(Event::DeviceUpdate {
        device: DeviceKind::Lamp,
        state: 3,
    });
    assert!(rig.settle(false, |_| !log.sent().is_empty()));
    assert_eq!(
        log.sent(),
        vec![r#"{"device":"lamp-esp","event":"update","arg0":0,"arg1":3}"#.to_string()]
    );
}

/// Panel bus that holds only two messages, so the worker's reports can be
/// crowded out.
fn tight_rig() -> (Rig<MockSocketFactory>, MockSocketFactory) {
    let factory = MockSocketFactory::new();
    let cfg = NodeConfig {
        panel_queue_depth: 2,
        ..config(3000)
    };
    (Rig::new(factory.clone(), &cfg), factory)
}

impl<F: SocketFactory> Rig<F> {
    fn fill_panel_bus(&self) {
        while self.handle.post_event(Event::Null, Duration::ZERO).is_ok() {}
    }

    fn wait_workers_done(&self) {
        let deadline = Instant::now() + SETTLE;
        while self.conn().live_workers() > 0 {
            assert!(Instant::now() < deadline, "worker never exited");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn drain_panel_bus(&mut self) {
        while self.router.pump(&self.panel_bus, &mut self.panel, Some(Duration::ZERO))
            == Pump::Dispatched
        {}
    }
}

#[test]
fn lost_disconnect_report_still_ends_in_retry() {
    let (mut rig, factory) = tight_rig();
    let log = factory.log();
    let mut peer = factory.accept();
    rig.connect();

    rig.fill_panel_bus();
    peer.hang_up();
    rig.wait_workers_done();
    rig.drain_panel_bus();
    assert!(rig.conn().is_connected(), "report should have been dropped");

    rig.post(Event::SoftwareTimer { id: 1 });
    rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
    assert!(rig.conn().retry_pending());
    assert_eq!(rig.conn().session(), None);
    assert_eq!(log.closes(), 1);
}

#[test]
fn lost_connect_report_ends_the_session() {
    let (mut rig, factory) = tight_rig();
    let log = factory.log();
    let _peer = factory.accept();

    rig.fill_panel_bus();
    rig.panel
        .connection_mut()
        .on_network_available(true, Instant::now());
    assert_eq!(rig.conn().state(), ConnectionState::Connecting);
    rig.wait_workers_done();
    rig.drain_panel_bus();
    assert_eq!(rig.conn().state(), ConnectionState::Connecting);

    rig.post(Event::SoftwareTimer { id: 1 });
    rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
    assert!(rig.conn().retry_pending());
    assert_eq!(log.created(), 1);
    assert_eq!(log.closes(), 1);
}

#[test]
fn loopback_server_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || listener.accept().unwrap().0);

    let mut cfg = config(3000);
    cfg.server_host = heapless::String::try_from("127.0.0.1").unwrap();
    cfg.server_port = port;
    let mut rig = Rig::new(TcpSocketFactory, &cfg);
    rig.connect();

    let mut stream = server.join().unwrap();
    stream
        .write_all(br#"{"device":"lamp-esp","event":"req-update","arg0":0,"arg1":0}"#)
        .unwrap();
    assert!(rig.settle(false, |r| !r.main_bus.is_empty()));
    let fwd = rig.main_bus.try_receive().unwrap();
    assert_eq!(Event::decode(&fwd), Some(Event::UserCommand(UserCommand::ReqUpdate)));

    rig.post(Event::DeviceUpdate {
        device: DeviceKind::Lamp,
        state: 1,
    });
    rig.router.pump(&rig.panel_bus, &mut rig.panel, Some(SLICE));
    stream.set_read_timeout(Some(SETTLE)).unwrap();
    let mut buf = [0u8; 128];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(
        core::str::from_utf8(&buf[..n]).unwrap(),
        r#"{"device":"lamp-esp","event":"update","arg0":0,"arg1":1}"#
    );

    drop(stream);
    assert!(rig.settle(false, |r| r.conn().retry_pending()));
    assert_eq!(rig.conn().state(), ConnectionState::Disconnected);
}
