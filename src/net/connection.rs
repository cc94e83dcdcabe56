//! Outbound TCP session to the companion controller.
//!
//! [`ConnectionManager`] lives on the device-protocol thread and is the
//! only writer of [`ConnectionState`] and the only closer of the socket.
//! Each session gets a short-lived worker thread that connects, reads and
//! reports back exclusively through `App.TcpConnection` messages on the
//! owner's bus.
//!
//! ```text
//!                 NetworkAvailable(true)
//!  Disconnected ─────────────────────────▶ Connecting ──TcpConnection(ok)──▶ Connected
//!       ▲  ▲                                   │                                 │
//!       │  └──── retry after cooldown ◀────────┴──────── TcpConnection(err) ◀────┘
//!       └──────────────── NetworkAvailable(false) (any state) ────────────────────
//! ```
//!
//! ## Worker lifecycle
//!
//! Teardown closes the socket, which unblocks the worker's `recv()`, and
//! moves the worker's `JoinHandle` to a drain list. [`ConnectionManager::poll`]
//! joins finished workers; a new session is never started while an old
//! worker is still alive, so at most one worker exists at any time.
//! `poll` also treats a finished worker of the current session as a
//! disconnect, so a report lost to a full bus still ends in a retry.
//!
//! Every session carries a number that travels in the report's `u_param`.
//! Reports for anything but the current session are stale and ignored.

use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, info, warn};

use crate::bus::event::{TcpReport, UserCommand};
use crate::bus::{BusHandle, Event, PostError};
use crate::config::NodeConfig;
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::ConnectionError;
use crate::model::{LampModel, LampVerb};

use super::socket::{Socket, SocketFactory};

/// Receive buffer; one JSON object per read must fit.
pub const RX_BUFFER_LEN: usize = 128;

/// Priority of the device-protocol thread. Its worker runs at the same
/// level on the same core.
pub const PROTOCOL_TASK_PRIORITY: u8 = 6;

const WORKER_TASK: TaskSpec = TaskSpec::new(Core::Pro, PROTOCOL_TASK_PRIORITY, 8, "tcp-rx\0");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Server address and timing used by every session.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: heapless::String<64>,
    pub port: u16,
    pub cooldown: Duration,
    pub connect_timeout: Duration,
    pub post_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            host: config.server_host.clone(),
            port: config.server_port,
            cooldown: config.reconnect_cooldown(),
            connect_timeout: config.connect_timeout(),
            post_timeout: config.post_timeout(),
        }
    }
}

struct Session<S> {
    id: u16,
    /// `None` when socket creation itself failed.
    socket: Option<Arc<S>>,
    worker: Option<JoinHandle<()>>,
}

pub struct ConnectionManager<F: SocketFactory> {
    factory: F,
    settings: ConnectionSettings,
    /// Bus of the owning thread; the worker reports here.
    bus: BusHandle,
    state: ConnectionState,
    network_available: bool,
    next_session: u16,
    active: Option<Session<F::Socket>>,
    /// Workers of torn-down sessions, joined once finished.
    draining: Vec<JoinHandle<()>>,
    retry_at: Option<Instant>,
}

impl<F: SocketFactory> ConnectionManager<F> {
    pub fn new(factory: F, settings: ConnectionSettings, bus: BusHandle) -> Self {
        Self {
            factory,
            settings,
            bus,
            state: ConnectionState::Disconnected,
            network_available: false,
            next_session: 0,
            active: None,
            draining: Vec::new(),
            retry_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn network_available(&self) -> bool {
        self.network_available
    }

    /// Number of the current session, if any.
    pub fn session(&self) -> Option<u16> {
        self.active.as_ref().map(|s| s.id)
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_at.is_some()
    }

    /// Worker threads that have not finished yet.
    pub fn live_workers(&self) -> usize {
        let active = self
            .active
            .as_ref()
            .and_then(|s| s.worker.as_ref())
            .filter(|w| !w.is_finished())
            .map_or(0, |_| 1);
        active + self.draining.iter().filter(|w| !w.is_finished()).count()
    }

    // ── Event handlers ────────────────────────────────────────

    pub fn on_network_available(&mut self, available: bool, now: Instant) {
        if available {
            self.network_available = true;
            if self.state == ConnectionState::Disconnected {
                info!("TCP: network up, connecting");
                self.retry_at = None;
                self.start(now);
            } else {
                debug!("TCP: network up while {:?}, ignored", self.state);
            }
        } else {
            info!("TCP: network lost");
            self.network_available = false;
            self.retry_at = None;
            self.teardown();
        }
    }

    pub fn on_tcp_connection(&mut self, session: u16, report: TcpReport, now: Instant) {
        if self.session() != Some(session) {
            debug!("TCP[{}]: stale report {:?}, ignored", session, report);
            return;
        }
        match report {
            Ok(()) if self.state == ConnectionState::Connecting => {
                info!(
                    "TCP[{}]: connected to {}:{}",
                    session, self.settings.host, self.settings.port
                );
                self.state = ConnectionState::Connected;
            }
            Ok(()) => warn!("TCP[{}]: connect report while {:?}", session, self.state),
            Err(e) => {
                warn!("TCP[{}]: {}", session, e);
                self.teardown();
                if self.network_available {
                    info!(
                        "TCP: reconnecting in {} ms",
                        self.settings.cooldown.as_millis()
                    );
                    self.retry_at = Some(now + self.settings.cooldown);
                }
            }
        }
    }

    /// Timer tick: reap finished workers, end a session whose worker
    /// exited unreported, and start a due reconnect.
    pub fn poll(&mut self, now: Instant) {
        self.reap();
        self.check_active_worker(now);
        let Some(at) = self.retry_at else {
            return;
        };
        if now < at {
            return;
        }
        self.retry_at = None;
        if self.network_available && self.state == ConnectionState::Disconnected {
            self.start(now);
        }
    }

    /// Write one outbound message on the current session.
    pub fn send(&self, data: &[u8]) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::InvalidSocket);
        }
        let socket = self
            .active
            .as_ref()
            .and_then(|s| s.socket.as_ref())
            .ok_or(ConnectionError::InvalidSocket)?;
        socket.send(data)
    }

    /// Close the session and wait for every worker to exit.
    pub fn shutdown(&mut self) {
        self.retry_at = None;
        self.teardown();
        for worker in self.draining.drain(..) {
            if worker.join().is_err() {
                warn!("TCP: worker panicked");
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn start(&mut self, now: Instant) {
        self.reap();
        if !self.draining.is_empty() {
            debug!("TCP: previous worker still running, deferring");
            self.retry_at = Some(now);
            return;
        }

        self.next_session = self.next_session.wrapping_add(1);
        let id = self.next_session;
        self.state = ConnectionState::Connecting;

        let socket = match self.factory.create() {
            Ok(s) => Arc::new(s),
            Err(e) => {
                self.active = Some(Session {
                    id,
                    socket: None,
                    worker: None,
                });
                self.report_local(id, e, now);
                return;
            }
        };

        let worker = Worker {
            session: id,
            socket: Arc::clone(&socket),
            host: self.settings.host.clone(),
            port: self.settings.port,
            connect_timeout: self.settings.connect_timeout,
            post_timeout: self.settings.post_timeout,
            bus: self.bus.clone(),
        };

        match task_pin::spawn_on_core(WORKER_TASK, move || worker.run()) {
            Ok(handle) => {
                debug!("TCP[{}]: worker started", id);
                self.active = Some(Session {
                    id,
                    socket: Some(socket),
                    worker: Some(handle),
                });
            }
            Err(e) => {
                warn!("TCP[{}]: worker spawn failed: {}", id, e);
                self.active = Some(Session {
                    id,
                    socket: Some(socket),
                    worker: None,
                });
                self.report_local(id, ConnectionError::TaskCreate, now);
            }
        }
    }

    /// Queue a failure raised on the owning thread; apply it directly if
    /// our own bus cannot take it.
    fn report_local(&mut self, session: u16, error: ConnectionError, now: Instant) {
        let event = Event::TcpConnection {
            session,
            report: Err(error),
        };
        if self.bus.post_event(event, Duration::ZERO).is_err() {
            self.on_tcp_connection(session, Err(error), now);
        }
    }

    /// A finished worker means its session is over, whether or not its
    /// report reached the bus.
    fn check_active_worker(&mut self, now: Instant) {
        let Some(session) = self.active.as_ref() else {
            return;
        };
        let finished = session
            .worker
            .as_ref()
            .is_some_and(JoinHandle::is_finished);
        if finished {
            let id = session.id;
            warn!("TCP[{}]: worker exited without a delivered report", id);
            self.on_tcp_connection(id, Err(ConnectionError::Disconnect), now);
        }
    }

    fn teardown(&mut self) {
        if let Some(session) = self.active.take() {
            if let Some(socket) = &session.socket {
                if socket.close() {
                    debug!("TCP[{}]: socket closed", session.id);
                }
            }
            if let Some(worker) = session.worker {
                self.draining.push(worker);
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.draining.drain(..).partition(JoinHandle::is_finished);
        self.draining = running;
        for worker in finished {
            if worker.join().is_err() {
                warn!("TCP: worker panicked");
            }
        }
    }
}

impl<F: SocketFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

struct Worker<S> {
    session: u16,
    socket: Arc<S>,
    host: heapless::String<64>,
    port: u16,
    connect_timeout: Duration,
    post_timeout: Duration,
    bus: BusHandle,
}

impl<S: Socket> Worker<S> {
    fn run(self) {
        let error = self.serve();
        debug!("TCP[{}]: worker exiting ({})", self.session, error);
        if let Err(e) = self.report(Err(error)) {
            warn!("TCP[{}]: final report not delivered: {}", self.session, e);
        }
    }

    /// Connect and read until the session ends; returns why it ended.
    fn serve(&self) -> ConnectionError {
        if !self.socket.is_open() {
            return ConnectionError::InvalidSocket;
        }
        if let Err(e) = self
            .socket
            .connect(&self.host, self.port, self.connect_timeout)
        {
            return e;
        }
        // The owner only learns about this session from the report.
        if let Err(e) = self.report(Ok(())) {
            warn!("TCP[{}]: connect report not delivered: {}", self.session, e);
            return ConnectionError::Disconnect;
        }

        let mut buf = [0u8; RX_BUFFER_LEN];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(0) => {
                    info!("TCP[{}]: peer closed", self.session);
                    return ConnectionError::Disconnect;
                }
                Ok(n) => {
                    if let Some(cmd) = decode_chunk(&buf[..n]) {
                        let posted = self
                            .bus
                            .post_event(Event::UserCommand(cmd), self.post_timeout);
                        if posted == Err(PostError::Closed) {
                            return ConnectionError::Disconnect;
                        }
                    }
                }
                Err(_) => return ConnectionError::Disconnect,
            }
        }
    }

    fn report(&self, report: TcpReport) -> Result<(), PostError> {
        self.bus.post_event(
            Event::TcpConnection {
                session: self.session,
                report,
            },
            self.post_timeout,
        )
    }
}

/// Translate one received chunk into a command for the application
/// thread. Malformed or unexpected messages are logged and dropped.
pub fn decode_chunk(bytes: &[u8]) -> Option<UserCommand> {
    let Ok(text) = core::str::from_utf8(bytes) else {
        warn!("TCP: dropping {} bytes of non-UTF-8 input", bytes.len());
        return None;
    };
    let model = match LampModel::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("TCP: dropping message: {}", e);
            return None;
        }
    };
    if !model.is_for_lamp() {
        warn!("TCP: message for device '{}'", model.device());
    }
    match model.verb() {
        Some(LampVerb::ReqUpdate) => Some(UserCommand::ReqUpdate),
        Some(LampVerb::UserClick) => match u32::try_from(model.arg0()) {
            Ok(button) => Some(UserCommand::Click { button }),
            Err(_) => {
                warn!("TCP: user-click with invalid button {}", model.arg0());
                None
            }
        },
        Some(LampVerb::Update) | None => {
            warn!("TCP: unexpected event '{}'", model.event());
            None
        }
    }
}
