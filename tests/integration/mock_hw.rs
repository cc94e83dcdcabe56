//! Mock ports for integration tests.
//!
//! Sockets are scripted per session from the test thread; pins, the light
//! driver and the GATT notifier record every call so tests can assert on
//! the full history without real hardware.

use core::convert::Infallible;
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use lampnode::ble::GattNotifier;
use lampnode::device::LightDriver;
use lampnode::error::{ConnectionError, DeviceError, NotifyError};
use lampnode::net::{Socket, SocketFactory};

const RECV_SLICE: Duration = Duration::from_millis(5);

// ── Sockets ───────────────────────────────────────────────────

/// Shared counters across every socket a factory hands out.
#[derive(Debug, Default)]
pub struct SocketLog {
    pub created: AtomicUsize,
    pub closes: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl SocketLog {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

enum Plan {
    FailCreate,
    Refuse,
    Accept(Receiver<Vec<u8>>),
}

/// Test-side end of an accepted session.
pub struct Peer {
    tx: Option<Sender<Vec<u8>>>,
}

#[allow(dead_code)]
impl Peer {
    pub fn send(&self, json: &str) {
        if let Some(tx) = &self.tx {
            tx.send(json.as_bytes().to_vec()).unwrap();
        }
    }

    /// Orderly close: the socket's next `recv()` returns 0.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }
}

/// Hands out one scripted socket per `create()`. Unscripted sessions are
/// refused at connect time.
#[derive(Clone, Default)]
pub struct MockSocketFactory {
    plans: Arc<Mutex<VecDeque<Plan>>>,
    log: Arc<SocketLog>,
}

#[allow(dead_code)]
impl MockSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<SocketLog> {
        Arc::clone(&self.log)
    }

    pub fn accept(&self) -> Peer {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.plans.lock().unwrap().push_back(Plan::Accept(rx));
        Peer { tx: Some(tx) }
    }

    pub fn refuse(&self) {
        self.plans.lock().unwrap().push_back(Plan::Refuse);
    }

    pub fn fail_create(&self) {
        self.plans.lock().unwrap().push_back(Plan::FailCreate);
    }
}

impl SocketFactory for MockSocketFactory {
    type Socket = ScriptedSocket;

    fn create(&mut self) -> Result<ScriptedSocket, ConnectionError> {
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Plan::Refuse);
        let inbox = match plan {
            Plan::FailCreate => return Err(ConnectionError::CreateSocket),
            Plan::Refuse => None,
            Plan::Accept(rx) => Some(rx),
        };
        self.log.created.fetch_add(1, Ordering::AcqRel);
        Ok(ScriptedSocket {
            inbox,
            open: AtomicBool::new(true),
            log: Arc::clone(&self.log),
        })
    }
}

pub struct ScriptedSocket {
    /// `None` refuses the connection.
    inbox: Option<Receiver<Vec<u8>>>,
    open: AtomicBool,
    log: Arc<SocketLog>,
}

impl Socket for ScriptedSocket {
    fn connect(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::InvalidSocket);
        }
        match self.inbox {
            Some(_) => Ok(()),
            None => Err(ConnectionError::Connect),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let inbox = self.inbox.as_ref().ok_or(ConnectionError::InvalidSocket)?;
        loop {
            if !self.is_open() {
                return Err(ConnectionError::Disconnect);
            }
            match inbox.recv_timeout(RECV_SLICE) {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::InvalidSocket);
        }
        let text = String::from_utf8_lossy(data).into_owned();
        self.log.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if was_open {
            self.log.closes.fetch_add(1, Ordering::AcqRel);
        }
        was_open
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// ── Pins ──────────────────────────────────────────────────────

/// Output pin whose level history is visible to the test.
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    levels: Arc<Mutex<Vec<bool>>>,
}

#[allow(dead_code)]
impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> Option<bool> {
        self.levels.lock().unwrap().last().copied()
    }

    pub fn history(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(true);
        Ok(())
    }
}

/// Active-low push button driven from the test thread.
#[derive(Debug, Clone, Default)]
pub struct MockButton {
    pressed: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.pressed.store(true, Ordering::Release);
    }

    pub fn release(&self) {
        self.pressed.store(false, Ordering::Release);
    }
}

impl ErrorType for MockButton {
    type Error = Infallible;
}

impl InputPin for MockButton {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.pressed.load(Ordering::Acquire))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.pressed.load(Ordering::Acquire))
    }
}

// ── Light driver ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Power(bool),
    Brightness(u8),
    Hue(u16),
    Saturation(u8),
    Temperature(u32),
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    calls: Arc<Mutex<Vec<DriverCall>>>,
}

#[allow(dead_code)]
impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<DriverCall> {
        self.calls.lock().unwrap().last().copied()
    }

    fn record(&self, call: DriverCall) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl LightDriver for MockDriver {
    fn set_power(&mut self, on: bool) -> Result<(), DeviceError> {
        self.record(DriverCall::Power(on))
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError> {
        self.record(DriverCall::Brightness(percent))
    }

    fn set_hue(&mut self, degrees: u16) -> Result<(), DeviceError> {
        self.record(DriverCall::Hue(degrees))
    }

    fn set_saturation(&mut self, percent: u8) -> Result<(), DeviceError> {
        self.record(DriverCall::Saturation(percent))
    }

    fn set_temperature(&mut self, kelvin: u32) -> Result<(), DeviceError> {
        self.record(DriverCall::Temperature(kelvin))
    }
}

// ── GATT ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[allow(dead_code)]
impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

impl GattNotifier for MockNotifier {
    fn notify(&mut self, value: &[u8]) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(value.to_vec());
        Ok(())
    }
}
