//! Unified error types for the lamp firmware.
//!
//! A single `Error` enum that every subsystem converts into, with one
//! sub-enum per subsystem. All variants are `Copy` so they can travel
//! inside log lines and bus messages without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A message could not be delivered to a bus.
    Post(PostError),
    /// The TCP link to the companion controller failed.
    Connection(ConnectionError),
    /// An inbound or outbound wire message was malformed.
    Wire(WireError),
    /// The light endpoint rejected an attribute or driver operation.
    Device(DeviceError),
    /// A GATT characteristic access was rejected.
    Att(AttError),
    /// A GATT notification could not be sent.
    Notify(NotifyError),
    /// Configuration is invalid.
    Config(ConfigError),
    /// Peripheral or stack initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(e) => write!(f, "bus: {e}"),
            Self::Connection(e) => write!(f, "connection: {e}"),
            Self::Wire(e) => write!(f, "wire: {e}"),
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Att(e) => write!(f, "gatt: {e}"),
            Self::Notify(e) => write!(f, "notify: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    /// The queue stayed full for the whole timeout.
    Full,
    /// The owning thread is gone; the message was discarded.
    Closed,
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "queue full"),
            Self::Closed => write!(f, "no owner"),
        }
    }
}

impl From<PostError> for Error {
    fn from(e: PostError) -> Self {
        Self::Post(e)
    }
}

// ---------------------------------------------------------------------------
// Connection errors
// ---------------------------------------------------------------------------

/// TCP session failures reported by the network worker.
///
/// The numeric codes travel in `Message::l_param`; `0` is reserved for
/// "connected".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ConnectionError {
    CreateSocket = 1,
    TaskCreate = 2,
    InvalidSocket = 3,
    DnsLookup = 4,
    Connect = 5,
    Disconnect = 6,
}

impl ConnectionError {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::CreateSocket),
            2 => Some(Self::TaskCreate),
            3 => Some(Self::InvalidSocket),
            4 => Some(Self::DnsLookup),
            5 => Some(Self::Connect),
            6 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSocket => write!(f, "unable to create socket"),
            Self::TaskCreate => write!(f, "unable to spawn worker"),
            Self::InvalidSocket => write!(f, "invalid socket"),
            Self::DnsLookup => write!(f, "DNS lookup failed"),
            Self::Connect => write!(f, "connect failed"),
            Self::Disconnect => write!(f, "disconnected"),
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

// ---------------------------------------------------------------------------
// Wire protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// No input buffer at all.
    MissingInput,
    /// Input was empty or not valid UTF-8 / JSON.
    Malformed,
    /// Valid JSON but `device` or `event` is missing.
    MissingField(&'static str),
    /// Serialisation failed.
    Encode,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInput => write!(f, "no input"),
            Self::Malformed => write!(f, "malformed JSON"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::Encode => write!(f, "encode failed"),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

// ---------------------------------------------------------------------------
// Light device errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Attribute store read or write failed.
    Attribute,
    /// LED driver call failed.
    Driver,
    /// Value type or range not acceptable for the attribute.
    InvalidValue,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute => write!(f, "attribute access failed"),
            Self::Driver => write!(f, "light driver failed"),
            Self::InvalidValue => write!(f, "invalid attribute value"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// GATT errors
// ---------------------------------------------------------------------------

/// ATT protocol error returned to the central on a rejected write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttError {
    InvalidOffset = 0x07,
    InvalidAttributeLen = 0x0D,
    ValueNotAllowed = 0x13,
}

impl AttError {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOffset => write!(f, "invalid offset"),
            Self::InvalidAttributeLen => write!(f, "invalid attribute length"),
            Self::ValueNotAllowed => write!(f, "value not allowed"),
        }
    }
}

impl From<AttError> for Error {
    fn from(e: AttError) -> Self {
        Self::Att(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// No central has enabled notifications.
    NotSubscribed,
    /// The BLE stack refused the notification.
    Stack(i32),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => write!(f, "notifications not enabled"),
            Self::Stack(rc) => write!(f, "stack error (rc={rc})"),
        }
    }
}

impl From<NotifyError> for Error {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    Parse,
    EmptyServerHost,
    InvalidServerHost,
    InvalidPort,
    ZeroQueueDepth,
    ZeroPeriod,
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "configuration document could not be parsed"),
            Self::EmptyServerHost => write!(f, "server host is empty"),
            Self::InvalidServerHost => write!(f, "server host longer than 64 bytes"),
            Self::InvalidPort => write!(f, "server port must be non-zero"),
            Self::ZeroQueueDepth => write!(f, "queue depth must be non-zero"),
            Self::ZeroPeriod => write!(f, "timer periods must be non-zero"),
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (8-64 bytes for WPA2, or empty)"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
