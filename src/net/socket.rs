//! TCP socket port and its `std::net` adapter.
//!
//! The connection manager creates a socket on its own thread, hands a
//! shared reference to the worker which connects and reads, and closes it
//! from its own thread again. [`Socket`] therefore takes `&self` everywhere
//! and [`Socket::close`] must be safe to race with a blocked
//! [`Socket::recv`]: closing unblocks the reader.
//!
//! lwIP provides BSD sockets behind `std::net` on ESP-IDF, so
//! [`TcpSocket`] is the same code on target and host.

use core::time::Duration;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::ConnectionError;

pub trait Socket: Send + Sync + 'static {
    /// Resolve `host` and connect, bounded by `timeout` per address.
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ConnectionError>;

    /// Blocking read. `Ok(0)` means the peer closed the stream.
    fn recv(&self, buf: &mut [u8]) -> Result<usize, ConnectionError>;

    fn send(&self, data: &[u8]) -> Result<(), ConnectionError>;

    /// Close the socket. Returns `true` only for the call that actually
    /// closed it; later calls are no-ops.
    fn close(&self) -> bool;

    /// `false` once closed.
    fn is_open(&self) -> bool;
}

pub trait SocketFactory {
    type Socket: Socket;

    fn create(&mut self) -> Result<Self::Socket, ConnectionError>;
}

// ───────────────────────────────────────────────────────────────
// std::net adapter
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Slot {
    /// Created, not connected yet.
    Fresh,
    Connected(Arc<TcpStream>),
    Closed,
}

#[derive(Debug)]
pub struct TcpSocket {
    slot: Mutex<Slot>,
}

impl TcpSocket {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Fresh),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream(&self) -> Result<Arc<TcpStream>, ConnectionError> {
        match &*self.lock() {
            Slot::Connected(stream) => Ok(Arc::clone(stream)),
            Slot::Fresh | Slot::Closed => Err(ConnectionError::InvalidSocket),
        }
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `host:port`, IPv4 addresses first.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectionError> {
    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            warn!("DNS: lookup of '{}' failed: {}", host, e);
            ConnectionError::DnsLookup
        })?
        .collect();
    if addrs.is_empty() {
        warn!("DNS: '{}' has no addresses", host);
        return Err(ConnectionError::DnsLookup);
    }
    addrs.sort_by_key(SocketAddr::is_ipv6);
    Ok(addrs)
}

impl Socket for TcpSocket {
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::InvalidSocket);
        }
        let addrs = resolve(host, port)?;

        let mut stream = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(s) => {
                    debug!("TCP: connected to {}", addr);
                    stream = Some(s);
                    break;
                }
                Err(e) => warn!("TCP: connect to {} failed: {}", addr, e),
            }
        }
        let stream = stream.ok_or(ConnectionError::Connect)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP: set_nodelay failed: {}", e);
        }

        let mut slot = self.lock();
        match *slot {
            Slot::Fresh => {
                *slot = Slot::Connected(Arc::new(stream));
                Ok(())
            }
            // Closed by the owner while connecting.
            Slot::Closed | Slot::Connected(_) => {
                shutdown(&stream);
                Err(ConnectionError::InvalidSocket)
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let stream = self.stream()?;
        (&*stream).read(buf).map_err(|e| {
            debug!("TCP: recv failed: {}", e);
            ConnectionError::Disconnect
        })
    }

    fn send(&self, data: &[u8]) -> Result<(), ConnectionError> {
        let stream = self.stream()?;
        (&*stream).write_all(data).map_err(|e| {
            warn!("TCP: send failed: {}", e);
            ConnectionError::Disconnect
        })
    }

    fn close(&self) -> bool {
        let previous = core::mem::replace(&mut *self.lock(), Slot::Closed);
        match previous {
            Slot::Connected(stream) => {
                // Unblocks a reader parked in recv().
                shutdown(&stream);
                true
            }
            Slot::Fresh => true,
            Slot::Closed => false,
        }
    }

    fn is_open(&self) -> bool {
        !matches!(*self.lock(), Slot::Closed)
    }
}

fn shutdown(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("TCP: shutdown failed: {}", e);
    }
}

/// Creates plain [`TcpSocket`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpSocketFactory;

impl SocketFactory for TcpSocketFactory {
    type Socket = TcpSocket;

    fn create(&mut self) -> Result<TcpSocket, ConnectionError> {
        Ok(TcpSocket::new())
    }
}
