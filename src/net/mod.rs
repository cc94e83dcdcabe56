//! TCP link to the companion controller.

pub mod connection;
pub mod socket;

pub use connection::{
    ConnectionManager, ConnectionSettings, ConnectionState, PROTOCOL_TASK_PRIORITY,
};
pub use socket::{Socket, SocketFactory, TcpSocket, TcpSocketFactory};
