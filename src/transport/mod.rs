//! Transport module - opening the byte stream to the device.
//!
//! The controller only needs a duplex byte stream. [`TcpConnector`] opens a
//! TCP connection; tests plug in in-memory streams through the same
//! [`Connector`] trait.

mod tcp;

pub use tcp::{AsyncStream, BoxedStream, Connector, TcpConnector};
