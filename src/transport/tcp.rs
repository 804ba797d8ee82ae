//! TCP transport.
//!
//! # Example
//!
//! ```ignore
//! use orei_control::transport::{Connector, TcpConnector};
//! use orei_control::Config;
//!
//! let stream = TcpConnector.connect(&Config::new("192.168.1.50")).await?;
//! ```

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{ControlError, Result};

/// A connected duplex byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed stream handed to the session task.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the transport for a configuration.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new stream to the device.
    async fn connect(&self, config: &Config) -> Result<BoxedStream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &Config) -> Result<BoxedStream> {
        let host = config.host.trim();
        let stream = TcpStream::connect((host, config.port))
            .await
            .map_err(|source| ControlError::Connect {
                addr: config.address(),
                source,
            })?;

        // Commands are a few bytes each; don't let Nagle hold them back.
        stream.set_nodelay(true)?;

        tracing::debug!("TCP connected to {}", config.address());
        Ok(Box::new(stream))
    }
}
