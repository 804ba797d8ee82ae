//! Device connection settings.
//!
//! ```
//! use orei_control::Config;
//!
//! let config = Config::from_toml_str("host = \"192.168.1.50\"").unwrap();
//! assert_eq!(config.port, 60000);
//! assert!(config.is_complete());
//! ```

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// TCP port the HD-401MR listens on.
pub const DEFAULT_PORT: u16 = 60000;

/// Where to reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// IPv4 or IPv6 address of the device.
    #[serde(default)]
    pub host: String,

    /// Control port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Config {
    /// Create a configuration for `host` on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Both host and port are set; required before any connection attempt.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty() && self.port != 0
    }

    /// Check that the host is an IP address and the port is usable.
    pub fn validate(&self) -> Result<()> {
        if !self.is_complete() {
            return Err(ControlError::Config("host and port are required".into()));
        }
        self.host
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ControlError::Config(format!("invalid IP address: {}", self.host)))?;
        Ok(())
    }

    /// `host:port` for logging and error messages.
    pub fn address(&self) -> String {
        match self.host.trim().parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host.trim(), self.port),
        }
    }
}
