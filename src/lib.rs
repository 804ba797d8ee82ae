//! # orei-control
//!
//! Rust control client for the OREI HD-401MR 4x1 quad multi-viewer.
//!
//! The switcher takes short ASCII commands (`PWR1`, `SMD3`, ...) over a
//! single TCP connection and acknowledges them asynchronously. It drops
//! commands sent too quickly and never answers some of them, so this crate
//! serializes everything through a one-at-a-time dispatch queue with
//! retry-on-timeout.
//!
//! ## Architecture
//!
//! - **Line framing**: socket bytes are split into `\n`-terminated lines
//! - **Classification**: each line becomes a canonical reply token
//! - **Dispatch queue**: replies and a 200ms tick advance the queue
//! - **Session**: one task owns the socket, queue, and ticker
//!
//! ## Example
//!
//! ```ignore
//! use orei_control::{Config, Controller};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = Controller::builder()
//!         .config(Config::new("192.168.1.50"))
//!         .on_status(|status| tracing::info!("switcher {}", status))
//!         .start();
//!
//!     controller.enqueue("PWR1");
//!     controller.shutdown().await;
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod status;
pub mod transport;
pub mod writer;

mod controller;

pub use commands::{CommandSpec, CommandTable};
pub use config::Config;
pub use controller::{Controller, ControllerBuilder};
pub use error::ControlError;
pub use protocol::Command;
pub use status::{ConnectionState, Status};
