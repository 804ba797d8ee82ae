//! Connection state and status notifications.
//!
//! The controller reports lifecycle changes to a single observer closure.
//! Transport errors are coalesced by error kind so a device that keeps
//! refusing connections produces one notification, not one per attempt.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::ControlError;

/// Lifecycle state of the single device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport.
    Disconnected = 0,
    /// Transport being opened.
    Connecting = 1,
    /// Transport open; commands are accepted.
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Lock-free cell shared between the session task and controller handles.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionState::Disconnected as u8)))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Notification delivered to the status observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// A connection attempt started.
    Connecting,
    /// The transport is open.
    Connected,
    /// A transport error occurred.
    Error(String),
    /// The transport closed.
    Disconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Connecting => f.write_str("connecting"),
            Status::Connected => f.write_str("connected"),
            Status::Error(message) => write!(f, "error: {message}"),
            Status::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Observer closure receiving status notifications.
pub type StatusObserver = Arc<dyn Fn(&Status) + Send + Sync>;

/// Delivers status notifications, suppressing repeated error kinds.
pub struct StatusReporter {
    observer: Option<StatusObserver>,
    last_error: Option<io::ErrorKind>,
}

impl StatusReporter {
    /// Create a reporter around an optional observer.
    pub fn new(observer: Option<StatusObserver>) -> Self {
        Self {
            observer,
            last_error: None,
        }
    }

    /// Report a lifecycle change.
    ///
    /// A successful connect forgets the last error kind.
    pub fn report(&mut self, status: Status) {
        if status == Status::Connected {
            self.last_error = None;
        }
        self.notify(&status);
    }

    /// Report an error unless it repeats the previous error kind.
    ///
    /// Returns `true` if the observer was notified.
    pub fn report_error(&mut self, error: &ControlError) -> bool {
        if let Some(kind) = error.kind() {
            if self.last_error == Some(kind) {
                tracing::debug!("Suppressing repeated error: {}", error);
                return false;
            }
            self.last_error = Some(kind);
        }

        tracing::error!("Network error: {}", error);
        self.notify(&Status::Error(error.to_string()));
        true
    }

    fn notify(&self, status: &Status) {
        if let Some(observer) = &self.observer {
            observer(status);
        }
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("observer", &self.observer.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}
