//! Controller builder and session loop.
//!
//! The [`ControllerBuilder`] configures the connection and the dispatch
//! policy. The [`Controller`] is a cheap handle onto a single session task
//! that owns everything mutable:
//! 1. Open the transport when host and port are configured
//! 2. Start the writer task and the retry ticker
//! 3. Frame incoming bytes into lines and classify them
//! 4. Advance the dispatch queue on replies and ticks
//! 5. Tear the connection state down on close, error, or request
//!
//! # Example
//!
//! ```ignore
//! use orei_control::{Config, Controller};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = Controller::builder()
//!         .config(Config::new("192.168.1.50"))
//!         .on_status(|status| println!("switcher: {status}"))
//!         .start();
//!
//!     // Once connected:
//!     controller.enqueue("PWR1");
//!     controller.enqueue_action("SMD", Some("2")).unwrap();
//!
//!     controller.shutdown().await;
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::commands::CommandTable;
use crate::config::Config;
use crate::error::{ControlError, Result};
use crate::protocol::{classify, AliasMap, Command, LineBuffer};
use crate::queue::{DispatchQueue, RetryPolicy};
use crate::status::{ConnectionState, SharedState, Status, StatusObserver, StatusReporter};
use crate::transport::{BoxedStream, Connector, TcpConnector};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Socket read buffer size. Replies are a few bytes each.
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Builder for configuring and starting a [`Controller`].
pub struct ControllerBuilder {
    config: Config,
    connector: Arc<dyn Connector>,
    observer: Option<StatusObserver>,
    options: SessionOptions,
}

/// Per-connection settings handed to the session.
#[derive(Debug, Clone)]
struct SessionOptions {
    policy: RetryPolicy,
    writer_config: WriterConfig,
    max_line_length: Option<usize>,
    aliases: AliasMap,
    table: &'static CommandTable,
}

impl ControllerBuilder {
    /// Create a new builder with no configuration.
    pub fn new() -> Self {
        Self {
            config: Config::new(""),
            connector: Arc::new(TcpConnector),
            observer: None,
            options: SessionOptions {
                policy: RetryPolicy::default(),
                writer_config: WriterConfig::default(),
                max_line_length: None,
                aliases: AliasMap::default(),
                table: CommandTable::standard(),
            },
        }
    }

    /// Set the device address.
    ///
    /// A complete configuration makes [`start`](Self::start) connect right
    /// away.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the transport.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Register the status observer.
    pub fn on_status<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Set the retry interval, which is also the tick period.
    ///
    /// Default: 200ms
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.options.policy.interval = interval;
        self
    }

    /// Set how many transmissions a command gets before it is dropped.
    ///
    /// Default: 5
    pub fn max_tries(mut self, tries: u32) -> Self {
        self.options.policy.max_tries = tries.max(1);
        self
    }

    /// Set how many queued lines the writer coalesces into one write.
    ///
    /// Default: 16
    pub fn max_batch_size(mut self, lines: usize) -> Self {
        self.options.writer_config.max_batch_size = lines;
        self
    }

    /// Discard reply lines longer than `max` bytes.
    ///
    /// Default: unbounded
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.options.max_line_length = Some(max);
        self
    }

    /// Replace the reply alias map.
    pub fn aliases(mut self, aliases: AliasMap) -> Self {
        self.options.aliases = aliases;
        self
    }

    /// Replace the command table.
    pub fn command_table(mut self, table: &'static CommandTable) -> Self {
        self.options.table = table;
        self
    }

    /// Spawn the session task and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> Controller {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let state = SharedState::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let table = self.options.table;
        let connect_now = self.config.is_complete();

        let session = Session {
            config: self.config,
            connector: self.connector,
            requests: requests_rx,
            reporter: StatusReporter::new(self.observer),
            state: state.clone(),
            pending: pending.clone(),
            options: self.options,
        };
        let task = tokio::spawn(session.run(connect_now));

        Controller {
            requests: requests_tx,
            state,
            pending,
            table,
            task,
        }
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages from controller handles to the session task.
#[derive(Debug)]
enum Request {
    Enqueue(Command),
    Connect,
    Configure(Config),
    Disconnect,
    Shutdown,
}

/// Handle to a running session.
///
/// Dropping the handle stops the session.
pub struct Controller {
    requests: mpsc::UnboundedSender<Request>,
    state: SharedState,
    pending: Arc<AtomicUsize>,
    table: &'static CommandTable,
    task: JoinHandle<()>,
}

impl Controller {
    /// Create a new controller builder.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Queue a pre-composed command such as `"PWR1"`.
    ///
    /// Returns `false` without queueing if the device is not connected or
    /// the string is not a valid command.
    pub fn enqueue(&self, command: &str) -> bool {
        match Command::new(command) {
            Ok(command) => self.enqueue_command(command),
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// Queue a validated command. Returns `false` if not connected.
    pub fn enqueue_command(&self, command: Command) -> bool {
        if !self.is_ready() {
            tracing::debug!("Not connected, ignoring {}", command);
            return false;
        }
        self.request(Request::Enqueue(command))
    }

    /// Compose a command from a table action and choice, then queue it.
    pub fn enqueue_action(&self, action: &str, choice: Option<&str>) -> Result<bool> {
        let command = self.table.resolve(action, choice)?;
        Ok(self.enqueue_command(command))
    }

    /// Ask the session to (re)open the transport.
    ///
    /// A live connection is closed first and its queue discarded.
    pub fn reconnect(&self) {
        self.request(Request::Connect);
    }

    /// Replace the configuration and reconnect with it.
    pub fn configure(&self, config: Config) {
        self.request(Request::Configure(config));
    }

    /// Close the transport and discard the queue.
    pub fn disconnect(&self) {
        self.request(Request::Disconnect);
    }

    fn request(&self, request: Request) -> bool {
        match self.requests.send(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Session stopped, ignoring {:?}", e.0);
                false
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether commands are currently accepted.
    pub fn is_ready(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// Commands queued on the live connection, including the one in flight.
    ///
    /// Updated by the session after each event it handles.
    pub fn pending_commands(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// The command table used by [`enqueue_action`](Self::enqueue_action).
    pub fn command_table(&self) -> &'static CommandTable {
        self.table
    }

    /// Stop the session and wait for it to finish.
    pub async fn shutdown(self) {
        self.request(Request::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Session task failed: {}", e);
        }
    }
}

/// What the session does after leaving a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Idle,
    Reconnect,
    Shutdown,
}

/// How a live connection ended.
enum Ending {
    Closed,
    Failed(ControlError),
}

/// The session task: owns configuration, status, and the live connection.
struct Session {
    config: Config,
    connector: Arc<dyn Connector>,
    requests: mpsc::UnboundedReceiver<Request>,
    reporter: StatusReporter,
    state: SharedState,
    pending: Arc<AtomicUsize>,
    options: SessionOptions,
}

impl Session {
    async fn run(mut self, connect_now: bool) {
        let mut next = if connect_now { Next::Reconnect } else { Next::Idle };

        loop {
            next = match next {
                Next::Idle => self.idle().await,
                Next::Reconnect => self.connect().await,
                Next::Shutdown => break,
            };
        }

        self.state.set(ConnectionState::Disconnected);
        tracing::debug!("Session stopped");
    }

    /// Disconnected: wait for something to do.
    async fn idle(&mut self) -> Next {
        match self.requests.recv().await {
            None | Some(Request::Shutdown) => Next::Shutdown,
            Some(Request::Connect) => Next::Reconnect,
            Some(Request::Configure(config)) => {
                self.config = config;
                Next::Reconnect
            }
            Some(Request::Enqueue(command)) => {
                reject(&command);
                Next::Idle
            }
            Some(Request::Disconnect) => Next::Idle,
        }
    }

    /// Connecting: open the transport, then serve it.
    async fn connect(&mut self) -> Next {
        if !self.config.is_complete() {
            tracing::warn!("Host and port not configured, not connecting");
            return Next::Idle;
        }

        let config = self.config.clone();
        let connector = self.connector.clone();

        self.state.set(ConnectionState::Connecting);
        self.reporter.report(Status::Connecting);
        tracing::info!("Connecting to {}", config.address());

        let mut attempt = connector.connect(&config);
        let stream = loop {
            tokio::select! {
                biased;

                result = &mut attempt => match result {
                    Ok(stream) => break stream,
                    Err(e) => {
                        self.state.set(ConnectionState::Disconnected);
                        self.reporter.report_error(&e);
                        return Next::Idle;
                    }
                },

                request = self.requests.recv() => {
                    let next = match request {
                        None | Some(Request::Shutdown) => Next::Shutdown,
                        Some(Request::Configure(config)) => {
                            self.config = config;
                            Next::Reconnect
                        }
                        Some(Request::Disconnect) => Next::Idle,
                        Some(Request::Connect) => continue,
                        Some(Request::Enqueue(command)) => {
                            reject(&command);
                            continue;
                        }
                    };
                    self.state.set(ConnectionState::Disconnected);
                    self.reporter.report(Status::Disconnected);
                    return next;
                }
            }
        };

        self.serve(stream).await
    }

    /// Connected: run the dispatch loop until the connection ends.
    async fn serve(&mut self, stream: BoxedStream) -> Next {
        let (mut reader, write_half) = tokio::io::split(stream);
        let mut conn = Connection::open(write_half, &self.options);

        self.state.set(ConnectionState::Connected);
        self.reporter.report(Status::Connected);
        tracing::info!("Connected to {}", self.config.address());

        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let (next, ending) = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::info!("Connection closed by device");
                        break (Next::Idle, Ending::Closed);
                    }
                    Ok(n) => conn.on_data(&buf[..n]),
                    Err(e) => break (Next::Idle, Ending::Failed(ControlError::Io(e))),
                },

                _ = conn.ticker.tick() => conn.on_tick(),

                Some(err) = conn.write_errors.recv() => {
                    self.reporter.report_error(&err);
                }

                request = self.requests.recv() => match request {
                    Some(Request::Enqueue(command)) => conn.enqueue(command),
                    None | Some(Request::Shutdown) => break (Next::Shutdown, Ending::Closed),
                    Some(Request::Connect) => break (Next::Reconnect, Ending::Closed),
                    Some(Request::Configure(config)) => {
                        self.config = config;
                        break (Next::Reconnect, Ending::Closed);
                    }
                    Some(Request::Disconnect) => break (Next::Idle, Ending::Closed),
                },
            }

            self.pending.store(conn.queue.len(), Ordering::Release);
        };

        self.state.set(ConnectionState::Disconnected);
        conn.close();
        self.pending.store(0, Ordering::Release);

        // The error may be suppressed as a repeat; the disconnect never is.
        if let Ending::Failed(e) = ending {
            self.reporter.report_error(&e);
        }
        self.reporter.report(Status::Disconnected);
        next
    }
}

fn reject(command: &Command) {
    tracing::debug!("Not connected, ignoring {}", command);
}

/// State that exists only while the transport is open.
struct Connection {
    queue: DispatchQueue,
    lines: LineBuffer,
    writer: WriterHandle,
    writer_task: JoinHandle<()>,
    write_errors: mpsc::UnboundedReceiver<ControlError>,
    ticker: Interval,
    aliases: AliasMap,
}

impl Connection {
    fn open<W>(write_half: W, options: &SessionOptions) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (errors_tx, write_errors) = mpsc::unbounded_channel();
        let (writer, writer_task) =
            spawn_writer_task(write_half, options.writer_config.clone(), errors_tx);

        let period = options.policy.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let lines = match options.max_line_length {
            Some(max) => LineBuffer::with_max_line_length(max),
            None => LineBuffer::new(),
        };

        Self {
            queue: DispatchQueue::with_policy(options.table, options.policy),
            lines,
            writer,
            writer_task,
            write_errors,
            ticker,
            aliases: options.aliases,
        }
    }

    fn enqueue(&mut self, command: Command) {
        self.queue.enqueue(command, Instant::now(), &mut self.writer);
    }

    fn on_data(&mut self, data: &[u8]) {
        let now = Instant::now();
        for line in self.lines.push(data) {
            let text = String::from_utf8_lossy(&line);
            tracing::debug!("<- {}", text.trim_end());
            if let Some(response) = classify(&text, &self.aliases) {
                self.queue.on_response(&response, now, &mut self.writer);
            }
        }
    }

    fn on_tick(&mut self) {
        self.queue.on_tick(Instant::now(), &mut self.writer);
    }

    /// Discard everything tied to this connection. The ticker and line
    /// buffer go with `self`.
    fn close(mut self) {
        self.queue.clear();
        self.writer_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ControllerBuilder::new();

        assert!(!builder.config.is_complete());
        assert_eq!(builder.options.policy, RetryPolicy::default());
        assert_eq!(builder.options.max_line_length, None);
        assert!(builder.observer.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Controller::builder()
            .config(Config::new("10.1.1.1").with_port(4999))
            .retry_interval(Duration::from_millis(300))
            .max_tries(3)
            .max_batch_size(8)
            .max_line_length(128)
            .on_status(|_| {});

        assert_eq!(builder.config.port, 4999);
        assert_eq!(builder.options.policy.interval, Duration::from_millis(300));
        assert_eq!(builder.options.policy.max_tries, 3);
        assert_eq!(builder.options.writer_config.max_batch_size, 8);
        assert_eq!(builder.options.max_line_length, Some(128));
        assert!(builder.observer.is_some());
    }

    #[test]
    fn test_max_tries_floor() {
        let builder = Controller::builder().max_tries(0);
        assert_eq!(builder.options.policy.max_tries, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_controller_stays_disconnected() {
        let controller = Controller::builder().start();

        controller.reconnect();
        tokio::task::yield_now().await;

        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.enqueue("PWR1"));
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_after_session_stopped() {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        drop(requests_rx);
        let controller = Controller {
            requests,
            state: SharedState::new(),
            pending: Arc::new(AtomicUsize::new(0)),
            table: CommandTable::standard(),
            task: tokio::spawn(async {}),
        };

        assert!(!controller.request(Request::Connect));
        controller.reconnect();
        controller.disconnect();
        controller.configure(Config::new("10.0.0.1"));
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_command() {
        let controller = Controller::builder().start();

        assert!(!controller.enqueue("P\n"));
        assert!(matches!(
            controller.enqueue_action("NOP", None),
            Err(ControlError::UnknownAction(_))
        ));
        controller.shutdown().await;
    }
}
