//! Serialized dispatch queue with retry-on-timeout.
//!
//! The switcher drops commands that arrive faster than roughly one per
//! 200ms, so only one command is ever outstanding. The head of the queue is
//! transmitted as soon as it becomes head and stays in flight until:
//!
//! - a reply classifies to exactly the head command,
//! - the head's mnemonic is known to never reply (completed right after
//!   transmission), or
//! - the retry budget runs out and the command is dropped.
//!
//! The queue never touches the clock or the socket itself: callers pass the
//! current instant and a [`Transmit`] sink, which keeps every transition
//! deterministic under test.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::commands::CommandTable;
use crate::protocol::{Command, Response};

/// Default retry interval; also the tick period of the connection driver.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of transmissions before a command is dropped.
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// Sink for command transmissions.
///
/// Transmission is fire-and-forget: implementors queue the line and report
/// failures through their own channel.
pub trait Transmit {
    /// Send `command` followed by the line terminator.
    fn transmit(&mut self, command: &Command);
}

impl Transmit for Vec<Command> {
    fn transmit(&mut self, command: &Command) {
        self.push(command.clone());
    }
}

/// Retry timing for the in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Minimum time between transmissions of the same command.
    pub interval: Duration,
    /// Transmissions before giving up, including the first.
    pub max_tries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_tries: DEFAULT_MAX_TRIES,
        }
    }
}

/// Metadata for the command currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// The transmitted command.
    pub command: Command,
    /// Transmissions so far, starting at 1.
    pub tries: u32,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
}

/// FIFO of commands with a single in-flight head.
#[derive(Debug)]
pub struct DispatchQueue {
    /// Waiting commands. The head, while in flight, is `entries[0]`.
    entries: VecDeque<Command>,
    /// Tracking for the head once transmitted.
    in_flight: Option<PendingEntry>,
    table: &'static CommandTable,
    policy: RetryPolicy,
}

impl DispatchQueue {
    /// Create an empty queue using the standard command table.
    pub fn new() -> Self {
        Self::with_policy(CommandTable::standard(), RetryPolicy::default())
    }

    /// Create an empty queue with a custom table and retry policy.
    pub fn with_policy(table: &'static CommandTable, policy: RetryPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            in_flight: None,
            table,
            policy,
        }
    }

    /// Append a command.
    ///
    /// On an empty queue the command is transmitted synchronously instead of
    /// waiting for the next tick.
    pub fn enqueue<T: Transmit>(&mut self, command: Command, now: Instant, tx: &mut T) {
        if self.entries.is_empty() {
            self.entries.push_back(command);
            self.start_head(now, tx);
            return;
        }

        tracing::debug!("Queued {} behind {} pending", command, self.entries.len());
        self.entries.push_back(command);
    }

    /// Feed a classified reply.
    ///
    /// Returns `true` if the reply completed the head.
    pub fn on_response<T: Transmit>(
        &mut self,
        response: &Response,
        now: Instant,
        tx: &mut T,
    ) -> bool {
        let Some(head) = self.entries.front() else {
            tracing::debug!("Reply {} with nothing pending", response.token);
            return false;
        };

        let completes =
            !self.table.produces_reply(head.mnemonic()) || head.as_str() == response.token;
        if !completes {
            tracing::debug!("Reply {} does not match pending {}", response.token, head);
            return false;
        }

        tracing::debug!("{} acknowledged", head);
        self.complete_head(now, tx);
        true
    }

    /// Periodic retry check.
    pub fn on_tick<T: Transmit>(&mut self, now: Instant, tx: &mut T) {
        let Some(pending) = self.in_flight.as_mut() else {
            return;
        };

        if now < pending.sent_at + self.policy.interval {
            return;
        }

        if pending.tries < self.policy.max_tries {
            pending.tries += 1;
            pending.sent_at = now;
            tracing::debug!("Retrying {} (attempt {})", pending.command, pending.tries);
            tx.transmit(&pending.command);
            return;
        }

        tracing::warn!(
            "No reply to {} after {} attempts, dropping",
            pending.command,
            pending.tries
        );
        self.complete_head(now, tx);
    }

    /// Drop every queued command and the in-flight tracking.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("Discarding {} queued commands", self.entries.len());
        }
        self.entries.clear();
        self.in_flight = None;
    }

    /// The command at the head of the queue.
    pub fn head(&self) -> Option<&Command> {
        self.entries.front()
    }

    /// Tracking for the in-flight command.
    pub fn in_flight(&self) -> Option<&PendingEntry> {
        self.in_flight.as_ref()
    }

    /// Iterate queued commands, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter()
    }

    /// Number of queued commands, including the head.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The active retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn complete_head<T: Transmit>(&mut self, now: Instant, tx: &mut T) {
        self.entries.pop_front();
        self.in_flight = None;
        self.start_head(now, tx);
    }

    /// Transmit the head; keep advancing past commands that never reply.
    fn start_head<T: Transmit>(&mut self, now: Instant, tx: &mut T) {
        while let Some(head) = self.entries.front() {
            tx.transmit(head);
            if self.table.produces_reply(head.mnemonic()) {
                self.in_flight = Some(PendingEntry {
                    command: head.clone(),
                    tries: 1,
                    sent_at: now,
                });
                return;
            }
            tracing::debug!("{} sends no reply, completed on transmit", head);
            self.entries.pop_front();
        }
        self.in_flight = None;
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{classify, POWER_ALIASES};

    fn cmd(s: &str) -> Command {
        Command::new(s).unwrap()
    }

    fn reply(line: &str) -> Response {
        classify(line, &POWER_ALIASES).unwrap()
    }

    fn sent(tx: &[Command]) -> Vec<&str> {
        tx.iter().map(Command::as_str).collect()
    }

    const TICK: Duration = DEFAULT_INTERVAL;

    #[test]
    fn test_enqueue_on_empty_transmits_immediately() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR1"), now, &mut tx);

        assert_eq!(sent(&tx), vec!["PWR1"]);
        let pending = queue.in_flight().unwrap();
        assert_eq!(pending.command.as_str(), "PWR1");
        assert_eq!(pending.tries, 1);
        assert_eq!(pending.sent_at, now);
    }

    #[test]
    fn test_enqueue_behind_head_waits() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR1"), now, &mut tx);
        queue.enqueue(cmd("OSD0"), now, &mut tx);
        queue.enqueue(cmd("RES2"), now, &mut tx);

        assert_eq!(sent(&tx), vec!["PWR1"]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.head().unwrap().as_str(), "PWR1");
    }

    #[test]
    fn test_matching_reply_advances() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR1"), now, &mut tx);
        queue.enqueue(cmd("OSD0"), now, &mut tx);

        assert!(queue.on_response(&reply("Pown"), now, &mut tx));

        assert_eq!(sent(&tx), vec!["PWR1", "OSD0"]);
        assert_eq!(queue.in_flight().unwrap().command.as_str(), "OSD0");

        assert!(queue.on_response(&reply("OSD0\r"), now, &mut tx));
        assert!(queue.is_empty());
        assert!(queue.in_flight().is_none());
    }

    #[test]
    fn test_power_prose_reply_completes_head() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR0"), now, &mut tx);
        assert!(queue.on_response(&reply("Power Off"), now, &mut tx));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_non_matching_reply_ignored() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR1"), now, &mut tx);

        assert!(!queue.on_response(&reply("PWR0"), now, &mut tx));
        assert!(!queue.on_response(&reply("OSD1"), now, &mut tx));
        assert_eq!(queue.head().unwrap().as_str(), "PWR1");
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_reply_with_empty_queue_ignored() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();

        assert!(!queue.on_response(&reply("PWR1"), Instant::now(), &mut tx));
        assert!(tx.is_empty());
    }

    #[test]
    fn test_no_reply_command_completes_without_input() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("SWV2"), now, &mut tx);

        assert_eq!(sent(&tx), vec!["SWV2"]);
        assert!(queue.is_empty());
        assert!(queue.in_flight().is_none());
    }

    #[test]
    fn test_no_reply_commands_chain() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("PWR1"), now, &mut tx);
        queue.enqueue(cmd("SWV1"), now, &mut tx);
        queue.enqueue(cmd("SWA0"), now, &mut tx);
        queue.enqueue(cmd("OSD0"), now, &mut tx);

        queue.on_response(&reply("PWR1"), now, &mut tx);

        // SWV1 and SWA0 go out back to back; OSD0 waits for its reply.
        assert_eq!(sent(&tx), vec!["PWR1", "SWV1", "SWA0", "OSD0"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.in_flight().unwrap().command.as_str(), "OSD0");
    }

    #[test]
    fn test_late_reply_after_fast_completion_is_harmless() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("SWV2"), now, &mut tx);
        queue.enqueue(cmd("PWR1"), now, &mut tx);
        assert_eq!(queue.head().unwrap().as_str(), "PWR1");

        // The device answers SWV2 after all; PWR1 must stay pending.
        assert!(!queue.on_response(&reply("SWV2"), now, &mut tx));
        assert_eq!(queue.head().unwrap().as_str(), "PWR1");
        assert_eq!(sent(&tx), vec!["SWV2", "PWR1"]);
    }

    #[test]
    fn test_tick_too_soon_is_noop() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("PWR1"), start, &mut tx);
        queue.on_tick(start + TICK - Duration::from_millis(1), &mut tx);

        assert_eq!(tx.len(), 1);
        assert_eq!(queue.in_flight().unwrap().tries, 1);
    }

    #[test]
    fn test_tick_with_empty_queue_is_noop() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();

        queue.on_tick(Instant::now() + TICK * 10, &mut tx);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_retry_then_drop_silent_head() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("PWR1"), start, &mut tx);
        queue.enqueue(cmd("OSD0"), start, &mut tx);
        queue.enqueue(cmd("RES2"), start, &mut tx);

        for n in 1..=4u32 {
            queue.on_tick(start + TICK * n, &mut tx);
            let pending = queue.in_flight().unwrap();
            assert_eq!(pending.command.as_str(), "PWR1");
            assert_eq!(pending.tries, n + 1);
            assert_eq!(pending.sent_at, start + TICK * n);
        }

        let dropped_at = start + TICK * 5;
        queue.on_tick(dropped_at, &mut tx);

        let pending = queue.in_flight().unwrap();
        assert_eq!(pending.command.as_str(), "OSD0");
        assert_eq!(pending.tries, 1);
        assert_eq!(queue.len(), 2);
        let expected: Vec<_> = vec!["PWR1"; 5].into_iter().chain(["OSD0"]).collect();
        assert_eq!(sent(&tx), expected);

        let elapsed = dropped_at - start;
        assert!(elapsed >= TICK * 4);
        assert!(elapsed < TICK * 5 + Duration::from_millis(1));
    }

    #[test]
    fn test_late_ticks_still_bound_attempts() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("HMD"), start, &mut tx);

        // Irregular tick spacing, each at least one interval apart.
        let mut now = start;
        for gap in [250u64, 200, 900, 210, 200] {
            now += Duration::from_millis(gap);
            queue.on_tick(now, &mut tx);
        }

        assert!(queue.is_empty());
        assert_eq!(tx.len(), 5);
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy {
            interval: Duration::from_millis(50),
            max_tries: 2,
        };
        let mut queue = DispatchQueue::with_policy(CommandTable::standard(), policy);
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("OSD1"), start, &mut tx);
        queue.on_tick(start + Duration::from_millis(50), &mut tx);
        queue.on_tick(start + Duration::from_millis(100), &mut tx);

        assert_eq!(tx.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.policy(), policy);
    }

    #[test]
    fn test_unknown_mnemonic_waits_for_reply() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        queue.enqueue(cmd("XYZ1"), now, &mut tx);
        assert_eq!(queue.len(), 1);
        assert!(queue.on_response(&reply("XYZ1"), now, &mut tx));
    }

    #[test]
    fn test_same_command_twice_gets_fresh_budget() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("PWR1"), start, &mut tx);
        queue.enqueue(cmd("PWR1"), start, &mut tx);
        queue.on_tick(start + TICK, &mut tx);
        assert_eq!(queue.in_flight().unwrap().tries, 2);

        queue.on_response(&reply("Pown"), start + TICK, &mut tx);
        let pending = queue.in_flight().unwrap();
        assert_eq!(pending.tries, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_discards_in_flight() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let start = Instant::now();

        queue.enqueue(cmd("PWR1"), start, &mut tx);
        queue.enqueue(cmd("OSD1"), start, &mut tx);
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.in_flight().is_none());

        queue.on_tick(start + TICK * 3, &mut tx);
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_queue_growth_is_unbounded() {
        let mut queue = DispatchQueue::new();
        let mut tx = Vec::new();
        let now = Instant::now();

        for _ in 0..10_000 {
            queue.enqueue(cmd("OSD1"), now, &mut tx);
        }

        assert_eq!(queue.len(), 10_000);
        assert_eq!(tx.len(), 1);
    }
}
