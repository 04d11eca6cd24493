// ─── Launch Events ───
// Everything the supervisor reports to the outside world: preparation
// progress, batched game output and exactly one terminal notification.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusEvent {
    pub step_index: usize,
    pub total_steps: usize,
    /// Completion of the current step in `[0.0, 1.0]`.
    pub fraction: f64,
    pub description: String,
    /// Human readable byte progress, when the step transfers data.
    pub bytes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogLine {
    pub stream: OutputStream,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogBatch {
    pub lines: Vec<LogLine>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Clean exit, or any exit after `force_stop`.
    Stopped,
    /// Non-zero exit code.
    Errored,
    /// The OS refused to create the process.
    LaunchFailed,
    /// Waiting on the child failed.
    InternalError,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TerminalEvent {
    pub reason: TerminalReason,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

/// Receives launch notifications. All methods default to no-ops.
pub trait LaunchObserver: Send + Sync {
    fn on_status(&self, _event: &StatusEvent) {}
    fn on_log_batch(&self, _batch: &LogBatch) {}
    fn on_terminal(&self, _event: &TerminalEvent) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum LaunchEvent {
    Status(StatusEvent),
    Log(LogBatch),
    Terminal(TerminalEvent),
}

/// Forwards every notification into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<LaunchEvent>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<LaunchEvent>) -> Self {
        Self { tx }
    }
}

impl LaunchObserver for ChannelObserver {
    fn on_status(&self, event: &StatusEvent) {
        let _ = self.tx.send(LaunchEvent::Status(event.clone()));
    }

    fn on_log_batch(&self, batch: &LogBatch) {
        let _ = self.tx.send(LaunchEvent::Log(batch.clone()));
    }

    fn on_terminal(&self, event: &TerminalEvent) {
        let _ = self.tx.send(LaunchEvent::Terminal(event.clone()));
    }
}

/// Drops status updates arriving closer than `min_spacing` to the previous
/// one. Final updates (`fraction >= 1.0`) always pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_spacing: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last: None,
        }
    }

    pub fn should_emit(&mut self, fraction: f64) -> bool {
        self.should_emit_at(fraction, Instant::now())
    }

    fn should_emit_at(&mut self, fraction: f64, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_spacing,
        };
        if fraction >= 1.0 || due {
            self.last = Some(now);
            return true;
        }
        false
    }
}

/// `"1.5 MiB / 4.0 MiB"`, or just the done part when the total is unknown.
pub fn format_byte_progress(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!("{} / {}", human_bytes(done), human_bytes(total)),
        None => human_bytes(done),
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
