//! # Progress reporting
//!
//! The processing phases report their advancement through a [`ProgressSink`]. Reporting is
//! fire-and-forget: a sink never blocks the caller and never fails it.
//!
//! Implementations
//! -----------------
//! * [`NullSink`] – discards every message.
//! * [`std::sync::mpsc::Sender<StatusMessage>`] – forwards messages to a monitoring thread;
//!   a disconnected receiver is ignored.
//! * `progress_bar::BarSink` – renders an `indicatif` bar (feature `progress`).
//!
//! Throttling
//! -----------------
//! [`ProgressTicker`] turns "one more item done" into percentage increments: one message per
//! 1 % of the items (rounded up), or one per item when there are fewer than 100 of them.
use std::fmt;
use std::sync::mpsc::Sender;

use crate::constants::RunId;

#[cfg(feature = "progress")]
pub mod progress_bar;

/// Processing phase a [`StatusMessage`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The run is idle: skipped or waiting for missing configuration.
    Wait,
    Cluster,
    Solve,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Wait => "Waiting",
            Phase::Cluster => "Clustering",
            Phase::Solve => "Solving",
        };
        f.write_str(name)
    }
}

/// One progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub run: RunId,
    pub phase: Phase,
    /// Percentage points completed since the previous message of this phase.
    pub increment: u32,
}

impl StatusMessage {
    pub fn new(run: RunId, phase: Phase, increment: u32) -> Self {
        StatusMessage {
            run,
            phase,
            increment,
        }
    }

    pub fn wait(run: RunId) -> Self {
        Self::new(run, Phase::Wait, 0)
    }
}

/// Receiver of progress notifications.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: StatusMessage);
}

/// Sink that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn notify(&self, _message: StatusMessage) {}
}

impl ProgressSink for Sender<StatusMessage> {
    fn notify(&self, message: StatusMessage) {
        // The monitor may already be gone; progress is best effort.
        let _ = self.send(message);
    }
}

/// Throttles per-item progress into percentage increments.
#[derive(Debug, Clone)]
pub struct ProgressTicker {
    run: RunId,
    phase: Phase,
    flush_every: usize,
    increment: u32,
    count: usize,
}

impl ProgressTicker {
    /// Arguments
    /// -----------------
    /// * `run`, `phase`: Copied into every emitted message.
    /// * `total`: Number of items the phase will process.
    pub fn new(run: RunId, phase: Phase, total: usize) -> Self {
        let (flush_every, increment) = if total < 100 {
            (1, 100 / total.max(1) as u32)
        } else {
            (total.div_ceil(100), 1)
        };
        ProgressTicker {
            run,
            phase,
            flush_every,
            increment,
            count: 0,
        }
    }

    /// Record one processed item and notify the sink when a step is complete.
    pub fn tick(&mut self, sink: &dyn ProgressSink) {
        self.count += 1;
        if self.count >= self.flush_every {
            self.count = 0;
            sink.notify(StatusMessage::new(self.run, self.phase, self.increment));
        }
    }
}
