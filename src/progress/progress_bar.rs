//! Terminal progress bar (feature `progress`).
//!
//! [`BarSink`] is a [`ProgressSink`] drawing an `indicatif` bar that advances with the
//! percentage increments of the phase. Its message shows the time since the previous
//! notification and the mean time per notification since the phase started.
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use super::{Phase, ProgressSink, StatusMessage};

/// Timing of the phase currently drawn.
struct PhaseClock {
    phase: Phase,
    started: Instant,
    previous: Instant,
    notifications: u32,
}

impl PhaseClock {
    fn start(phase: Phase) -> Self {
        let now = Instant::now();
        PhaseClock {
            phase,
            started: now,
            previous: now,
            notifications: 0,
        }
    }

    /// Records a notification, returns `(since previous, mean per notification)`.
    fn lap(&mut self) -> (Duration, Duration) {
        let now = Instant::now();
        let since = now.duration_since(self.previous);
        self.previous = now;
        self.notifications += 1;
        let mean = now.duration_since(self.started) / self.notifications;
        (since, mean)
    }
}

/// `"253µs"`, `"42ms"` or `"3.14s"`, depending on the magnitude.
fn human(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}

/// Progress bar over the 100 percentage points of a phase.
///
/// A message of a different phase restarts the bar; [`Phase::Wait`] clears it.
pub struct BarSink {
    bar: ProgressBar,
    clock: Mutex<Option<PhaseClock>>,
}

impl BarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix} {bar:40.cyan/blue} {pos:>3}% | ETA {eta_precise} | {msg}",
        ) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        BarSink {
            bar,
            clock: Mutex::new(None),
        }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn notify(&self, message: StatusMessage) {
        let Ok(mut clock) = self.clock.lock() else {
            return;
        };

        if clock.as_ref().map(|c| c.phase) != Some(message.phase) {
            *clock = Some(PhaseClock::start(message.phase));
            self.bar.reset();
            self.bar
                .set_prefix(format!("run {} {}", message.run, message.phase));
        }
        if message.phase == Phase::Wait {
            self.bar.set_message("skipped");
            self.bar.finish_and_clear();
            return;
        }

        let Some(clock) = clock.as_mut() else {
            return;
        };
        let (since, mean) = clock.lap();
        self.bar
            .set_message(format!("last: {}, mean: {}", human(since), human(mean)));
        self.bar.inc(u64::from(message.increment));
    }
}

impl Drop for BarSink {
    fn drop(&mut self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_bar_test {
    use super::*;

    #[test]
    fn test_human_duration() {
        assert_eq!(human(Duration::from_micros(253)), "253µs");
        assert_eq!(human(Duration::from_millis(42)), "42ms");
        assert_eq!(human(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_clock_restarts_with_the_phase() {
        let sink = BarSink::new();
        sink.notify(StatusMessage::new(1, Phase::Cluster, 10));
        sink.notify(StatusMessage::new(1, Phase::Cluster, 5));
        assert_eq!(sink.bar.position(), 15);
        {
            let clock = sink.clock.lock().unwrap();
            let clock = clock.as_ref().unwrap();
            assert_eq!((clock.phase, clock.notifications), (Phase::Cluster, 2));
        }

        sink.notify(StatusMessage::new(1, Phase::Solve, 1));
        assert_eq!(sink.bar.position(), 1);
        let clock = sink.clock.lock().unwrap();
        let clock = clock.as_ref().unwrap();
        assert_eq!((clock.phase, clock.notifications), (Phase::Solve, 1));
    }
}
