//! Rate and remaining-time estimation.
//!
//! Two rolling cursors give an "immediate" rate as a two-point derivative,
//! refreshed at most every [`RATE_UPDATE_INTERVAL`]. The remaining time is
//! derived from a bounded history of total-duration estimates
//! (`elapsed / fraction`) so a single jumpy progress report does not make
//! the ETA swing.
//!
//! Every method takes `now` explicitly; [`super::TaskContext`] passes
//! `Instant::now()`, tests pass synthetic instants.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of duration estimates averaged for the ETA.
pub const ETA_SAMPLES: usize = 16;

/// Minimum time between two rate cursor updates.
pub const RATE_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct Cursor {
    written: u64,
    elapsed: Duration,
}

/// Rate and ETA estimator for one run.
#[derive(Debug)]
pub struct RateEstimator {
    started: Option<Instant>,
    baseline: u64,
    current: Option<Cursor>,
    previous: Option<Cursor>,
    history: VecDeque<f64>,
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RateEstimator {
    pub fn new() -> Self {
        Self {
            started: None,
            baseline: 0,
            current: None,
            previous: None,
            history: VecDeque::with_capacity(ETA_SAMPLES),
        }
    }

    /// Start (or restart) the timer with `written` as the byte baseline.
    pub fn start(&mut self, written: u64, now: Instant) {
        self.started = Some(now);
        self.baseline = written;
        self.current = Some(Cursor {
            written,
            elapsed: Duration::ZERO,
        });
        self.previous = None;
        self.history.clear();
    }

    /// Drop all timing state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Time since the timer was started.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started.map(|start| now.saturating_duration_since(start))
    }

    /// Fold a new written-bytes value into the rate cursors.
    ///
    /// The cursors only move once [`RATE_UPDATE_INTERVAL`] has passed since
    /// the last move.
    pub fn record_written(&mut self, written: u64, now: Instant) {
        let Some(elapsed) = self.elapsed(now) else {
            return;
        };

        match self.current {
            Some(current) if elapsed.saturating_sub(current.elapsed) < RATE_UPDATE_INTERVAL => {}
            _ => {
                self.previous = self.current;
                self.current = Some(Cursor { written, elapsed });
            }
        }
    }

    /// Two-point derivative between the last two cursors, in bytes/s.
    pub fn immediate_rate(&self) -> Option<f64> {
        let (current, previous) = (self.current?, self.previous?);
        let dt = current.elapsed.saturating_sub(previous.elapsed).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        Some(current.written.saturating_sub(previous.written) as f64 / dt)
    }

    /// Average rate since the timer started, in bytes/s.
    pub fn average_rate(&self, written: u64, now: Instant) -> Option<f64> {
        let elapsed = self.elapsed(now)?.as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(written.saturating_sub(self.baseline) as f64 / elapsed)
    }

    /// Record a progress report and add a total-duration estimate.
    pub fn record_progress(&mut self, fraction: f64, now: Instant) {
        let Some(elapsed) = self.elapsed(now) else {
            return;
        };
        if fraction <= 0.0 || !fraction.is_finite() {
            return;
        }

        let total = elapsed.as_secs_f64() / fraction.min(1.0);
        if self.history.len() == ETA_SAMPLES {
            self.history.pop_front();
        }
        self.history.push_back(total);
    }

    /// Smoothed remaining time, once [`ETA_SAMPLES`] estimates exist.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.history.len() < ETA_SAMPLES {
            return None;
        }
        let elapsed = self.elapsed(now)?.as_secs_f64();
        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        Some(Duration::from_secs_f64((mean - elapsed).max(0.0)))
    }

    /// Forget the duration estimates but keep the timer running.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Number of duration estimates currently held.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
