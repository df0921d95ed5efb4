//! Progress estimation and reporting.
//!
//! This module defines two pieces the presentation layer builds on:
//! - `ProgressTracker`: linear time-remaining estimation from elapsed time
//! - `PhaseProgress`: callback trait decoupling the executor from any
//!   specific UI technology
//!
//! Neither has any effect on what gets backed up; both are observability
//! only.

use std::fmt;
use std::time::{Duration, Instant};

use crate::model::OpStats;

/// Which operation batch the executor is working through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Move,
    Copy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Move => write!(f, "Move"),
            Phase::Copy => write!(f, "Copy"),
        }
    }
}

/// Trait for receiving execution progress, implemented by the presentation
/// layer. All methods are called synchronously during batch execution.
pub trait PhaseProgress {
    /// Called before the first operation of a phase. `total_bytes` is zero
    /// for the move phase (renames transfer no content).
    fn on_phase_started(&self, phase: Phase, total_ops: usize, total_bytes: u64);

    /// Called after each operation, successful or not.
    fn on_operation_completed(
        &self,
        phase: Phase,
        completed: usize,
        total_ops: usize,
        bytes_done: u64,
    );

    /// Called once the whole phase is finished.
    fn on_phase_completed(&self, phase: Phase, stats: &OpStats);
}

/// Estimates time remaining from elapsed time and completed units,
/// assuming a uniform rate.
///
/// Totals and positions are unit-agnostic (items or bytes). A zero total is
/// clamped to one, and the current position is clamped to at least one when
/// estimating, so no estimate ever divides by zero.
#[derive(Debug)]
pub struct ProgressTracker {
    start: Instant,
    total: u64,
    current: u64,
    complete: bool,
    final_elapsed: Option<Duration>,
}

impl ProgressTracker {
    /// Create a tracker for `total` units of work.
    pub fn new(total: u64) -> ProgressTracker {
        ProgressTracker {
            start: Instant::now(),
            total: total.max(1),
            current: 0,
            complete: false,
            final_elapsed: None,
        }
    }

    /// Record the current completed position (out of the total).
    pub fn update(&mut self, current: u64) {
        self.current = current;
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        (self.current as f64 / self.total as f64).min(1.0)
    }

    /// Elapsed time, frozen once `mark_complete` has been called.
    pub fn elapsed(&self) -> Duration {
        self.final_elapsed.unwrap_or_else(|| self.start.elapsed())
    }

    /// Estimated time remaining, extrapolating linearly:
    /// `estimated_total = elapsed / (current / total)`.
    pub fn estimated_remaining(&self) -> Duration {
        if self.complete {
            return Duration::ZERO;
        }
        let elapsed = self.elapsed().as_secs_f64();
        let progress = self.current.max(1) as f64 / self.total as f64;
        let estimated_total = elapsed / progress;
        Duration::from_secs_f64((estimated_total - elapsed).max(0.0))
    }

    /// Freeze the elapsed time and mark the work finished.
    pub fn mark_complete(&mut self) {
        self.final_elapsed = Some(self.start.elapsed());
        self.complete = true;
        self.current = self.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_is_clamped() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.total(), 1);
        // no division by zero even before any update
        let _ = tracker.estimated_remaining();
    }

    #[test]
    fn test_estimate_is_zero_at_full_progress() {
        let mut tracker = ProgressTracker::new(10);
        tracker.update(10);
        assert_eq!(tracker.estimated_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_mark_complete_freezes_elapsed() {
        let mut tracker = ProgressTracker::new(4);
        tracker.update(4);
        tracker.mark_complete();

        let first = tracker.elapsed();
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(tracker.elapsed(), first);
        assert!(tracker.is_complete());
        assert_eq!(tracker.estimated_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_fraction_is_capped_at_one() {
        let mut tracker = ProgressTracker::new(5);
        tracker.update(2);
        assert!((tracker.fraction() - 0.4).abs() < f64::EPSILON);

        tracker.update(50);
        assert!((tracker.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
