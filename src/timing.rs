use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{THRESHOLD_MAX_S, THRESHOLD_MIN_S};

// Deadline computation for the just-in-time injection step.
// The controller never sleeps itself; consumers arm timers on the produced deadline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingWindow {
  pub threshold: Duration,
  pub created_at: Instant,
  pub deadline: Instant,
}

impl TimingWindow {
  pub fn remaining(&self, now: Instant) -> Duration {
    self.deadline.saturating_duration_since(now)
  }

  pub fn is_expired(&self, now: Instant) -> bool {
    now >= self.deadline
  }
}

#[derive(Debug, Clone, Copy)]
pub struct TimingController {
  min: Duration,
  max: Duration,
}

impl Default for TimingController {
  fn default() -> Self {
    Self::new(
      Duration::from_secs_f64(THRESHOLD_MIN_S),
      Duration::from_secs_f64(THRESHOLD_MAX_S),
    )
  }
}

impl TimingController {
  pub fn new(min: Duration, max: Duration) -> Self {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    Self { min, max }
  }

  pub fn clamp_threshold(&self, threshold: Duration) -> Duration {
    threshold.clamp(self.min, self.max)
  }

  pub fn compute_deadline(&self, phase_entry: Instant, threshold: Duration) -> Instant {
    phase_entry + self.clamp_threshold(threshold)
  }

  /// Window for a session entering `Launching` at `phase_entry`.
  pub fn window(&self, phase_entry: Instant, threshold: Duration) -> TimingWindow {
    let threshold = self.clamp_threshold(threshold);
    // A zero-width range still has to produce a deadline strictly in the future
    let threshold = threshold.max(Duration::from_millis(1));
    let window = TimingWindow {
      threshold,
      created_at: phase_entry,
      deadline: phase_entry + threshold,
    };
    debug!(
      "[Timing] Window armed: threshold {:.3}s",
      window.threshold.as_secs_f64()
    );
    window
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deadline_is_entry_plus_threshold() {
    let tc = TimingController::default();
    let t = Instant::now();
    assert_eq!(tc.compute_deadline(t, Duration::from_millis(500)), t + Duration::from_millis(500));
  }

  #[test]
  fn deadline_is_monotonic_in_threshold() {
    let tc = TimingController::default();
    let t = Instant::now();
    let mut prev = tc.compute_deadline(t, Duration::from_millis(300));
    for ms in (310..=2000).step_by(10) {
      let d = tc.compute_deadline(t, Duration::from_millis(ms));
      assert!(d > prev, "threshold {}ms did not move the deadline", ms);
      prev = d;
    }
  }

  #[test]
  fn thresholds_outside_range_are_clamped_before_use() {
    let tc = TimingController::default();
    let t = Instant::now();
    assert_eq!(tc.compute_deadline(t, Duration::ZERO), t + Duration::from_millis(300));
    assert_eq!(tc.compute_deadline(t, Duration::from_secs(10)), t + Duration::from_secs(2));
    assert_eq!(tc.clamp_threshold(Duration::from_millis(100)), Duration::from_millis(300));
  }

  #[test]
  fn remaining_counts_down_and_saturates() {
    let t = Instant::now();
    let w = TimingController::default().window(t, Duration::from_millis(500));
    assert_eq!(w.remaining(t), Duration::from_millis(500));
    assert_eq!(w.remaining(t + Duration::from_millis(200)), Duration::from_millis(300));
    assert_eq!(w.remaining(t + Duration::from_secs(5)), Duration::ZERO);
    assert_eq!(w.created_at, t);
  }

  #[test]
  fn window_deadline_is_always_after_creation() {
    let tc = TimingController::new(Duration::ZERO, Duration::ZERO);
    let t = Instant::now();
    let w = tc.window(t, Duration::ZERO);
    assert!(w.deadline > w.created_at);
    assert!(!w.is_expired(t));
    assert!(w.is_expired(w.deadline));
  }
}
