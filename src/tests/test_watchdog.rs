// Tests for the watchdog guarantee: a run never holds the session past the monitor timeout

use super::test_helpers::*;
use crate::injection::{InjectionOutcome, Watchdog};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
mod watchdog_tests {
  use super::*;

  /// Test: a slow modification step is abandoned at the monitor timeout
  ///
  /// Scenario: monitor timeout 60s, the injector needs 90s.
  /// Expected: TimedOut reported at ~60s, not 90s.
  #[tokio::test(start_paused = true)]
  async fn test_slow_injection_times_out() {
    let start = Instant::now();
    let watchdog = Watchdog::new(Arc::new(SleepyInjector::succeeding_after(Duration::from_secs(90))));
    let report = watchdog.supervise(skin_plan(60, start)).await;

    assert_eq!(report.outcome, InjectionOutcome::TimedOut);
    let took = report.finished_at - start;
    assert!(took >= Duration::from_secs(60), "took {:?}", took);
    assert!(took < Duration::from_secs(61), "took {:?}", took);
  }

  /// Test: an injector that ignores cancellation still cannot hold the session
  #[tokio::test(start_paused = true)]
  async fn test_stuck_injection_times_out() {
    let start = Instant::now();
    let watchdog = Watchdog::new(Arc::new(StuckInjector));
    let report = watchdog.supervise(skin_plan(20, start)).await;

    assert_eq!(report.outcome, InjectionOutcome::TimedOut);
    assert!(Instant::now() - start < Duration::from_secs(21));
  }

  /// Test: the abandoned run is dropped instead of lingering after the timeout
  ///
  /// Scenario: an injector that ignores cancellation holds a guard, monitor timeout 20s.
  /// Expected: TimedOut, and the guard is released shortly after.
  #[tokio::test(start_paused = true)]
  async fn test_abandoned_run_is_dropped() {
    let start = Instant::now();
    let (injector, alive) = HoldingInjector::new();
    let report = Watchdog::new(Arc::new(injector))
      .supervise(skin_plan(20, start))
      .await;
    assert_eq!(report.outcome, InjectionOutcome::TimedOut);

    let released = tokio::time::timeout(Duration::from_secs(1), alive).await;
    assert!(matches!(released, Ok(Err(_))), "run still alive: {:?}", released);
  }

  /// Test: a run that finishes in time reports its own outcome
  #[tokio::test(start_paused = true)]
  async fn test_fast_injection_reports_success() {
    let start = Instant::now();
    let watchdog = Watchdog::new(Arc::new(SleepyInjector::succeeding_after(secs(0.4))));
    let report = watchdog.supervise(skin_plan(60, start)).await;

    assert_eq!(report.outcome, InjectionOutcome::Success);
    assert!(report.elapsed() >= secs(0.4) && report.elapsed() < secs(0.45));
    assert!(!report.finished_late());
  }

  /// Test: process failures and a crashed injector both become ProcessError
  #[tokio::test(start_paused = true)]
  async fn test_failures_degrade_to_process_error() {
    let start = Instant::now();
    let report = Watchdog::new(Arc::new(FailingInjector))
      .supervise(skin_plan(60, start))
      .await;
    assert!(matches!(report.outcome, InjectionOutcome::ProcessError { ref message } if message.contains("overlay failed")));

    let report = Watchdog::new(Arc::new(PanickingInjector))
      .supervise(skin_plan(60, start))
      .await;
    assert!(matches!(report.outcome, InjectionOutcome::ProcessError { .. }));
    assert!(Instant::now() - start < Duration::from_secs(1));
  }

  /// Test: the timer counts from whichever came first, the deadline or Modifying entry
  #[test]
  fn test_fire_at_uses_earliest_anchor() {
    let t0 = Instant::now();
    let mut plan = skin_plan(60, t0);
    plan.deadline = t0 + secs(0.5);
    plan.entered_at = t0 + secs(0.3);
    assert_eq!(Watchdog::fire_at(&plan), t0 + secs(0.3) + Duration::from_secs(60));

    plan.entered_at = t0 + secs(0.7);
    assert_eq!(Watchdog::fire_at(&plan), t0 + secs(0.5) + Duration::from_secs(60));
  }
}
