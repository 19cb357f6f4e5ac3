use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::executor::Injector;
use super::outcome::{InjectionOutcome, InjectionPlan, InjectionReport};

// Bounds every injection run by the monitor auto-resume timeout

#[derive(Clone)]
pub struct Watchdog {
  injector: Arc<dyn Injector>,
}

impl Watchdog {
  pub fn new(injector: Arc<dyn Injector>) -> Self {
    Self { injector }
  }

  /// Instant the run is abandoned at: monitor timeout after `Modifying` began.
  pub fn fire_at(plan: &InjectionPlan) -> Instant {
    let base = plan.entered_at.min(plan.deadline);
    base.checked_add(plan.monitor_timeout).unwrap_or(base)
  }

  /// Run `plan` to completion or until the watchdog fires, whichever is first.
  ///
  /// Always returns a report; on expiry the run is cancelled and reported as
  /// `TimedOut` without waiting for the process to exit.
  pub async fn supervise(&self, plan: InjectionPlan) -> InjectionReport {
    let started_at = Instant::now();
    let fire_at = Self::fire_at(&plan);
    let cancel = CancellationToken::new();

    let mut task = {
      let injector = self.injector.clone();
      let plan = plan.clone();
      let cancel = cancel.clone();
      tokio::spawn(async move { injector.run(&plan, cancel).await })
    };

    let outcome = tokio::select! {
      joined = &mut task => match joined {
        Ok(outcome) => outcome,
        Err(e) => {
          error!("[Watchdog] Injection task for run {} died: {}", plan.run_id, e);
          InjectionOutcome::ProcessError { message: format!("injection task failed: {}", e) }
        }
      },
      _ = sleep_until(fire_at) => {
        warn!(
          "[Watchdog] Run {} exceeded {}s; auto-resuming",
          plan.run_id,
          plan.monitor_timeout.as_secs()
        );
        cancel.cancel();
        // Drops an injector that ignores the token, and any child it owns
        task.abort();
        InjectionOutcome::TimedOut
      }
    };

    let finished_at = Instant::now();
    info!(
      "[Watchdog] Run {} reported {} after {:.2}s",
      plan.run_id,
      outcome.label(),
      finished_at.saturating_duration_since(started_at).as_secs_f64()
    );
    InjectionReport::new(&plan, outcome, started_at, finished_at)
  }
}
