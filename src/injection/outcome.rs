use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::selection::CandidateSelection;

// Inputs and results of one injection run

/// Immutable snapshot handed to the executor when `Modifying` is entered.
/// Later selection changes never reach an in-flight run.
#[derive(Debug, Clone)]
pub struct InjectionPlan {
  pub session_id: Uuid,
  pub run_id: u64,
  pub selections: Arc<[CandidateSelection]>,
  pub deadline: Instant,
  pub threshold: Duration,
  pub monitor_timeout: Duration,
  pub entered_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectionOutcome {
  Success,
  VerifyFailed { expected: String, actual: String },
  TimedOut,
  ProcessError { message: String },
}

impl InjectionOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success)
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Success => "Success",
      Self::VerifyFailed { .. } => "VerifyFailed",
      Self::TimedOut => "TimedOut",
      Self::ProcessError { .. } => "ProcessError",
    }
  }
}

impl fmt::Display for InjectionOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Success => write!(f, "Success"),
      Self::VerifyFailed { expected, actual } => {
        write!(f, "VerifyFailed (expected {}, found {})", expected, actual)
      }
      Self::TimedOut => write!(f, "TimedOut"),
      Self::ProcessError { message } => write!(f, "ProcessError: {}", message),
    }
  }
}

/// Outcome plus the timing facts diagnostics are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
  pub session_id: Uuid,
  pub run_id: u64,
  pub outcome: InjectionOutcome,
  pub started_at: Instant,
  pub finished_at: Instant,
  pub deadline: Instant,
  pub threshold: Duration,
  pub monitor_timeout: Duration,
}

impl InjectionReport {
  pub fn new(plan: &InjectionPlan, outcome: InjectionOutcome, started_at: Instant, finished_at: Instant) -> Self {
    Self {
      session_id: plan.session_id,
      run_id: plan.run_id,
      outcome,
      started_at,
      finished_at,
      deadline: plan.deadline,
      threshold: plan.threshold,
      monitor_timeout: plan.monitor_timeout,
    }
  }

  pub fn elapsed(&self) -> Duration {
    self.finished_at.saturating_duration_since(self.started_at)
  }

  /// The run took longer than the injection threshold it was scheduled with.
  pub fn finished_late(&self) -> bool {
    self.elapsed() > self.threshold
  }
}
