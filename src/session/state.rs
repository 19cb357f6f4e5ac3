use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::phase::Phase;
use crate::config::{CategorySpec, Settings};
use crate::injection::InjectionReport;
use crate::selection::SelectionResolver;
use crate::timing::TimingWindow;

// Per-session state, created on entering the lobby flow and dropped on reset

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionState {
  NotStarted,
  InFlight { run_id: u64, started_at: Instant },
  Reported(InjectionReport),
}

#[derive(Debug)]
pub struct Session {
  pub id: Uuid,
  pub phase: Phase,
  pub started_at: Instant,
  pub started_wall: DateTime<Utc>,
  /// Tunables captured when the session was created; later saves apply to the next session.
  pub settings: Settings,
  pub resolver: SelectionResolver,
  pub window: Option<TimingWindow>,
  pub injection: InjectionState,
  /// Upstream phase that arrived while an injection was in flight.
  pub pending_upstream: Option<Phase>,
  pub persisted: bool,
}

impl Session {
  pub fn new(phase: Phase, settings: Settings, categories: &[CategorySpec], now: Instant) -> Self {
    Self {
      id: Uuid::new_v4(),
      phase,
      started_at: now,
      started_wall: Utc::now(),
      settings,
      resolver: SelectionResolver::new(categories),
      window: None,
      injection: InjectionState::NotStarted,
      pending_upstream: None,
      persisted: false,
    }
  }

  pub fn injection_in_flight(&self) -> bool {
    matches!(self.injection, InjectionState::InFlight { .. })
  }

  pub fn in_flight_run(&self) -> Option<u64> {
    match self.injection {
      InjectionState::InFlight { run_id, .. } => Some(run_id),
      _ => None,
    }
  }

  pub fn last_report(&self) -> Option<&InjectionReport> {
    match &self.injection {
      InjectionState::Reported(report) => Some(report),
      _ => None,
    }
  }
}
