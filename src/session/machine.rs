use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::phase::{Phase, TransitionKind};
use super::state::{InjectionState, Session};
use crate::config::{CategorySpec, Settings};
use crate::error::TransitionError;
use crate::injection::{InjectionPlan, InjectionReport};
use crate::selection::{
  CandidateSelection, CategoryId, SelectionInput, SelectionNotice, SelectionStore, TargetId,
};
use crate::timing::TimingController;

/// Side effects requested by the state machine. The machine itself never
/// sleeps, spawns or does IO beyond the durable selection store.
#[derive(Debug, Clone)]
pub enum Directive {
  PhaseEntered {
    session_id: Option<Uuid>,
    phase: Phase,
  },
  ArmDeadline {
    session_id: Uuid,
    deadline: Instant,
  },
  StartInjection(InjectionPlan),
  Notice(SelectionNotice),
  Outcome(InjectionReport),
}

#[derive(Debug)]
pub struct PhaseStateMachine {
  phase: Phase,
  session: Option<Session>,
  categories: Vec<CategorySpec>,
  settings: Settings,
  timing: TimingController,
  store: Option<SelectionStore>,
  next_run_id: u64,
  last_outcome: Option<InjectionReport>,
}

impl PhaseStateMachine {
  pub fn new(categories: Vec<CategorySpec>, settings: Settings) -> Self {
    Self {
      phase: Phase::Idle,
      session: None,
      categories,
      settings,
      timing: TimingController::default(),
      store: None,
      next_run_id: 1,
      last_outcome: None,
    }
  }

  pub fn with_store(mut self, store: SelectionStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn with_timing(mut self, timing: TimingController) -> Self {
    self.timing = timing;
    self
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn session(&self) -> Option<&Session> {
    self.session.as_ref()
  }

  pub fn settings(&self) -> Settings {
    self.settings
  }

  /// New tunables take effect for the next session; a live session keeps its snapshot.
  pub fn set_settings(&mut self, settings: Settings) {
    self.settings = settings;
  }

  pub fn last_outcome(&self) -> Option<&InjectionReport> {
    self.last_outcome.as_ref()
  }

  pub fn current_selections(&self) -> Vec<CandidateSelection> {
    self
      .session
      .as_ref()
      .map(|s| s.resolver.current_selections())
      .unwrap_or_default()
  }

  /// Apply an upstream phase change.
  ///
  /// A backward change is only honored when `authoritative` (a fresh read of
  /// upstream state); it then tears the session down through `Ended -> Idle`
  /// and walks forward again. Otherwise it is rejected and the caller should re-sync.
  pub fn on_phase(
    &mut self,
    target: Phase,
    authoritative: bool,
    now: Instant,
  ) -> Result<Vec<Directive>, TransitionError> {
    if self.phase == Phase::Modifying {
      if let Some(session) = self.session.as_mut().filter(|s| s.injection_in_flight()) {
        if target != Phase::Modifying {
          info!("[Phase] Holding upstream {} until the injection reports", target);
          session.pending_upstream = Some(target);
        }
        return Ok(Vec::new());
      }
    }

    match self.phase.classify(target) {
      TransitionKind::Reenter => {
        if target == Phase::Modifying {
          Ok(self.enter_modifying(now))
        } else {
          Ok(Vec::new())
        }
      }
      TransitionKind::Forward => Ok(self.forward(target, now)),
      TransitionKind::Reset | TransitionKind::Abort => Ok(self.step(target, now)),
      TransitionKind::Backward if authoritative => {
        info!(
          "[Phase] Authoritative {} -> {}; resetting session",
          self.phase, target
        );
        let mut out = Vec::new();
        if self.phase != Phase::Ended {
          out.extend(self.step(Phase::Ended, now));
        }
        out.extend(self.step(Phase::Idle, now));
        if target != Phase::Idle {
          out.extend(self.forward(target, now));
        }
        Ok(out)
      }
      TransitionKind::Backward => {
        warn!("[Phase] Rejected {} -> {}", self.phase, target);
        Err(TransitionError::Backward {
          from: self.phase,
          to: target,
        })
      }
    }
  }

  pub fn on_candidate(&mut self, input: SelectionInput) -> Vec<Directive> {
    let phase = self.phase;
    let Some(session) = self.session.as_mut() else {
      debug!("[Phase] No session; dropping {} candidate {}", input.category, input.candidate);
      return Vec::new();
    };
    if !phase.accepts_selections() {
      debug!(
        "[Phase] Candidate {} ignored during {}",
        input.candidate, phase
      );
      return Vec::new();
    }
    session
      .resolver
      .apply(input)
      .into_iter()
      .map(Directive::Notice)
      .collect()
  }

  pub fn on_default_candidate(
    &mut self,
    category: &CategoryId,
    target: Option<TargetId>,
    at: Instant,
  ) -> Vec<Directive> {
    let phase = self.phase;
    match self.session.as_mut() {
      Some(session) if phase.accepts_selections() => session
        .resolver
        .apply_default(category, target, at)
        .into_iter()
        .map(Directive::Notice)
        .collect(),
      _ => Vec::new(),
    }
  }

  /// The `Launching` deadline elapsed. Stale timers from older sessions are ignored.
  pub fn on_deadline(&mut self, session_id: Uuid, now: Instant) -> Vec<Directive> {
    let Some(session) = self.session.as_mut() else {
      return Vec::new();
    };
    if session.id != session_id || self.phase != Phase::Launching {
      debug!("[Phase] Ignoring stale deadline for session {}", session_id);
      return Vec::new();
    }
    if !session.resolver.has_selections() {
      session.resolver.freeze();
      info!("[Phase] Deadline reached with nothing selected; no injection this session");
      return Vec::new();
    }
    self.enter_modifying(now)
  }

  pub fn on_injection_finished(&mut self, report: InjectionReport, now: Instant) -> Vec<Directive> {
    info!(
      "[Phase] Injection run {} finished: {} after {:.2}s",
      report.run_id,
      report.outcome,
      report.elapsed().as_secs_f64()
    );
    self.last_outcome = Some(report.clone());
    let mut out = vec![Directive::Outcome(report.clone())];

    let Some(session) = self.session.as_mut() else {
      return out;
    };
    if session.id != report.session_id || session.in_flight_run() != Some(report.run_id) {
      warn!("[Phase] Outcome for run {} does not match the live session", report.run_id);
      return out;
    }
    session.injection = InjectionState::Reported(report);
    let pending = session.pending_upstream.take();

    if self.phase == Phase::Modifying {
      out.extend(self.step(Phase::InMatch, now));
    }
    if let Some(target) = pending.filter(|p| *p != self.phase) {
      match self.on_phase(target, true, now) {
        Ok(directives) => out.extend(directives),
        Err(e) => warn!("[Phase] Dropping held upstream phase: {}", e),
      }
    }
    out
  }

  fn forward(&mut self, target: Phase, now: Instant) -> Vec<Directive> {
    let from = self.phase;
    let injectable = self.session.as_ref().is_some_and(|s| {
      s.resolver.has_selections() && matches!(s.injection, InjectionState::NotStarted)
    });
    if target > Phase::Modifying && injectable {
      if from == Phase::Launching {
        info!("[Phase] Upstream reached {} before the deadline; injecting now", target);
        let mut out = self.enter_modifying(now);
        if let Some(session) = self.session.as_mut().filter(|s| s.injection_in_flight()) {
          session.pending_upstream = Some(target);
          return out;
        }
        out.extend(self.step(target, now));
        return out;
      }
      if from < Phase::Launching {
        warn!(
          "[Phase] {} -> {} skipped the launch; selections will not be injected",
          from, target
        );
      }
    }
    self.step(target, now)
  }

  fn enter_modifying(&mut self, now: Instant) -> Vec<Directive> {
    let ready = self
      .session
      .as_ref()
      .is_some_and(|s| !s.injection_in_flight() && s.resolver.has_selections());
    if !ready {
      debug!("[Phase] Modifying entry ignored (run in flight or nothing selected)");
      return Vec::new();
    }
    let mut out = Vec::new();
    if self.phase != Phase::Modifying {
      out.extend(self.step(Phase::Modifying, now));
    }
    let run_id = self.next_run_id;
    self.next_run_id += 1;

    let Some(session) = self.session.as_mut() else {
      return out;
    };
    let selections = session.resolver.freeze();
    let (deadline, threshold) = match session.window {
      Some(w) => (w.deadline, w.threshold),
      None => (now, session.settings.injection_threshold()),
    };
    let plan = InjectionPlan {
      session_id: session.id,
      run_id,
      selections: Arc::from(selections),
      deadline,
      threshold,
      monitor_timeout: session.settings.monitor_timeout(),
      entered_at: now,
    };
    session.injection = InjectionState::InFlight {
      run_id,
      started_at: now,
    };
    info!(
      "[Phase] Starting injection run {} with {} selection(s)",
      run_id,
      plan.selections.len()
    );
    out.push(Directive::StartInjection(plan));
    out
  }

  /// One legal edge plus its entry actions.
  fn step(&mut self, to: Phase, now: Instant) -> Vec<Directive> {
    let from = self.phase;
    self.phase = to;
    info!("[Phase] {} -> {}", from, to);

    if to == Phase::Idle {
      if let Some(session) = self.session.take() {
        debug!("[Phase] Session {} destroyed", session.id);
      }
      return vec![Directive::PhaseEntered {
        session_id: None,
        phase: to,
      }];
    }

    if self.session.is_none() {
      let session = Session::new(to, self.settings, &self.categories, now);
      info!("[Phase] Session {} created", session.id);
      self.session = Some(session);
    }
    let Some(session) = self.session.as_mut() else {
      return Vec::new();
    };
    session.phase = to;
    let mut out = vec![Directive::PhaseEntered {
      session_id: Some(session.id),
      phase: to,
    }];

    match to {
      Phase::Lobby if from.classify(to) == TransitionKind::Abort => {
        info!("[Phase] Selection aborted; discarding session selections");
        session.resolver.reset();
        session.window = None;
      }
      Phase::Selecting | Phase::ReadyCheck | Phase::Launching => {
        if !session.resolver.is_armed() {
          let prior = self.store.as_ref().map(|s| s.load()).unwrap_or_default();
          let notices = session.resolver.arm(None, prior, now);
          out.extend(notices.into_iter().map(Directive::Notice));
        }
        if to == Phase::Launching {
          let window = self.timing.window(now, session.settings.injection_threshold());
          session.window = Some(window);
          out.push(Directive::ArmDeadline {
            session_id: session.id,
            deadline: window.deadline,
          });
        }
      }
      Phase::InMatch | Phase::Ended => {
        if !session.persisted {
          let entries = session.resolver.durable_entries();
          if let Some(store) = &self.store {
            if let Err(e) = store.write_entries(&entries) {
              warn!("[Phase] Failed to persist selections: {}", e);
            }
          }
          session.persisted = true;
        }
        session.resolver.reset();
      }
      _ => {}
    }
    out
  }
}
