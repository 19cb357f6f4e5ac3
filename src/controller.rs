use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigStore, Settings};
use crate::diagnostics::{DiagnosticEntry, DiagnosticsRecorder};
use crate::error::{ConfigError, ControlError};
use crate::events::{BusEvent, BusStats, CandidateEvent, Envelope, EventBus, EventKind, RawEvent};
use crate::injection::{InjectionReport, Injector, Watchdog};
use crate::selection::{CandidateSelection, SelectionInput, SelectionNotice, SelectionSignal};
use crate::session::{Directive, Phase, PhaseStateMachine};

// Runtime wiring: bus -> state machine -> timers, watchdog and diagnostics

const CONTROL_CAPACITY: usize = 64;
const RAW_CAPACITY: usize = 256;
const NOTICE_CAPACITY: usize = 128;

/// What the outside world can observe without touching the machine.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
  pub phase: Phase,
  pub session_id: Option<Uuid>,
  pub selections: Vec<CandidateSelection>,
  pub last_outcome: Option<InjectionReport>,
  pub settings: Settings,
  pub connected: bool,
}

enum ControlMessage {
  DeadlineReached {
    session_id: Uuid,
  },
  InjectionFinished(InjectionReport),
  SaveSettings {
    threshold: f64,
    monitor_timeout: u64,
    reply: oneshot::Sender<Result<Settings, ConfigError>>,
  },
}

/// Bus context. Handlers mutate the machine and queue its directives; the
/// controller executes them once the event has been fully delivered.
struct Core {
  machine: PhaseStateMachine,
  directives: Vec<Directive>,
  resync_requested: bool,
  connected: bool,
}

pub struct Controller {
  bus: EventBus<Core>,
  core: Core,
  control_tx: mpsc::Sender<ControlMessage>,
  control_rx: mpsc::Receiver<ControlMessage>,
  raw_tx: mpsc::Sender<RawEvent>,
  raw_rx: mpsc::Receiver<RawEvent>,
  watchdog: Watchdog,
  diagnostics: Arc<Mutex<DiagnosticsRecorder>>,
  config: Option<ConfigStore>,
  status: watch::Sender<StatusSnapshot>,
  notices: broadcast::Sender<SelectionNotice>,
  resync: Arc<Notify>,
  shutdown: CancellationToken,
  deadline_timer: Option<JoinHandle<()>>,
}

/// Cloneable front door to a running [`Controller`].
#[derive(Clone)]
pub struct ControllerHandle {
  control: mpsc::Sender<ControlMessage>,
  raw: mpsc::Sender<RawEvent>,
  status: watch::Receiver<StatusSnapshot>,
  notices: broadcast::Sender<SelectionNotice>,
  diagnostics: Arc<Mutex<DiagnosticsRecorder>>,
  resync: Arc<Notify>,
  shutdown: CancellationToken,
}

fn lock(recorder: &Mutex<DiagnosticsRecorder>) -> MutexGuard<'_, DiagnosticsRecorder> {
  recorder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Controller {
  pub fn new(
    machine: PhaseStateMachine,
    injector: Arc<dyn Injector>,
    diagnostics: DiagnosticsRecorder,
  ) -> Self {
    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
    let (status, _) = watch::channel(StatusSnapshot {
      phase: machine.phase(),
      session_id: None,
      selections: Vec::new(),
      last_outcome: None,
      settings: machine.settings(),
      connected: false,
    });

    let mut bus = EventBus::new();
    subscribe_all(&mut bus);

    Self {
      bus,
      core: Core {
        machine,
        directives: Vec::new(),
        resync_requested: false,
        connected: false,
      },
      control_tx,
      control_rx,
      raw_tx,
      raw_rx,
      watchdog: Watchdog::new(injector),
      diagnostics: Arc::new(Mutex::new(diagnostics)),
      config: None,
      status,
      notices,
      resync: Arc::new(Notify::new()),
      shutdown: CancellationToken::new(),
      deadline_timer: None,
    }
  }

  /// Persist settings changes through `store` instead of only applying them in memory.
  pub fn with_config_store(mut self, store: ConfigStore) -> Self {
    self.config = Some(store);
    self
  }

  pub fn handle(&self) -> ControllerHandle {
    ControllerHandle {
      control: self.control_tx.clone(),
      raw: self.raw_tx.clone(),
      status: self.status.subscribe(),
      notices: self.notices.clone(),
      diagnostics: self.diagnostics.clone(),
      resync: self.resync.clone(),
      shutdown: self.shutdown.clone(),
    }
  }

  pub fn bus_stats(&self) -> BusStats {
    self.bus.stats()
  }

  /// Process events until shutdown. Everything that touches the machine runs
  /// on this task, one event at a time.
  pub async fn run(mut self) {
    info!("[Controller] Running");
    self.publish_status();
    loop {
      tokio::select! {
        biased;
        _ = self.shutdown.cancelled() => break,
        Some(msg) = self.control_rx.recv() => self.handle_control(msg),
        Some(raw) = self.raw_rx.recv() => {
          self.bus.ingest(&mut self.core, raw);
        }
        else => break,
      }
      self.drain();
    }
    if let Some(timer) = self.deadline_timer.take() {
      timer.abort();
    }
    info!("[Controller] Stopped in phase {}", self.core.machine.phase());
  }

  fn handle_control(&mut self, msg: ControlMessage) {
    let now = Instant::now();
    match msg {
      ControlMessage::DeadlineReached { session_id } => {
        let directives = self.core.machine.on_deadline(session_id, now);
        self.core.directives.extend(directives);
      }
      ControlMessage::InjectionFinished(report) => {
        let directives = self.core.machine.on_injection_finished(report, now);
        self.core.directives.extend(directives);
      }
      ControlMessage::SaveSettings {
        threshold,
        monitor_timeout,
        reply,
      } => {
        let result = self.save_settings(threshold, monitor_timeout);
        let _ = reply.send(result);
      }
    }
  }

  fn save_settings(&mut self, threshold: f64, monitor_timeout: u64) -> Result<Settings, ConfigError> {
    let result = match &self.config {
      Some(store) => store.save_settings(threshold, monitor_timeout),
      None => Settings::new(threshold, monitor_timeout).map_err(ConfigError::from),
    };
    match &result {
      Ok(settings) => {
        self.core.machine.set_settings(*settings);
        let resolved = lock(&self.diagnostics).apply_settings_save(settings, true);
        info!(
          "[Settings] Saved threshold {:.2}s, monitor timeout {}s",
          settings.injection_threshold_secs(),
          settings.monitor_timeout_secs()
        );
        if !resolved.is_empty() {
          info!("[Diagnostics] Resolved by settings change: {:?}", resolved);
        }
      }
      Err(e) => warn!("[Settings] Save failed; diagnostics left untouched: {}", e),
    }
    result
  }

  fn drain(&mut self) {
    let directives = std::mem::take(&mut self.core.directives);
    for directive in directives {
      self.execute(directive);
    }
    if std::mem::take(&mut self.core.resync_requested) {
      debug!("[Controller] Requesting upstream re-sync");
      self.resync.notify_one();
    }
    self.publish_status();
  }

  fn execute(&mut self, directive: Directive) {
    match directive {
      Directive::PhaseEntered { session_id, phase } => {
        debug!("[Controller] Entered {} (session {:?})", phase, session_id);
      }
      Directive::ArmDeadline {
        session_id,
        deadline,
      } => {
        if let Some(previous) = self.deadline_timer.take() {
          previous.abort();
        }
        let tx = self.control_tx.clone();
        self.deadline_timer = Some(tokio::spawn(async move {
          sleep_until(deadline).await;
          let _ = tx.send(ControlMessage::DeadlineReached { session_id }).await;
        }));
      }
      Directive::StartInjection(plan) => {
        let watchdog = self.watchdog.clone();
        let tx = self.control_tx.clone();
        tokio::spawn(async move {
          let report = watchdog.supervise(plan).await;
          let _ = tx.send(ControlMessage::InjectionFinished(report)).await;
        });
      }
      Directive::Notice(notice) => {
        // No receivers is fine
        let _ = self.notices.send(notice);
      }
      Directive::Outcome(report) => {
        if let Some(entry) = lock(&self.diagnostics).record_outcome(&report) {
          info!("[Diagnostics] Recorded {:?}: {}", entry.code, entry.message);
        }
      }
    }
  }

  fn publish_status(&self) {
    let machine = &self.core.machine;
    self.status.send_replace(StatusSnapshot {
      phase: machine.phase(),
      session_id: machine.session().map(|s| s.id),
      selections: machine.current_selections(),
      last_outcome: machine.last_outcome().cloned(),
      settings: machine.settings(),
      connected: self.core.connected,
    });
  }
}

fn subscribe_all(bus: &mut EventBus<Core>) {
  bus.subscribe(EventKind::PhaseChanged, "phase", |core, env| {
    if let BusEvent::PhaseChanged {
      phase,
      authoritative,
    } = &env.event
    {
      match core.machine.on_phase(*phase, *authoritative, env.received_at) {
        Ok(directives) => core.directives.extend(directives),
        Err(_) => core.resync_requested = true,
      }
    }
    Ok(())
  });
  bus.subscribe(EventKind::CandidateHovered, "hover", |core, env| {
    if let BusEvent::CandidateHovered(candidate) = &env.event {
      apply_candidate(core, env, candidate, SelectionSignal::Hover);
    }
    Ok(())
  });
  bus.subscribe(EventKind::CandidateLocked, "lock", |core, env| {
    if let BusEvent::CandidateLocked(candidate) = &env.event {
      apply_candidate(core, env, candidate, SelectionSignal::Lock);
    }
    Ok(())
  });
  bus.subscribe(EventKind::ConnectionLost, "connection", |core, env| {
    if let BusEvent::ConnectionLost { reason } = &env.event {
      warn!("[Controller] Upstream connection lost: {}", reason);
    }
    core.connected = false;
    Ok(())
  });
  bus.subscribe(EventKind::ConnectionRestored, "connection", |core, _env| {
    info!("[Controller] Upstream connection restored");
    core.connected = true;
    core.resync_requested = true;
    Ok(())
  });
}

fn apply_candidate(core: &mut Core, env: &Envelope, event: &CandidateEvent, signal: SelectionSignal) {
  let directives = match &event.candidate {
    Some(candidate) => core.machine.on_candidate(SelectionInput {
      category: event.category.clone(),
      candidate: candidate.clone(),
      target: event.target.clone(),
      at: env.received_at,
      origin_ms: env.origin_ms,
      signal,
    }),
    None => core
      .machine
      .on_default_candidate(&event.category, event.target.clone(), env.received_at),
  };
  core.directives.extend(directives);
}

impl ControllerHandle {
  pub fn current_phase(&self) -> Phase {
    self.status.borrow().phase
  }

  pub fn current_selections(&self) -> Vec<CandidateSelection> {
    self.status.borrow().selections.clone()
  }

  pub fn last_outcome(&self) -> Option<InjectionReport> {
    self.status.borrow().last_outcome.clone()
  }

  pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
    self.status.clone()
  }

  /// Wait until the controller reports `phase`. Returns `false` if it stopped first.
  pub async fn wait_for_phase(&self, phase: Phase) -> bool {
    let mut status = self.status.clone();
    let reached = status.wait_for(|s| s.phase == phase).await.is_ok();
    reached
  }

  pub fn subscribe_notices(&self) -> broadcast::Receiver<SelectionNotice> {
    self.notices.subscribe()
  }

  pub fn diagnostics(&self) -> Arc<Mutex<DiagnosticsRecorder>> {
    self.diagnostics.clone()
  }

  /// Current entries; also records the settings they were produced under.
  pub fn fetch_diagnostics(&self) -> Vec<DiagnosticEntry> {
    let settings = self.status.borrow().settings;
    lock(&self.diagnostics).fetch(&settings)
  }

  pub async fn save_settings(&self, threshold: f64, monitor_timeout: u64) -> Result<Settings, ControlError> {
    let (reply, rx) = oneshot::channel();
    self
      .control
      .send(ControlMessage::SaveSettings {
        threshold,
        monitor_timeout,
        reply,
      })
      .await
      .map_err(|_| ControlError::Stopped)?;
    Ok(rx.await.map_err(|_| ControlError::Stopped)??)
  }

  pub async fn ingest(&self, raw: RawEvent) -> Result<(), ControlError> {
    self.raw.send(raw).await.map_err(|_| ControlError::Stopped)
  }

  /// Sender for producers such as the LCU stream.
  pub fn raw_sender(&self) -> mpsc::Sender<RawEvent> {
    self.raw.clone()
  }

  /// Signalled whenever the controller needs a fresh read of upstream state.
  pub fn resync_signal(&self) -> Arc<Notify> {
    self.resync.clone()
  }

  pub fn shutdown_token(&self) -> CancellationToken {
    self.shutdown.clone()
  }

  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }
}
