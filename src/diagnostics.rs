use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{
  Settings, MONITOR_TIMEOUT_MAX_S, MONITOR_TIMEOUT_MIN_S, THRESHOLD_MAX_S, THRESHOLD_MIN_S,
};
use crate::error::StoreError;
use crate::injection::{InjectionOutcome, InjectionReport};

// Diagnostics: categorized failure records with a recommended remediation value.
// Pull-based; nothing here pushes notifications.

pub const MAX_ENTRIES: usize = 200;
const DEDUPE_WINDOW_S: i64 = 3;
const DIAGNOSTICS_FILE: &str = "diagnostics.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
  InjectionThreshold,
  MonitorTimeout,
  Other,
}

impl DiagnosticCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::InjectionThreshold => "injection_threshold",
      Self::MonitorTimeout => "monitor_timeout",
      Self::Other => "other",
    }
  }

  /// Accepts the aliases operators tend to type.
  pub fn parse(name: &str) -> Option<Self> {
    match name.trim().to_ascii_lowercase().as_str() {
      "injection_threshold" | "threshold" | "injection" => Some(Self::InjectionThreshold),
      "monitor_timeout" | "monitor" | "monitor_auto_resume_timeout" | "auto_resume" => {
        Some(Self::MonitorTimeout)
      }
      "other" => Some(Self::Other),
      _ => None,
    }
  }
}

impl fmt::Display for DiagnosticCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
  AutoResumeTriggered,
  VerifyFailed,
  InjectionLate,
  ProcessError,
}

impl DiagnosticCode {
  pub fn category(&self) -> DiagnosticCategory {
    match self {
      Self::AutoResumeTriggered => DiagnosticCategory::MonitorTimeout,
      Self::VerifyFailed | Self::InjectionLate => DiagnosticCategory::InjectionThreshold,
      Self::ProcessError => DiagnosticCategory::Other,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
  pub code: DiagnosticCode,
  pub category: DiagnosticCategory,
  pub timestamp: DateTime<Utc>,
  pub message: String,
  #[serde(default)]
  pub hint: Option<String>,
  /// Seconds; threshold for `injection_threshold`, timeout for `monitor_timeout`.
  #[serde(default)]
  pub recommended: Option<f64>,
}

/// Tunables in force when diagnostics were last fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
  pub threshold: f64,
  pub monitor_timeout: u64,
}

impl From<&Settings> for SettingsSnapshot {
  fn from(s: &Settings) -> Self {
    Self {
      threshold: s.injection_threshold_secs(),
      monitor_timeout: s.monitor_timeout_secs(),
    }
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiagnosticsFile {
  #[serde(default)]
  entries: Vec<DiagnosticEntry>,
  #[serde(default)]
  snapshot: Option<SettingsSnapshot>,
}

fn round_hundredths(v: f64) -> f64 {
  (v * 100.0).round() / 100.0
}

pub fn recommended_threshold(elapsed_s: f64) -> f64 {
  round_hundredths((elapsed_s + 0.25).max(0.50).clamp(THRESHOLD_MIN_S, THRESHOLD_MAX_S))
}

pub fn recommended_monitor_timeout(observed_s: u64) -> u64 {
  (observed_s + 30)
    .max(60)
    .clamp(MONITOR_TIMEOUT_MIN_S, MONITOR_TIMEOUT_MAX_S)
}

/// Diagnostic for one injection report; `None` for an on-time success.
pub fn diagnose(report: &InjectionReport, at: DateTime<Utc>) -> Option<DiagnosticEntry> {
  let elapsed = report.elapsed().as_secs_f64();
  let threshold = report.threshold.as_secs_f64();
  let threshold_hint = format!(
    "Injection time: {:.3}s, injection threshold: {:.3}s. Consider increasing Injection Threshold.",
    elapsed, threshold
  );
  let (code, message, hint, recommended) = match &report.outcome {
    InjectionOutcome::Success if report.finished_late() => (
      DiagnosticCode::InjectionLate,
      "Injection took longer than your injection threshold.".to_string(),
      Some(threshold_hint),
      Some(recommended_threshold(elapsed)),
    ),
    InjectionOutcome::Success => return None,
    InjectionOutcome::VerifyFailed { expected, actual } => (
      DiagnosticCode::VerifyFailed,
      format!(
        "Injection verification failed (expected {}, found {}); selected content may not apply.",
        expected, actual
      ),
      Some(threshold_hint),
      Some(recommended_threshold(elapsed)),
    ),
    InjectionOutcome::TimedOut => {
      let observed = report.monitor_timeout.as_secs();
      (
        DiagnosticCode::AutoResumeTriggered,
        format!(
          "Injection did not finish; auto-resume safety triggered after {}s.",
          observed
        ),
        Some("Consider increasing Monitor Auto-Resume Timeout.".to_string()),
        Some(recommended_monitor_timeout(observed) as f64),
      )
    }
    InjectionOutcome::ProcessError { message } => {
      (DiagnosticCode::ProcessError, message.clone(), None, None)
    }
  };
  Some(DiagnosticEntry {
    code,
    category: code.category(),
    timestamp: at,
    message,
    hint,
    recommended,
  })
}

#[derive(Debug, Default)]
pub struct DiagnosticsRecorder {
  entries: VecDeque<DiagnosticEntry>,
  snapshot: Option<SettingsSnapshot>,
  path: Option<PathBuf>,
}

impl DiagnosticsRecorder {
  /// In-memory recorder.
  pub fn new() -> Self {
    Self::default()
  }

  /// Recorder persisted at `<data_dir>/diagnostics.json`; an unreadable file starts empty.
  pub fn open(data_dir: &Path) -> Self {
    let path = data_dir.join(DIAGNOSTICS_FILE);
    let file = match Self::load(&path) {
      Ok(file) => file,
      Err(e) => {
        warn!("[Diagnostics] Ignoring unreadable {}: {}", path.display(), e);
        DiagnosticsFile::default()
      }
    };
    let mut entries: VecDeque<DiagnosticEntry> = file.entries.into();
    while entries.len() > MAX_ENTRIES {
      entries.pop_front();
    }
    Self {
      entries,
      snapshot: file.snapshot,
      path: Some(path),
    }
  }

  fn load(path: &Path) -> Result<DiagnosticsFile, StoreError> {
    if !path.exists() {
      return Ok(DiagnosticsFile::default());
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
  }

  /// Re-read the file before any change. Entries another process cleared stay
  /// cleared, and a snapshot it took becomes the baseline.
  fn refresh(&mut self) {
    let Some(path) = &self.path else {
      return;
    };
    match Self::load(path) {
      Ok(file) => {
        self.entries = file.entries.into();
        while self.entries.len() > MAX_ENTRIES {
          self.entries.pop_front();
        }
        self.snapshot = file.snapshot;
      }
      Err(e) => warn!("[Diagnostics] Keeping in-memory entries; {} unreadable: {}", path.display(), e),
    }
  }

  fn persist(&self) {
    let Some(path) = &self.path else {
      return;
    };
    let file = DiagnosticsFile {
      entries: self.entries.iter().cloned().collect(),
      snapshot: self.snapshot,
    };
    let write = || -> Result<(), StoreError> {
      if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
      }
      let tmp = path.with_extension("json.tmp");
      fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
      fs::rename(&tmp, path)?;
      Ok(())
    };
    if let Err(e) = write() {
      warn!("[Diagnostics] Failed to persist {}: {}", path.display(), e);
    }
  }

  pub fn record_outcome(&mut self, report: &InjectionReport) -> Option<DiagnosticEntry> {
    self.record_outcome_at(report, Utc::now())
  }

  pub fn record_outcome_at(
    &mut self,
    report: &InjectionReport,
    at: DateTime<Utc>,
  ) -> Option<DiagnosticEntry> {
    let entry = diagnose(report, at)?;
    self.record(entry.clone()).then_some(entry)
  }

  /// Append an entry. Returns `false` when it repeats the same code and
  /// message within the dedupe window.
  pub fn record(&mut self, entry: DiagnosticEntry) -> bool {
    self.refresh();
    let window = ChronoDuration::seconds(DEDUPE_WINDOW_S);
    let repeat = self.entries.iter().rev().any(|e| {
      e.code == entry.code
        && e.message == entry.message
        && entry.timestamp.signed_duration_since(e.timestamp) < window
    });
    if repeat {
      debug!("[Diagnostics] Suppressed repeat of {:?}", entry.code);
      return false;
    }
    info!(
      "[Diagnostics] {} ({}): {}",
      serde_json::to_string(&entry.code).unwrap_or_default().trim_matches('"'),
      entry.category,
      entry.message
    );
    self.entries.push_back(entry);
    while self.entries.len() > MAX_ENTRIES {
      self.entries.pop_front();
    }
    self.persist();
    true
  }

  pub fn current_entries(&self) -> Vec<DiagnosticEntry> {
    self.entries.iter().cloned().collect()
  }

  /// Read entries for display and take the settings baseline for resolution.
  pub fn fetch(&mut self, settings: &Settings) -> Vec<DiagnosticEntry> {
    self.refresh();
    self.snapshot = Some(SettingsSnapshot::from(settings));
    self.persist();
    self.current_entries()
  }

  pub fn snapshot(&self) -> Option<SettingsSnapshot> {
    self.snapshot
  }

  /// Highest recommendation recorded in `category`.
  pub fn recommended_for(&self, category: DiagnosticCategory) -> Option<f64> {
    self
      .entries
      .iter()
      .filter(|e| e.category == category)
      .filter_map(|e| e.recommended)
      .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
  }

  /// Categories the operator fixed with a save: the save succeeded, the value
  /// went up from the snapshot baseline, and it reaches the recommendation.
  pub fn resolved_categories_for_saved_values(
    &self,
    saved: &Settings,
    save_ok: bool,
  ) -> Vec<DiagnosticCategory> {
    let Some(snapshot) = self.snapshot.filter(|_| save_ok) else {
      return Vec::new();
    };
    let mut resolved = Vec::new();
    if let Some(rec) = self.recommended_for(DiagnosticCategory::InjectionThreshold) {
      let value = saved.injection_threshold_secs();
      if value > snapshot.threshold && value + 1e-9 >= rec {
        resolved.push(DiagnosticCategory::InjectionThreshold);
      }
    }
    if let Some(rec) = self.recommended_for(DiagnosticCategory::MonitorTimeout) {
      let value = saved.monitor_timeout_secs();
      if value > snapshot.monitor_timeout && value as f64 >= rec {
        resolved.push(DiagnosticCategory::MonitorTimeout);
      }
    }
    resolved
  }

  pub fn clear_category(&mut self, category: DiagnosticCategory) -> usize {
    self.refresh();
    let before = self.entries.len();
    self.entries.retain(|e| e.category != category);
    let removed = before - self.entries.len();
    if removed > 0 {
      info!("[Diagnostics] Cleared {} {} entries", removed, category);
      self.persist();
    }
    removed
  }

  pub fn clear_all(&mut self) {
    self.refresh();
    self.entries.clear();
    self.persist();
  }

  /// Settings-save feedback: clear what the save fixed, then move the baseline.
  pub fn apply_settings_save(&mut self, saved: &Settings, save_ok: bool) -> Vec<DiagnosticCategory> {
    self.refresh();
    let resolved = self.resolved_categories_for_saved_values(saved, save_ok);
    for category in &resolved {
      self.clear_category(*category);
    }
    if save_ok {
      self.snapshot = Some(SettingsSnapshot::from(saved));
      self.persist();
    }
    resolved
  }

  /// Human-friendly report: `"<ts> | <message>"` with an optional `"Fix: <hint>"` line.
  pub fn render_report(&self) -> String {
    let mut out = String::new();
    for entry in &self.entries {
      out.push_str(&format!(
        "{} | {}\n",
        entry.timestamp.format("%b %d %H:%M"),
        entry.message
      ));
      if let Some(hint) = &entry.hint {
        out.push_str(&format!("Fix: {}\n", hint));
      }
    }
    out
  }
}
