use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ConfigError, SettingsError};
use crate::selection::{CategoryId, Multiplicity};

// Configuration management: operator tunables + persisted app config

pub const THRESHOLD_MIN_S: f64 = 0.30;
pub const THRESHOLD_MAX_S: f64 = 2.00;
pub const MONITOR_TIMEOUT_MIN_S: u64 = 20;
pub const MONITOR_TIMEOUT_MAX_S: u64 = 180;

pub const DEFAULT_THRESHOLD_S: f64 = 0.50;
pub const DEFAULT_MONITOR_TIMEOUT_S: u64 = 60;

const APP_DIR_NAME: &str = "loadout-injector";

/// Operator tunables, validated at construction.
///
/// Values outside range are rejected, never clamped, so the operator gets
/// explicit feedback at the settings boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Settings {
  injection_threshold: f64,
  monitor_timeout: u64,
}

impl Settings {
  pub fn new(injection_threshold: f64, monitor_timeout: u64) -> Result<Self, SettingsError> {
    if !injection_threshold.is_finite()
      || !(THRESHOLD_MIN_S..=THRESHOLD_MAX_S).contains(&injection_threshold)
    {
      return Err(SettingsError::ThresholdOutOfRange {
        value: injection_threshold,
        min: THRESHOLD_MIN_S,
        max: THRESHOLD_MAX_S,
      });
    }
    if !(MONITOR_TIMEOUT_MIN_S..=MONITOR_TIMEOUT_MAX_S).contains(&monitor_timeout) {
      return Err(SettingsError::MonitorTimeoutOutOfRange {
        value: monitor_timeout,
        min: MONITOR_TIMEOUT_MIN_S,
        max: MONITOR_TIMEOUT_MAX_S,
      });
    }
    Ok(Self {
      injection_threshold,
      monitor_timeout,
    })
  }

  pub fn injection_threshold_secs(&self) -> f64 {
    self.injection_threshold
  }

  pub fn monitor_timeout_secs(&self) -> u64 {
    self.monitor_timeout
  }

  pub fn injection_threshold(&self) -> Duration {
    Duration::from_secs_f64(self.injection_threshold)
  }

  pub fn monitor_timeout(&self) -> Duration {
    Duration::from_secs(self.monitor_timeout)
  }
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      injection_threshold: DEFAULT_THRESHOLD_S,
      monitor_timeout: DEFAULT_MONITOR_TIMEOUT_S,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
  pub id: CategoryId,
  pub multiplicity: Multiplicity,
}

impl CategorySpec {
  pub fn new(id: &str, multiplicity: Multiplicity) -> Self {
    Self {
      id: CategoryId::new(id),
      multiplicity,
    }
  }
}

// Persisted app config – stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub league_path: Option<PathBuf>,
  #[serde(default)]
  pub install_dir: Option<PathBuf>,
  #[serde(default)]
  pub tool_path: Option<PathBuf>,
  #[serde(default)]
  pub tool_args: Vec<String>,
  #[serde(default)]
  pub content_root: Option<PathBuf>,
  #[serde(default = "default_threshold")]
  pub injection_threshold: f64,
  #[serde(default = "default_monitor_timeout")]
  pub monitor_auto_resume_timeout: u64,
  #[serde(default = "default_verify")]
  pub verify_after_apply: bool,
  #[serde(default = "default_categories")]
  pub categories: Vec<CategorySpec>,
  #[serde(default)]
  pub verbose_logging: bool,
}

fn default_threshold() -> f64 {
  DEFAULT_THRESHOLD_S
}

fn default_monitor_timeout() -> u64 {
  DEFAULT_MONITOR_TIMEOUT_S
}

fn default_verify() -> bool {
  true
}

pub fn default_categories() -> Vec<CategorySpec> {
  vec![
    CategorySpec::new("skin", Multiplicity::Single),
    CategorySpec::new("map", Multiplicity::Single),
    CategorySpec::new("font", Multiplicity::Single),
    CategorySpec::new("announcer", Multiplicity::Single),
    CategorySpec::new("other", Multiplicity::Multi),
  ]
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      league_path: None,
      install_dir: None,
      tool_path: None,
      tool_args: Vec::new(),
      content_root: None,
      injection_threshold: DEFAULT_THRESHOLD_S,
      monitor_auto_resume_timeout: DEFAULT_MONITOR_TIMEOUT_S,
      verify_after_apply: true,
      categories: default_categories(),
      verbose_logging: false,
    }
  }
}

impl AppConfig {
  /// Validated tunables; an out-of-range persisted value is an error.
  pub fn settings(&self) -> Result<Settings, SettingsError> {
    Settings::new(self.injection_threshold, self.monitor_auto_resume_timeout)
  }

  pub fn apply_settings(&mut self, settings: &Settings) {
    self.injection_threshold = settings.injection_threshold_secs();
    self.monitor_auto_resume_timeout = settings.monitor_timeout_secs();
  }
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
  dirs::data_dir()
    .map(|d| d.join(APP_DIR_NAME))
    .ok_or(ConfigError::NoDataDir)
}

/// Reads and writes `<data_dir>/config/config.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
  data_dir: PathBuf,
}

impl ConfigStore {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
    }
  }

  pub fn data_dir(&self) -> &Path {
    &self.data_dir
  }

  pub fn config_file(&self) -> PathBuf {
    self.data_dir.join("config").join("config.json")
  }

  pub fn load(&self) -> Result<AppConfig, ConfigError> {
    let file = self.config_file();
    if !file.exists() {
      info!("[Config] No config at {}, using defaults", file.display());
      return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(&file)?;
    let cfg: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: file.clone(),
      source,
    })?;
    // Reject out-of-range tunables at load time as well
    cfg.settings()?;
    Ok(cfg)
  }

  /// Writes via a temp file + rename so a failed save never leaves a torn file.
  pub fn save(&self, cfg: &AppConfig) -> Result<(), ConfigError> {
    let file = self.config_file();
    if let Some(dir) = file.parent() {
      fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_string_pretty(cfg).map_err(ConfigError::Serialize)?;
    let tmp = file.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, &file) {
      warn!("[Config] Failed to move {} into place: {}", tmp.display(), e);
      let _ = fs::remove_file(&tmp);
      return Err(e.into());
    }
    Ok(())
  }

  /// Validate, merge and persist new tunables. `Ok` means the save succeeded.
  pub fn save_settings(&self, threshold: f64, monitor_timeout: u64) -> Result<Settings, ConfigError> {
    let settings = Settings::new(threshold, monitor_timeout)?;
    let mut cfg = self.load()?;
    cfg.apply_settings(&settings);
    self.save(&cfg)?;
    info!(
      "[Config] Saved injection threshold {:.2}s, monitor auto-resume timeout {}s",
      settings.injection_threshold_secs(),
      settings.monitor_timeout_secs()
    );
    Ok(settings)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settings_reject_out_of_range_instead_of_clamping() {
    assert!(Settings::new(0.29, 60).is_err());
    assert!(Settings::new(2.01, 60).is_err());
    assert!(Settings::new(f64::NAN, 60).is_err());
    assert!(Settings::new(0.5, 19).is_err());
    assert!(Settings::new(0.5, 181).is_err());
    assert_eq!(
      Settings::new(3.0, 60),
      Err(SettingsError::ThresholdOutOfRange {
        value: 3.0,
        min: THRESHOLD_MIN_S,
        max: THRESHOLD_MAX_S
      })
    );
    let edges = Settings::new(0.30, 180).unwrap();
    assert_eq!(edges.monitor_timeout(), Duration::from_secs(180));
    assert!(Settings::new(2.00, 20).is_ok());
  }

  #[test]
  fn config_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    assert_eq!(store.load().unwrap().monitor_auto_resume_timeout, 60);

    let saved = store.save_settings(1.25, 90).unwrap();
    assert_eq!(saved.injection_threshold_secs(), 1.25);

    let cfg = store.load().unwrap();
    assert_eq!(cfg.injection_threshold, 1.25);
    assert_eq!(cfg.monitor_auto_resume_timeout, 90);
    assert_eq!(cfg.categories, default_categories());
  }

  #[test]
  fn out_of_range_values_on_disk_are_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    fs::create_dir_all(store.config_file().parent().unwrap()).unwrap();
    fs::write(store.config_file(), r#"{"injection_threshold": 5.0}"#).unwrap();
    assert!(matches!(store.load(), Err(ConfigError::Settings(_))));
  }

  #[test]
  fn failed_validation_does_not_touch_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    store.save_settings(0.8, 45).unwrap();
    assert!(store.save_settings(0.1, 45).is_err());
    assert_eq!(store.load().unwrap().injection_threshold, 0.8);
  }
}
