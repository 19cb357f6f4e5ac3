use std::io;
use std::path::PathBuf;
use thiserror::Error;

// Error handling for the injection controller

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
  #[error("Injection threshold {value:.2}s is outside the allowed range [{min:.2}, {max:.2}]")]
  ThresholdOutOfRange { value: f64, min: f64, max: f64 },
  #[error("Monitor auto-resume timeout {value}s is outside the allowed range [{min}, {max}]")]
  MonitorTimeoutOutOfRange { value: u64, min: u64, max: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("IO Error: {0}")]
  Io(#[from] io::Error),
  #[error("Failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("Failed to serialize config: {0}")]
  Serialize(#[source] serde_json::Error),
  #[error("Invalid settings in config: {0}")]
  Settings(#[from] SettingsError),
  #[error("No data directory available on this platform")]
  NoDataDir,
}

// Connection problems are recovered locally by the stream task (backoff + re-sync)
#[derive(Debug, Error)]
pub enum ConnectionError {
  #[error("No valid lockfile found in {0}")]
  LockfileMissing(PathBuf),
  #[error("WebSocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("TLS error: {0}")]
  Tls(#[from] native_tls::Error),
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Invalid request header: {0}")]
  Header(String),
  #[error("Unexpected LCU response from {uri}: status {status}")]
  Status { uri: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum InjectionError {
  #[error("IO Error: {0}")]
  Io(#[from] io::Error),
  #[error("Modification tool not found: {0}")]
  ToolMissing(PathBuf),
  #[error("Install directory not found: {0}")]
  InvalidInstallDir(PathBuf),
  #[error("No content file resolved for any selection")]
  NoContent,
  #[error("Process error: {0}")]
  Process(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("IO Error: {0}")]
  Io(#[from] io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
  #[error("payload is not valid JSON: {0}")]
  NotJson(String),
  #[error("unrecognized event shape")]
  UnknownShape,
  #[error("unknown phase '{0}'")]
  UnknownPhase(String),
  #[error("invalid {kind} event: {reason}")]
  Invalid { kind: &'static str, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
  #[error("rejected non-authoritative transition {from} -> {to}")]
  Backward {
    from: crate::session::Phase,
    to: crate::session::Phase,
  },
}

#[derive(Debug, Error)]
pub enum ControlError {
  #[error("controller is not running")]
  Stopped,
  #[error(transparent)]
  Config(#[from] ConfigError),
}
