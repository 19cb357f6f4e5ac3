use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// Logging setup + live log export

const LIVE_LOG: &str = "live.log";

pub fn logs_dir(data_dir: &Path) -> PathBuf {
  data_dir.join("logs")
}

/// Install the global subscriber. Logs go to `<data_dir>/logs/live.log` when
/// it can be opened, otherwise to stderr. `RUST_LOG` overrides the level.
pub fn init_logging(data_dir: Option<&Path>, verbose: bool) {
  let level = if verbose {
    tracing::Level::DEBUG
  } else {
    tracing::Level::INFO
  };
  let filter = EnvFilter::builder()
    .with_default_directive(level.into())
    .from_env_lossy();

  if let Some(dir) = data_dir {
    let logs = logs_dir(dir);
    let file = fs::create_dir_all(&logs).and_then(|_| {
      fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs.join(LIVE_LOG))
    });
    if let Ok(file) = file {
      let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
      return;
    }
  }

  // Fallback to stderr
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init();
}

/// Copy the live log into a timestamped file next to it and return its path.
pub fn export_logs(data_dir: &Path) -> std::io::Result<PathBuf> {
  let logs = logs_dir(data_dir);
  fs::create_dir_all(&logs)?;
  let live = logs.join(LIVE_LOG);
  let target = logs.join(format!(
    "loadout-logs-{}.txt",
    Local::now().format("%Y%m%d-%H%M%S")
  ));
  if live.exists() {
    fs::copy(&live, &target)?;
  } else {
    fs::write(&target, "")?;
  }
  Ok(target)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn export_copies_live_log() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(logs_dir(dir.path())).unwrap();
    fs::write(logs_dir(dir.path()).join(LIVE_LOG), "[Phase] Idle -> Lobby\n").unwrap();
    let exported = export_logs(dir.path()).unwrap();
    assert!(exported
      .file_name()
      .unwrap()
      .to_string_lossy()
      .starts_with("loadout-logs-"));
    assert_eq!(fs::read_to_string(exported).unwrap(), "[Phase] Idle -> Lobby\n");
  }
}
