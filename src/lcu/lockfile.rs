use base64::{engine::general_purpose, Engine};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConnectionError;

const LOCKFILE_NAMES: [&str; 3] = ["lockfile", "LeagueClientUx.lockfile", "LeagueClient.lockfile"];

/// Connection details published by the running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcuCredentials {
  pub port: u16,
  pub token: String,
  pub path: PathBuf,
}

impl LcuCredentials {
  pub fn auth_header(&self) -> String {
    format!(
      "Basic {}",
      general_purpose::STANDARD.encode(format!("riot:{}", self.token))
    )
  }

  pub fn ws_url(&self) -> String {
    format!("wss://127.0.0.1:{}/", self.port)
  }

  pub fn base_url(&self) -> String {
    format!("https://127.0.0.1:{}", self.port)
  }
}

/// Lockfile format: `name:pid:port:token:protocol`.
pub fn parse_lockfile(content: &str, path: &Path) -> Option<LcuCredentials> {
  let parts: Vec<&str> = content.trim().split(':').collect();
  if parts.len() < 5 {
    return None;
  }
  let port = parts[2].parse().ok()?;
  let token = parts[3].to_string();
  if token.is_empty() {
    return None;
  }
  Some(LcuCredentials {
    port,
    token,
    path: path.to_path_buf(),
  })
}

pub fn read_lockfile(league_dir: &Path) -> Result<LcuCredentials, ConnectionError> {
  LOCKFILE_NAMES
    .iter()
    .map(|name| league_dir.join(name))
    .find_map(|path| {
      fs::read_to_string(&path)
        .ok()
        .and_then(|content| parse_lockfile(&content, &path))
    })
    .ok_or_else(|| ConnectionError::LockfileMissing(league_dir.to_path_buf()))
}
