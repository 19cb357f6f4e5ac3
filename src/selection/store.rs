use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::CandidateId;
use crate::error::StoreError;

// Durable "last selection per target" store (historic.json)
//
// File format: { "<category>:<target>": "<candidateId>", ... }
// Read once at session start, written once at session end.

#[derive(Debug, Clone)]
pub struct SelectionStore {
  path: PathBuf,
}

impl SelectionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn in_dir(data_dir: &Path) -> Self {
    Self::new(data_dir.join("historic.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Missing or unreadable files yield an empty map; the feature is best-effort.
  pub fn load(&self) -> BTreeMap<String, CandidateId> {
    match self.try_load() {
      Ok(map) => map,
      Err(e) => {
        warn!("[Historic] Ignoring unreadable {}: {}", self.path.display(), e);
        BTreeMap::new()
      }
    }
  }

  fn try_load(&self) -> Result<BTreeMap<String, CandidateId>, StoreError> {
    if !self.path.exists() {
      return Ok(BTreeMap::new());
    }
    let data = fs::read_to_string(&self.path)?;
    Ok(serde_json::from_str(&data)?)
  }

  /// Merge `entries` over the stored map and write it back.
  pub fn write_entries(&self, entries: &[(String, CandidateId)]) -> Result<(), StoreError> {
    if entries.is_empty() {
      return Ok(());
    }
    let mut map = self.try_load().unwrap_or_default();
    for (key, candidate) in entries {
      map.insert(key.clone(), candidate.clone());
    }
    if let Some(dir) = self.path.parent() {
      fs::create_dir_all(dir)?;
    }
    let tmp = self.path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&map)?)?;
    fs::rename(&tmp, &self.path)?;
    debug!("[Historic] Wrote {} entries to {}", entries.len(), self.path.display());
    Ok(())
  }
}
