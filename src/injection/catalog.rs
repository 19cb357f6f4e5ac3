use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::selection::CandidateSelection;

// Maps a chosen candidate to the content file the modification tool consumes

const CONTENT_EXTENSIONS: [&str; 4] = ["fantome", "zip", "wad", "client"];

pub trait ContentCatalog: Send + Sync {
  fn resolve(&self, selection: &CandidateSelection) -> Option<PathBuf>;
}

/// Content laid out as `<root>/<category>/[<target>/]<candidate>.<ext>`.
#[derive(Debug)]
pub struct DirectoryCatalog {
  root: PathBuf,
  // (category, candidate) -> path, filled lazily by the fallback scan
  index: Mutex<HashMap<(String, String), PathBuf>>,
}

impl DirectoryCatalog {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      index: Mutex::new(HashMap::new()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn direct_hit(dir: &Path, candidate: &str) -> Option<PathBuf> {
    CONTENT_EXTENSIONS
      .iter()
      .map(|ext| dir.join(format!("{}.{}", candidate, ext)))
      .find(|p| p.is_file())
  }

  fn scan_category(&self, category: &str, candidate: &str) -> Option<PathBuf> {
    let dir = self.root.join(category);
    if !dir.is_dir() {
      return None;
    }
    let mut found = None;
    let mut index = match self.index.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      let known_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CONTENT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
      let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      if !known_ext {
        continue;
      }
      index
        .entry((category.to_string(), stem.to_string()))
        .or_insert_with(|| path.to_path_buf());
      if stem == candidate && found.is_none() {
        found = Some(path.to_path_buf());
      }
    }
    debug!("[Catalog] Indexed {} entries under {}", index.len(), dir.display());
    found
  }
}

impl ContentCatalog for DirectoryCatalog {
  fn resolve(&self, selection: &CandidateSelection) -> Option<PathBuf> {
    let category = selection.category.as_str();
    let candidate = selection.candidate.as_str();

    if let Some(target) = &selection.target {
      let dir = self.root.join(category).join(target.as_str());
      if let Some(hit) = Self::direct_hit(&dir, candidate) {
        return Some(hit);
      }
    }
    if let Some(hit) = Self::direct_hit(&self.root.join(category), candidate) {
      return Some(hit);
    }

    let cached = match self.index.lock() {
      Ok(guard) => guard
        .get(&(category.to_string(), candidate.to_string()))
        .filter(|p| p.is_file())
        .cloned(),
      Err(_) => None,
    };
    if cached.is_some() {
      return cached;
    }

    let scanned = self.scan_category(category, candidate);
    if scanned.is_none() {
      warn!("[Catalog] No content for {} {}", category, candidate);
    }
    scanned
  }
}
