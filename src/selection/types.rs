use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

// Types shared by the selection resolver and its consumers

/// Reserved candidate id meaning "clear every selection in this category".
pub const CLEAR_ALL_SENTINEL: &str = "__clear__";

macro_rules! string_id {
  ($name:ident) => {
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
      }

      pub fn as_str(&self) -> &str {
        &self.0
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self {
        Self(s.to_string())
      }
    }
  };
}

string_id!(CategoryId);
string_id!(CandidateId);
string_id!(TargetId);

impl CandidateId {
  pub fn is_clear_sentinel(&self) -> bool {
    self.0 == CLEAR_ALL_SENTINEL
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
  Single,
  Multi,
}

/// One chosen item in one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSelection {
  pub category: CategoryId,
  pub candidate: CandidateId,
  /// Entity the candidate applies to (e.g. a champion); `None` for global content.
  pub target: Option<TargetId>,
  pub resolved_at: Instant,
  pub multiplicity: Multiplicity,
  /// Upstream wall-clock stamp when the producer supplied one.
  pub origin_ms: Option<u64>,
  pub reoffered: bool,
}

impl CandidateSelection {
  /// Key used by the durable store, e.g. `skin:266`.
  pub fn durable_key(&self) -> Option<String> {
    self
      .target
      .as_ref()
      .map(|t| durable_key(&self.category, t))
  }
}

pub fn durable_key(category: &CategoryId, target: &TargetId) -> String {
  format!("{}:{}", category, target)
}

/// Emitted on every resolver mutation, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionNotice {
  Selected(CandidateSelection),
  Deselected(CandidateSelection),
}

impl SelectionNotice {
  pub fn selection(&self) -> &CandidateSelection {
    match self {
      Self::Selected(s) | Self::Deselected(s) => s,
    }
  }
}
