use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{
  durable_key, CandidateId, CandidateSelection, CategoryId, Multiplicity, SelectionNotice, TargetId,
};
use crate::config::CategorySpec;

// Per-category candidate resolution for one session

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSignal {
  Hover,
  Lock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionInput {
  pub category: CategoryId,
  pub candidate: CandidateId,
  pub target: Option<TargetId>,
  pub at: Instant,
  pub origin_ms: Option<u64>,
  pub signal: SelectionSignal,
}

#[derive(Debug, Default)]
pub struct SelectionResolver {
  categories: BTreeMap<CategoryId, Multiplicity>,
  singles: BTreeMap<CategoryId, CandidateSelection>,
  multis: BTreeMap<CategoryId, BTreeMap<CandidateId, CandidateSelection>>,
  // Last upstream stamp applied per category, used to drop reordered stale events
  last_origin: HashMap<CategoryId, u64>,
  // Last stamped event applied per category; a redelivery of it is dropped
  last_applied: HashMap<CategoryId, (SelectionSignal, CandidateId, u64)>,
  target: Option<TargetId>,
  prior: BTreeMap<String, CandidateId>,
  emitted_keys: HashSet<String>,
  armed: bool,
  frozen: bool,
}

impl SelectionResolver {
  pub fn new(specs: &[CategorySpec]) -> Self {
    Self {
      categories: specs.iter().map(|s| (s.id.clone(), s.multiplicity)).collect(),
      ..Default::default()
    }
  }

  pub fn multiplicity(&self, category: &CategoryId) -> Option<Multiplicity> {
    self.categories.get(category).copied()
  }

  pub fn is_armed(&self) -> bool {
    self.armed
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  pub fn target(&self) -> Option<&TargetId> {
    self.target.as_ref()
  }

  /// Start accepting selections. `prior` holds the durable selections read at session start.
  pub fn arm(
    &mut self,
    target: Option<TargetId>,
    prior: BTreeMap<String, CandidateId>,
    at: Instant,
  ) -> Vec<SelectionNotice> {
    self.armed = true;
    self.frozen = false;
    self.prior = prior;
    info!(
      "[Selection] Armed for target {} ({} prior selections known)",
      target.as_ref().map(|t| t.as_str()).unwrap_or("<none>"),
      self.prior.len()
    );
    match target {
      Some(t) => self.set_target(t, at),
      None => Vec::new(),
    }
  }

  /// Drop all per-session state.
  pub fn reset(&mut self) {
    self.singles.clear();
    self.multis.clear();
    self.last_origin.clear();
    self.last_applied.clear();
    self.emitted_keys.clear();
    self.prior.clear();
    self.target = None;
    self.armed = false;
    self.frozen = false;
  }

  /// Switch the live target. Single selections bound to a different target are
  /// cleared rather than carried over.
  pub fn set_target(&mut self, target: TargetId, at: Instant) -> Vec<SelectionNotice> {
    if self.target.as_ref() == Some(&target) {
      return Vec::new();
    }
    let mut notices = Vec::new();
    let stale: Vec<CategoryId> = self
      .singles
      .iter()
      .filter(|(_, sel)| matches!(&sel.target, Some(t) if *t != target))
      .map(|(cat, _)| cat.clone())
      .collect();
    for cat in stale {
      if let Some(old) = self.singles.remove(&cat) {
        debug!(
          "[Selection] Target changed; clearing {} selection {} bound to {:?}",
          cat, old.candidate, old.target
        );
        notices.push(SelectionNotice::Deselected(old));
      }
    }
    self.target = Some(target);
    notices.extend(self.reoffer(at));
    notices
  }

  /// Re-offer durable selections for the current target, at most once per key per session.
  pub fn reoffer(&mut self, at: Instant) -> Vec<SelectionNotice> {
    let Some(target) = self.target.clone() else {
      return Vec::new();
    };
    if !self.armed || self.frozen {
      return Vec::new();
    }
    let mut notices = Vec::new();
    let singles: Vec<CategoryId> = self
      .categories
      .iter()
      .filter(|(_, m)| **m == Multiplicity::Single)
      .map(|(c, _)| c.clone())
      .collect();
    for category in singles {
      let key = durable_key(&category, &target);
      if self.singles.contains_key(&category) || self.emitted_keys.contains(&key) {
        continue;
      }
      let Some(candidate) = self.prior.get(&key).cloned() else {
        continue;
      };
      self.emitted_keys.insert(key);
      info!("[Selection] Re-offering {} {} for target {}", category, candidate, target);
      let sel = CandidateSelection {
        category: category.clone(),
        candidate,
        target: Some(target.clone()),
        resolved_at: at,
        multiplicity: Multiplicity::Single,
        origin_ms: None,
        reoffered: true,
      };
      self.singles.insert(category, sel.clone());
      notices.push(SelectionNotice::Selected(sel));
    }
    notices
  }

  pub fn apply(&mut self, input: SelectionInput) -> Vec<SelectionNotice> {
    if !self.armed || self.frozen {
      debug!(
        "[Selection] Ignoring {:?} {} {} (armed={}, frozen={})",
        input.signal, input.category, input.candidate, self.armed, self.frozen
      );
      return Vec::new();
    }
    let Some(multiplicity) = self.multiplicity(&input.category) else {
      warn!("[Selection] Unknown category '{}', event dropped", input.category);
      return Vec::new();
    };
    if let (Some(incoming), Some(last)) = (input.origin_ms, self.last_origin.get(&input.category)) {
      if incoming < *last {
        debug!(
          "[Selection] Dropping stale {} event for {} ({} < {})",
          input.category, input.candidate, incoming, last
        );
        return Vec::new();
      }
    }
    if let Some(origin) = input.origin_ms {
      let stamp = (input.signal, input.candidate.clone(), origin);
      if self.last_applied.get(&input.category) == Some(&stamp) {
        debug!(
          "[Selection] Dropping redelivered {} event for {} (ts {})",
          input.category, input.candidate, origin
        );
        return Vec::new();
      }
      self.last_origin.insert(input.category.clone(), origin);
      self.last_applied.insert(input.category.clone(), stamp);
    }

    let mut notices = Vec::new();
    if let Some(t) = input.target.clone() {
      notices.extend(self.set_target(t, input.at));
    }

    match multiplicity {
      Multiplicity::Single => notices.extend(self.apply_single(input)),
      Multiplicity::Multi => notices.extend(self.apply_multi(input)),
    }
    notices
  }

  /// Upstream reports the category's built-in default for `target`.
  /// A re-offered selection stands; an explicit earlier choice is cleared.
  pub fn apply_default(
    &mut self,
    category: &CategoryId,
    target: Option<TargetId>,
    at: Instant,
  ) -> Vec<SelectionNotice> {
    if !self.armed || self.frozen || self.multiplicity(category) != Some(Multiplicity::Single) {
      return Vec::new();
    }
    let mut notices = Vec::new();
    if let Some(t) = target {
      notices.extend(self.set_target(t, at));
    }
    if self.singles.get(category).is_some_and(|s| !s.reoffered) {
      if let Some(old) = self.singles.remove(category) {
        debug!("[Selection] Default {} reported; dropping {}", category, old.candidate);
        notices.push(SelectionNotice::Deselected(old));
      }
    }
    notices
  }

  fn apply_single(&mut self, input: SelectionInput) -> Vec<SelectionNotice> {
    let mut notices = Vec::new();
    if input.candidate.is_clear_sentinel() {
      if let Some(old) = self.singles.remove(&input.category) {
        notices.push(SelectionNotice::Deselected(old));
      }
      return notices;
    }
    if let Some(current) = self.singles.get(&input.category) {
      if current.candidate == input.candidate && current.target == input.target {
        return notices;
      }
    }
    let sel = CandidateSelection {
      category: input.category.clone(),
      candidate: input.candidate,
      target: input.target,
      resolved_at: input.at,
      multiplicity: Multiplicity::Single,
      origin_ms: input.origin_ms,
      reoffered: false,
    };
    // Deselect before select so nobody observes two live singles
    if let Some(old) = self.singles.insert(input.category, sel.clone()) {
      notices.push(SelectionNotice::Deselected(old));
    }
    notices.push(SelectionNotice::Selected(sel));
    notices
  }

  fn apply_multi(&mut self, input: SelectionInput) -> Vec<SelectionNotice> {
    let set = self.multis.entry(input.category.clone()).or_default();
    if input.candidate.is_clear_sentinel() {
      let cleared = std::mem::take(set);
      return cleared.into_values().map(SelectionNotice::Deselected).collect();
    }
    if input.signal == SelectionSignal::Hover {
      // Multi categories only change on explicit selection
      return Vec::new();
    }
    if let Some(removed) = set.remove(&input.candidate) {
      return vec![SelectionNotice::Deselected(removed)];
    }
    let sel = CandidateSelection {
      category: input.category,
      candidate: input.candidate.clone(),
      target: input.target,
      resolved_at: input.at,
      multiplicity: Multiplicity::Multi,
      origin_ms: input.origin_ms,
      reoffered: false,
    };
    set.insert(input.candidate, sel.clone());
    vec![SelectionNotice::Selected(sel)]
  }

  /// Stop accepting changes and return the immutable snapshot handed to the injection run.
  pub fn freeze(&mut self) -> Vec<CandidateSelection> {
    self.frozen = true;
    self.current_selections()
  }

  pub fn current_selections(&self) -> Vec<CandidateSelection> {
    let mut out: Vec<CandidateSelection> = self.singles.values().cloned().collect();
    for set in self.multis.values() {
      out.extend(set.values().cloned());
    }
    out
  }

  pub fn has_selections(&self) -> bool {
    !self.singles.is_empty() || self.multis.values().any(|s| !s.is_empty())
  }

  /// Single selections worth remembering for the next time their target appears.
  pub fn durable_entries(&self) -> Vec<(String, CandidateId)> {
    self
      .singles
      .values()
      .filter_map(|sel| sel.durable_key().map(|k| (k, sel.candidate.clone())))
      .collect()
  }
}
