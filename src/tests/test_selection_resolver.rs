// Tests for per-category candidate resolution

use super::test_helpers::*;
use crate::config::default_categories;
use crate::selection::{
  CandidateId, CategoryId, SelectionNotice, SelectionResolver, SelectionStore, TargetId,
  CLEAR_ALL_SENTINEL,
};
use std::collections::BTreeMap;
use tokio::time::Instant;

#[cfg(test)]
mod resolver_tests {
  use super::*;

  fn armed(prior: BTreeMap<String, CandidateId>, at: Instant) -> SelectionResolver {
    let mut resolver = SelectionResolver::new(&default_categories());
    resolver.arm(None, prior, at);
    resolver
  }

  /// Test: the resolver freezes the last hover, not the first
  ///
  /// Scenario: hover A at t=0.0s, hover B at t=0.8s, then freeze.
  /// Expected: B is the frozen selection.
  #[test]
  fn test_last_hover_before_freeze_wins() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(hover("skin", "A", Some("266"), t0));
    resolver.apply(hover("skin", "B", Some("266"), t0 + secs(0.8)));

    let frozen = resolver.freeze();
    assert_eq!(candidates(&frozen), vec!["B"]);
  }

  /// Test: changes after the freeze never reach the snapshot
  #[test]
  fn test_frozen_resolver_ignores_late_events() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(lock("skin", "266004", Some("266"), t0));
    let frozen = resolver.freeze();

    let notices = resolver.apply(hover("skin", "266007", Some("266"), t0 + secs(0.1)));
    assert!(notices.is_empty());
    assert_eq!(candidates(&frozen), vec!["266004"]);
    assert_eq!(candidates(&resolver.current_selections()), vec!["266004"]);
  }

  /// Test: replacing a single selection deselects the previous one first
  #[test]
  fn test_single_replacement_orders_notices() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(hover("map", "summoner-rift-winter", None, t0));
    let notices = resolver.apply(hover("map", "howling-abyss-night", None, t0 + secs(0.2)));

    assert_eq!(notices.len(), 2);
    assert!(matches!(&notices[0], SelectionNotice::Deselected(s) if s.candidate.as_str() == "summoner-rift-winter"));
    assert!(matches!(&notices[1], SelectionNotice::Selected(s) if s.candidate.as_str() == "howling-abyss-night"));
    // Repeating the live candidate is a no-op
    assert!(resolver
      .apply(lock("map", "howling-abyss-night", None, t0 + secs(0.3)))
      .is_empty());
  }

  /// Test: multi categories toggle on lock and ignore hovers
  ///
  /// Scenario: lock X, lock Y, hover Z, lock X again.
  /// Expected: only Y remains; locking X twice returns it to its original state.
  #[test]
  fn test_multi_toggle_is_idempotent_per_pair() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(lock("other", "X", None, t0));
    resolver.apply(lock("other", "Y", None, t0));
    assert!(resolver.apply(hover("other", "Z", None, t0)).is_empty());
    let notices = resolver.apply(lock("other", "X", None, t0));

    assert!(matches!(&notices[..], [SelectionNotice::Deselected(s)] if s.candidate.as_str() == "X"));
    assert_eq!(candidates(&resolver.current_selections()), vec!["Y"]);
  }

  /// Test: the clear sentinel empties a category
  #[test]
  fn test_clear_sentinel_empties_category() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(lock("other", "X", None, t0));
    resolver.apply(lock("other", "Y", None, t0));
    resolver.apply(lock("font", "pixel", None, t0));

    assert_eq!(resolver.apply(lock("other", CLEAR_ALL_SENTINEL, None, t0)).len(), 2);
    assert_eq!(resolver.apply(hover("font", CLEAR_ALL_SENTINEL, None, t0)).len(), 1);
    assert!(!resolver.has_selections());
  }

  /// Test: switching champion drops a skin chosen for the previous one
  #[test]
  fn test_target_change_clears_stale_single() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    resolver.apply(hover("skin", "266004", Some("266"), t0));
    resolver.apply(hover("map", "summoner-rift-winter", None, t0));
    let notices = resolver.apply(hover("skin", "64003", Some("64"), t0 + secs(0.4)));

    assert!(matches!(&notices[0], SelectionNotice::Deselected(s) if s.candidate.as_str() == "266004"));
    let mut live = candidates(&resolver.current_selections());
    live.sort();
    assert_eq!(live, vec!["64003", "summoner-rift-winter"]);
  }

  /// Test: out-of-order upstream stamps are dropped within a category only
  #[test]
  fn test_stale_origin_stamp_dropped() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    let mut newer = hover("map", "new", None, t0);
    newer.origin_ms = Some(2_000);
    let mut older = hover("map", "old", None, t0 + secs(0.1));
    older.origin_ms = Some(1_000);
    let mut other_category = hover("font", "pixel", None, t0 + secs(0.1));
    other_category.origin_ms = Some(500);

    resolver.apply(newer);
    assert!(resolver.apply(older).is_empty());
    assert_eq!(resolver.apply(other_category).len(), 1);
  }

  /// Test: a redelivered stamped lock does not toggle a multi selection back off
  ///
  /// Scenario: lock X in `other` with ts=1000 twice, then lock X again with ts=1500.
  /// Expected: X stays after the duplicate; the newer lock removes it.
  #[test]
  fn test_redelivered_multi_lock_ignored() {
    let t0 = Instant::now();
    let mut resolver = armed(BTreeMap::new(), t0);
    let mut first = lock("other", "X", None, t0);
    first.origin_ms = Some(1_000);
    let mut again = first.clone();
    again.at = t0 + secs(0.2);

    assert_eq!(resolver.apply(first).len(), 1);
    assert!(resolver.apply(again).is_empty());
    assert_eq!(candidates(&resolver.current_selections()), vec!["X"]);

    let mut toggle = lock("other", "X", None, t0 + secs(0.4));
    toggle.origin_ms = Some(1_500);
    assert!(matches!(resolver.apply(toggle).as_slice(), [SelectionNotice::Deselected(_)]));
    assert!(resolver.current_selections().is_empty());
  }

  /// Test: unknown categories and unarmed resolvers drop events
  #[test]
  fn test_unknown_category_and_unarmed_dropped() {
    let t0 = Instant::now();
    let mut idle = SelectionResolver::new(&default_categories());
    assert!(idle.apply(lock("skin", "266004", Some("266"), t0)).is_empty());

    let mut resolver = armed(BTreeMap::new(), t0);
    assert!(resolver.apply(lock("ward", "poro", None, t0)).is_empty());
    assert!(!resolver.has_selections());
  }

  /// Test: a remembered skin is re-offered once and survives the base-skin report
  ///
  /// Scenario: history holds skin 266004 for champion 266; the client reports the
  /// base skin for 266 (a default candidate), then the player locks 266007, then
  /// the base skin is reported again.
  /// Expected: the re-offer stands after the first default; the explicit pick is
  /// cleared by the second.
  #[test]
  fn test_reoffer_and_default_candidate() {
    let t0 = Instant::now();
    let mut prior = BTreeMap::new();
    prior.insert("skin:266".to_string(), CandidateId::new("266004"));
    let mut resolver = armed(prior, t0);
    let skin = CategoryId::new("skin");

    let notices = resolver.apply_default(&skin, Some(TargetId::new("266")), t0);
    assert!(matches!(&notices[..], [SelectionNotice::Selected(s)] if s.reoffered && s.candidate.as_str() == "266004"));
    assert!(resolver
      .apply_default(&skin, Some(TargetId::new("266")), t0 + secs(0.1))
      .is_empty());

    resolver.apply(lock("skin", "266007", Some("266"), t0 + secs(0.2)));
    let notices = resolver.apply_default(&skin, Some(TargetId::new("266")), t0 + secs(0.3));
    assert!(matches!(&notices[..], [SelectionNotice::Deselected(s)] if s.candidate.as_str() == "266007"));
    assert!(!resolver.has_selections());
    // Only re-offered once per session
    assert!(resolver.reoffer(t0 + secs(0.4)).is_empty());
  }

  /// Test: durable entries round-trip through the history store
  #[test]
  fn test_durable_entries_feed_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = SelectionStore::in_dir(dir.path());
    let t0 = Instant::now();

    let mut first = armed(BTreeMap::new(), t0);
    first.apply(lock("skin", "266004", Some("266"), t0));
    first.apply(lock("map", "summoner-rift-winter", None, t0));
    store.write_entries(&first.durable_entries()).unwrap();

    let mut second = armed(store.load(), t0);
    let notices = second.set_target(TargetId::new("266"), t0);
    assert_eq!(notices.len(), 1);
    assert_eq!(candidates(&second.current_selections()), vec!["266004"]);
  }
}
