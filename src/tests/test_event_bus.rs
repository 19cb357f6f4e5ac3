// Tests for event normalization and delivery

use crate::events::{BusEvent, EventBus, EventKind, RawEvent};
use crate::session::Phase;
use serde_json::json;

#[cfg(test)]
mod event_bus_tests {
  use super::*;

  #[derive(Default)]
  struct Seen {
    events: Vec<String>,
  }

  fn recording_bus() -> EventBus<Seen> {
    let mut bus = EventBus::new();
    for kind in [
      EventKind::PhaseChanged,
      EventKind::CandidateHovered,
      EventKind::CandidateLocked,
      EventKind::ConnectionLost,
      EventKind::ConnectionRestored,
    ] {
      bus.subscribe(kind, "recorder", move |seen: &mut Seen, env| {
        let label = match &env.event {
          BusEvent::PhaseChanged { phase, .. } => format!("phase:{}", phase),
          BusEvent::CandidateHovered(c) => format!("hover:{}", c.category),
          BusEvent::CandidateLocked(c) => format!("lock:{}", c.category),
          BusEvent::ConnectionLost { .. } => "lost".to_string(),
          BusEvent::ConnectionRestored => "restored".to_string(),
        };
        seen.events.push(label);
        Ok(())
      });
    }
    bus
  }

  /// Test: events reach subscribers in arrival order
  #[test]
  fn test_delivery_in_arrival_order() {
    let mut bus = recording_bus();
    let mut seen = Seen::default();
    bus.ingest(&mut seen, RawEvent::text(r#"{"type":"phase","phase":"Lobby"}"#));
    bus.ingest(&mut seen, RawEvent::text(r#"{"type":"hover","category":"map","candidate":"a"}"#));
    bus.ingest(&mut seen, RawEvent::text(r#"{"type":"lock","category":"map","candidate":"a"}"#));
    bus.ingest(&mut seen, RawEvent::connection(false, Some("socket reset".into())));

    assert_eq!(seen.events, vec!["phase:Lobby", "hover:map", "lock:map", "lost"]);
    assert_eq!(bus.stats().delivered, 4);
  }

  /// Test: repeated event ids and repeated states are suppressed
  ///
  /// Expected: a duplicate id is dropped, a repeated phase is dropped unless it
  /// comes from an authoritative read, and a repeated connection state is dropped.
  #[test]
  fn test_duplicates_suppressed() {
    let mut bus = recording_bus();
    let mut seen = Seen::default();
    let hover = r#"{"type":"hover","category":"map","candidate":"a","id":"evt-7"}"#;
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(hover)), 1);
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(hover)), 0);

    let phase = r#"[8,"OnJsonApiEvent",{"uri":"/lol-gameflow/v1/gameflow-phase","eventType":"Update","data":"ChampSelect"}]"#;
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(phase)), 1);
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(phase)), 0);
    let resync = json!({"uri": "/lol-gameflow/v1/gameflow-phase", "data": "ChampSelect"});
    assert_eq!(bus.ingest(&mut seen, RawEvent::json(resync, true)), 1);

    bus.ingest(&mut seen, RawEvent::connection(true, None));
    assert_eq!(bus.ingest(&mut seen, RawEvent::connection(true, None)), 0);

    assert_eq!(bus.stats().duplicates, 3);
    assert_eq!(
      seen.events,
      vec!["hover:map", "phase:Selecting", "phase:Selecting", "restored"]
    );
  }

  /// Test: a failing or panicking handler does not stop the others
  #[test]
  fn test_handler_failures_are_isolated() {
    let mut bus: EventBus<Seen> = EventBus::new();
    bus.subscribe(EventKind::PhaseChanged, "fails", |_, _| {
      anyhow::bail!("handler refused")
    });
    bus.subscribe(EventKind::PhaseChanged, "panics", |_, _| panic!("handler exploded"));
    bus.subscribe(EventKind::PhaseChanged, "works", |seen: &mut Seen, _| {
      seen.events.push("ok".into());
      Ok(())
    });
    let mut seen = Seen::default();

    bus.ingest(&mut seen, RawEvent::text(r#"{"type":"phase","phase":"Lobby"}"#));
    bus.ingest(&mut seen, RawEvent::text(r#"{"type":"phase","phase":"ChampSelect"}"#));

    assert_eq!(seen.events, vec!["ok", "ok"]);
    assert_eq!(bus.stats().handler_failures, 4);
  }

  /// Test: malformed payloads are counted and dropped
  #[test]
  fn test_malformed_dropped() {
    let mut bus = recording_bus();
    let mut seen = Seen::default();
    assert_eq!(bus.ingest(&mut seen, RawEvent::text("not json")), 0);
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(r#"{"type":"phase","phase":"Nope"}"#)), 0);
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(r#"{"type":"hover"}"#)), 0);
    assert_eq!(bus.stats().malformed, 3);
    assert!(seen.events.is_empty());
  }

  /// Test: a champ-select update produces a phase and a skin candidate
  #[test]
  fn test_champ_select_update_fans_out() {
    let mut bus = recording_bus();
    let mut seen = Seen::default();
    let data = json!({
      "localPlayerCellId": 2,
      "timer": { "phase": "BAN_PICK" },
      "actions": [[{ "actorCellId": 2, "type": "pick", "championId": 64, "completed": false, "isInProgress": true }]],
      "myTeam": [{ "cellId": 2, "championId": 64, "selectedSkinId": 64003 }]
    });
    let frame = json!([8, "OnJsonApiEvent", {
      "uri": "/lol-champ-select/v1/session", "eventType": "Update", "data": data
    }]);
    assert_eq!(bus.ingest(&mut seen, RawEvent::text(frame.to_string())), 2);
    assert_eq!(seen.events, vec![format!("phase:{}", Phase::Selecting), "hover:skin".to_string()]);
  }
}
