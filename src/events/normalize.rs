use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use super::types::{BusEvent, CandidateEvent, Envelope, RawEvent, RawPayload};
use crate::error::MalformedEvent;
use crate::lcu::session::{local_pick, timer_phase};
use crate::selection::{CandidateId, CategoryId, TargetId};
use crate::session::Phase;

// Raw upstream payload -> typed bus events

pub const GAMEFLOW_PHASE_URI: &str = "/lol-gameflow/v1/gameflow-phase";
pub const GAMEFLOW_SESSION_URI: &str = "/lol-gameflow/v1/session";
pub const CHAMP_SELECT_SESSION_URI: &str = "/lol-champ-select/v1/session";

/// Category champ-select skin picks are filed under.
pub const SKIN_CATEGORY: &str = "skin";

// Operator / test feed: one JSON object per event, tagged by "type"
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AppEvent {
  Phase {
    phase: String,
    #[serde(default)]
    authoritative: bool,
  },
  Hover {
    category: String,
    candidate: Option<String>,
    target: Option<String>,
  },
  Lock {
    category: String,
    candidate: Option<String>,
    target: Option<String>,
  },
  Connection {
    state: ConnectionState,
    reason: Option<String>,
  },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConnectionState {
  Lost,
  Restored,
}

/// Turn one raw payload into zero or more envelopes.
///
/// Payloads we understand but don't care about (other URIs, WAMP acks)
/// normalize to an empty list; only unparseable input is an error.
pub fn normalize(raw: &RawEvent) -> Result<Vec<Envelope>, MalformedEvent> {
  match &raw.payload {
    RawPayload::Connection { up: true, .. } => Ok(vec![Envelope::new(
      BusEvent::ConnectionRestored,
      raw.received_at,
    )]),
    RawPayload::Connection { up: false, reason } => Ok(vec![Envelope::new(
      BusEvent::ConnectionLost {
        reason: reason.clone().unwrap_or_else(|| "connection closed".to_string()),
      },
      raw.received_at,
    )]),
    RawPayload::Text(text) => {
      let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedEvent::NotJson(e.to_string()))?;
      normalize_value(&value, raw.received_at, raw.authoritative)
    }
    RawPayload::Json(value) => normalize_value(value, raw.received_at, raw.authoritative),
  }
}

fn normalize_value(
  value: &Value,
  received_at: Instant,
  authoritative: bool,
) -> Result<Vec<Envelope>, MalformedEvent> {
  match value {
    Value::Array(frame) => normalize_wamp(frame, received_at, authoritative),
    Value::Object(obj) if obj.contains_key("type") => normalize_app(value, received_at),
    Value::Object(obj) if obj.contains_key("uri") => {
      normalize_api_event(value, received_at, authoritative)
    }
    _ => Err(MalformedEvent::UnknownShape),
  }
}

// Expect an array like [8, "OnJsonApiEvent", { uri, eventType, data }]
fn normalize_wamp(
  frame: &[Value],
  received_at: Instant,
  authoritative: bool,
) -> Result<Vec<Envelope>, MalformedEvent> {
  match frame.first().and_then(|v| v.as_u64()) {
    Some(8) => {
      let payload = frame
        .get(2)
        .filter(|v| v.is_object())
        .ok_or_else(|| MalformedEvent::Invalid {
          kind: "wamp",
          reason: "event frame without payload object".to_string(),
        })?;
      normalize_api_event(payload, received_at, authoritative)
    }
    Some(_) => Ok(Vec::new()),
    None => Err(MalformedEvent::UnknownShape),
  }
}

fn normalize_api_event(
  obj: &Value,
  received_at: Instant,
  authoritative: bool,
) -> Result<Vec<Envelope>, MalformedEvent> {
  let uri = obj
    .get("uri")
    .and_then(|v| v.as_str())
    .ok_or_else(|| MalformedEvent::Invalid {
      kind: "api",
      reason: "missing uri".to_string(),
    })?;
  let event_type = obj.get("eventType").and_then(|v| v.as_str()).unwrap_or("Update");
  let data = obj.get("data").unwrap_or(&Value::Null);

  let phase_event = |phase: Phase| {
    Envelope::new(
      BusEvent::PhaseChanged {
        phase,
        authoritative,
      },
      received_at,
    )
  };

  match uri {
    GAMEFLOW_PHASE_URI => {
      let name = data.as_str().unwrap_or("None");
      Ok(vec![phase_event(Phase::from_upstream(name)?)])
    }
    GAMEFLOW_SESSION_URI => match data.get("phase").and_then(|v| v.as_str()) {
      Some(name) => Ok(vec![phase_event(Phase::from_upstream(name)?)]),
      None => Ok(Vec::new()),
    },
    CHAMP_SELECT_SESSION_URI => {
      if event_type == "Delete" || data.is_null() {
        return Ok(Vec::new());
      }
      let phase = if timer_phase(data) == Some("FINALIZATION") {
        Phase::ReadyCheck
      } else {
        Phase::Selecting
      };
      let mut out = vec![phase_event(phase)];
      if let Some(pick) = local_pick(data) {
        let candidate = match pick.skin_id {
          Some(_) if pick.is_base_skin() => None,
          Some(id) => Some(CandidateId::new(id.to_string())),
          None => None,
        };
        let event = CandidateEvent {
          category: CategoryId::new(SKIN_CATEGORY),
          candidate,
          target: Some(TargetId::new(pick.champion_id.to_string())),
        };
        let event = if pick.locked {
          BusEvent::CandidateLocked(event)
        } else {
          BusEvent::CandidateHovered(event)
        };
        out.push(Envelope::new(event, received_at));
      }
      Ok(out)
    }
    _ => Ok(Vec::new()),
  }
}

fn normalize_app(value: &Value, received_at: Instant) -> Result<Vec<Envelope>, MalformedEvent> {
  let event_id = value.get("id").and_then(|v| v.as_str()).map(str::to_string);
  let origin_ms = value.get("ts").and_then(|v| v.as_u64());
  let parsed: AppEvent =
    serde_json::from_value(value.clone()).map_err(|e| MalformedEvent::Invalid {
      kind: "app",
      reason: e.to_string(),
    })?;

  let candidate_event = |category: String, candidate: Option<String>, target: Option<String>| {
    if category.trim().is_empty() {
      return Err(MalformedEvent::Invalid {
        kind: "candidate",
        reason: "empty category".to_string(),
      });
    }
    Ok(CandidateEvent {
      category: CategoryId::new(category),
      candidate: candidate.filter(|c| !c.is_empty()).map(CandidateId::new),
      target: target.filter(|t| !t.is_empty()).map(TargetId::new),
    })
  };

  let event = match parsed {
    AppEvent::Phase {
      phase,
      authoritative,
    } => BusEvent::PhaseChanged {
      phase: Phase::from_upstream(&phase)?,
      authoritative,
    },
    AppEvent::Hover {
      category,
      candidate,
      target,
    } => BusEvent::CandidateHovered(candidate_event(category, candidate, target)?),
    AppEvent::Lock {
      category,
      candidate,
      target,
    } => BusEvent::CandidateLocked(candidate_event(category, candidate, target)?),
    AppEvent::Connection {
      state: ConnectionState::Lost,
      reason,
    } => BusEvent::ConnectionLost {
      reason: reason.unwrap_or_else(|| "connection closed".to_string()),
    },
    AppEvent::Connection {
      state: ConnectionState::Restored,
      ..
    } => BusEvent::ConnectionRestored,
  };

  Ok(vec![Envelope {
    event,
    received_at,
    origin_ms,
    event_id,
  }])
}
