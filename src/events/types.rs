use serde_json::Value;
use std::fmt;
use tokio::time::Instant;

use crate::selection::{CandidateId, CategoryId, TargetId};
use crate::session::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  PhaseChanged,
  CandidateHovered,
  CandidateLocked,
  ConnectionLost,
  ConnectionRestored,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::PhaseChanged => "PhaseChanged",
      Self::CandidateHovered => "CandidateHovered",
      Self::CandidateLocked => "CandidateLocked",
      Self::ConnectionLost => "ConnectionLost",
      Self::ConnectionRestored => "ConnectionRestored",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
  pub category: CategoryId,
  /// `None` when upstream reports the category's built-in default.
  pub candidate: Option<CandidateId>,
  pub target: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
  PhaseChanged { phase: Phase, authoritative: bool },
  CandidateHovered(CandidateEvent),
  CandidateLocked(CandidateEvent),
  ConnectionLost { reason: String },
  ConnectionRestored,
}

impl BusEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      Self::PhaseChanged { .. } => EventKind::PhaseChanged,
      Self::CandidateHovered(_) => EventKind::CandidateHovered,
      Self::CandidateLocked(_) => EventKind::CandidateLocked,
      Self::ConnectionLost { .. } => EventKind::ConnectionLost,
      Self::ConnectionRestored => EventKind::ConnectionRestored,
    }
  }
}

/// A typed event plus its receive stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
  pub event: BusEvent,
  pub received_at: Instant,
  /// Upstream wall-clock millis, when the producer stamped the event.
  pub origin_ms: Option<u64>,
  /// Upstream event id, used for duplicate suppression.
  pub event_id: Option<String>,
}

impl Envelope {
  pub fn new(event: BusEvent, received_at: Instant) -> Self {
    Self {
      event,
      received_at,
      origin_ms: None,
      event_id: None,
    }
  }

  pub fn kind(&self) -> EventKind {
    self.event.kind()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
  /// A websocket text frame or a line fed in by an operator.
  Text(String),
  /// Already-parsed JSON, e.g. a REST re-sync read.
  Json(Value),
  /// Transport state reported by the stream task itself.
  Connection { up: bool, reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
  pub payload: RawPayload,
  pub received_at: Instant,
  /// Set for fresh reads of upstream state (re-sync), which may move phases backward.
  pub authoritative: bool,
}

impl RawEvent {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      payload: RawPayload::Text(text.into()),
      received_at: Instant::now(),
      authoritative: false,
    }
  }

  pub fn json(value: Value, authoritative: bool) -> Self {
    Self {
      payload: RawPayload::Json(value),
      received_at: Instant::now(),
      authoritative,
    }
  }

  pub fn connection(up: bool, reason: Option<String>) -> Self {
    Self {
      payload: RawPayload::Connection { up, reason },
      received_at: Instant::now(),
      authoritative: false,
    }
  }
}
