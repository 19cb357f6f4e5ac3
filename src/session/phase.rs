use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MalformedEvent;

// Lifecycle phases of one match-setup session

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Idle,
  Lobby,
  Selecting,
  ReadyCheck,
  Launching,
  Modifying,
  InMatch,
  Ended,
}

/// How a requested phase change relates to the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
  Forward,
  /// `Ended -> Idle`
  Reset,
  /// Champ select dodged: `Selecting|ReadyCheck -> Lobby`
  Abort,
  /// Same phase again; only meaningful for `Modifying`
  Reenter,
  Backward,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Idle => "Idle",
      Self::Lobby => "Lobby",
      Self::Selecting => "Selecting",
      Self::ReadyCheck => "ReadyCheck",
      Self::Launching => "Launching",
      Self::Modifying => "Modifying",
      Self::InMatch => "InMatch",
      Self::Ended => "Ended",
    }
  }

  pub fn classify(self, to: Phase) -> TransitionKind {
    match (self, to) {
      (a, b) if a == b => TransitionKind::Reenter,
      (Phase::Ended, Phase::Idle) => TransitionKind::Reset,
      (Phase::Selecting | Phase::ReadyCheck, Phase::Lobby) => TransitionKind::Abort,
      (a, b) if b > a => TransitionKind::Forward,
      _ => TransitionKind::Backward,
    }
  }

  /// Phases during which the session's selections are still open.
  pub fn accepts_selections(&self) -> bool {
    matches!(self, Self::Selecting | Self::ReadyCheck | Self::Launching)
  }

  /// Map an upstream gameflow phase (or one of our own phase names) to a `Phase`.
  pub fn from_upstream(name: &str) -> Result<Phase, MalformedEvent> {
    let phase = match name.trim().trim_matches('"') {
      "None" | "Idle" | "idle" => Phase::Idle,
      "Lobby" | "Matchmaking" | "CheckedIntoTournament" | "lobby" => Phase::Lobby,
      // The accept-match popup precedes champ select; it is still part of the lobby flow
      "ReadyCheck" => Phase::Lobby,
      "ChampSelect" | "Selecting" | "selecting" => Phase::Selecting,
      "Finalization" | "ready_check" => Phase::ReadyCheck,
      "GameStart" | "Launching" | "launching" => Phase::Launching,
      "InProgress" | "Reconnect" | "InMatch" | "in_match" => Phase::InMatch,
      "WaitingForStats" | "PreEndOfGame" | "EndOfGame" | "TerminatedInError" | "Ended" | "ended" => {
        Phase::Ended
      }
      other => return Err(MalformedEvent::UnknownPhase(other.to_string())),
    };
    Ok(phase)
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_allowed_edges() {
    assert_eq!(Phase::Lobby.classify(Phase::Selecting), TransitionKind::Forward);
    assert_eq!(Phase::Selecting.classify(Phase::InMatch), TransitionKind::Forward);
    assert_eq!(Phase::Ended.classify(Phase::Idle), TransitionKind::Reset);
    assert_eq!(Phase::Selecting.classify(Phase::Lobby), TransitionKind::Abort);
    assert_eq!(Phase::ReadyCheck.classify(Phase::Lobby), TransitionKind::Abort);
    assert_eq!(Phase::Modifying.classify(Phase::Modifying), TransitionKind::Reenter);
    assert_eq!(Phase::InMatch.classify(Phase::Lobby), TransitionKind::Backward);
    assert_eq!(Phase::Launching.classify(Phase::Lobby), TransitionKind::Backward);
  }

  #[test]
  fn maps_upstream_names() {
    assert_eq!(Phase::from_upstream("\"ChampSelect\"").unwrap(), Phase::Selecting);
    assert_eq!(Phase::from_upstream("Matchmaking").unwrap(), Phase::Lobby);
    assert_eq!(Phase::from_upstream("GameStart").unwrap(), Phase::Launching);
    assert_eq!(Phase::from_upstream("Reconnect").unwrap(), Phase::InMatch);
    assert_eq!(Phase::from_upstream("EndOfGame").unwrap(), Phase::Ended);
    assert!(Phase::from_upstream("Banana").is_err());
  }
}
