use serde_json::Value;
use tracing::debug;

// Champ-select / gameflow session parsing helpers

/// What the local player currently has in champ select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPick {
  pub champion_id: i64,
  /// `None` when the client has not reported a skin yet.
  pub skin_id: Option<i64>,
  /// The pick action is completed (or the champion was assigned outright).
  pub locked: bool,
}

impl LocalPick {
  /// Base skins are encoded as `championId * 1000`.
  pub fn is_base_skin(&self) -> bool {
    self.skin_id == Some(self.champion_id * 1000)
  }
}

fn local_cell_id(session: &Value) -> Option<i64> {
  session.get("localPlayerCellId").and_then(|v| v.as_i64())
}

fn local_actions(session: &Value, cell_id: i64) -> impl Iterator<Item = &Value> + '_ {
  session
    .get("actions")
    .and_then(|v| v.as_array())
    .into_iter()
    .flatten()
    .filter_map(|group| group.as_array())
    .flatten()
    .filter(move |a| a.get("actorCellId").and_then(|v| v.as_i64()) == Some(cell_id))
}

/// Champion the local player has locked in, if any.
///
/// A pick still in progress yields `None`; a completed pick action wins; a
/// plain `myTeam` champion counts as assigned (ARAM and instant-assign queues).
pub fn locked_champion_id(session: &Value) -> Option<i64> {
  let cell_id = local_cell_id(session)?;

  let pick_in_progress = local_actions(session, cell_id).any(|a| {
    a.get("type").and_then(|v| v.as_str()) == Some("pick")
      && a.get("isInProgress").and_then(|v| v.as_bool()).unwrap_or(false)
  });
  if pick_in_progress {
    debug!("[LCU] Local pick is in progress; champion not locked yet");
    return None;
  }

  let completed = local_actions(session, cell_id).find_map(|a| {
    let is_pick = a.get("type").and_then(|v| v.as_str()) == Some("pick");
    let done = a.get("completed").and_then(|v| v.as_bool()).unwrap_or(false);
    let champion_id = a.get("championId").and_then(|v| v.as_i64()).unwrap_or(0);
    (is_pick && done && champion_id > 0).then_some(champion_id)
  });
  if completed.is_some() {
    return completed;
  }

  my_team_entry(session, cell_id)
    .and_then(|p| p.get("championId").and_then(|v| v.as_i64()))
    .filter(|id| *id > 0)
}

fn my_team_entry(session: &Value, cell_id: i64) -> Option<&Value> {
  session
    .get("myTeam")
    .and_then(|v| v.as_array())?
    .iter()
    .find(|p| p.get("cellId").and_then(|v| v.as_i64()) == Some(cell_id))
}

/// Champion (hovered or locked) and skin of the local player.
pub fn local_pick(session: &Value) -> Option<LocalPick> {
  let cell_id = local_cell_id(session)?;
  let me = my_team_entry(session, cell_id)?;
  let locked = locked_champion_id(session);

  let champion_id = me
    .get("championId")
    .and_then(|v| v.as_i64())
    .filter(|id| *id > 0)
    .or_else(|| {
      me.get("championPickIntent")
        .and_then(|v| v.as_i64())
        .filter(|id| *id > 0)
    })?;
  let skin_id = me
    .get("selectedSkinId")
    .and_then(|v| v.as_i64())
    .filter(|id| *id > 0);

  Some(LocalPick {
    champion_id,
    skin_id,
    locked: locked == Some(champion_id),
  })
}

/// Timer phase of a champ-select session, e.g. `BAN_PICK` or `FINALIZATION`.
pub fn timer_phase(session: &Value) -> Option<&str> {
  session
    .get("timer")
    .and_then(|t| t.get("phase"))
    .and_then(|v| v.as_str())
}

/// Champions the local player is loading into, read from `/lol-gameflow/v1/session`.
pub fn gameflow_champion_ids(json: &Value) -> Vec<i64> {
  fn push(ids: &mut Vec<i64>, id: i64) {
    if id > 0 && !ids.contains(&id) {
      ids.push(id);
    }
  }

  let mut champion_ids = Vec::new();

  let game_data = json.get("gameData");
  let local_summoner_id = json
    .get("localPlayerSelection")
    .and_then(|lp| lp.get("summonerId"))
    .and_then(|id| id.as_i64());

  if let (Some(selections), Some(local_id)) = (
    game_data
      .and_then(|g| g.get("playerChampionSelections"))
      .and_then(|p| p.as_array()),
    local_summoner_id,
  ) {
    for selection in selections {
      if selection.get("summonerId").and_then(|id| id.as_i64()) != Some(local_id) {
        continue;
      }
      for id in selection
        .get("championIds")
        .and_then(|ids| ids.as_array())
        .into_iter()
        .flatten()
        .filter_map(|c| c.as_i64())
      {
        push(&mut champion_ids, id);
      }
    }
  }

  if champion_ids.is_empty() {
    for id in game_data
      .and_then(|g| g.get("selectedChampions"))
      .and_then(|sc| sc.as_array())
      .into_iter()
      .flatten()
      .filter_map(|s| s.get("championId").and_then(|id| id.as_i64()))
    {
      push(&mut champion_ids, id);
    }
  }

  champion_ids
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn session(in_progress: bool, completed: bool) -> Value {
    json!({
      "localPlayerCellId": 2,
      "timer": { "phase": "BAN_PICK" },
      "actions": [[
        { "actorCellId": 1, "type": "pick", "championId": 64, "completed": true, "isInProgress": false },
        { "actorCellId": 2, "type": "pick", "championId": 266, "completed": completed, "isInProgress": in_progress }
      ]],
      "myTeam": [
        { "cellId": 1, "championId": 64, "selectedSkinId": 64003 },
        { "cellId": 2, "championId": 266, "selectedSkinId": 266004 }
      ]
    })
  }

  #[test]
  fn pick_in_progress_is_a_hover() {
    let s = session(true, false);
    assert_eq!(locked_champion_id(&s), None);
    let pick = local_pick(&s).unwrap();
    assert_eq!(pick.champion_id, 266);
    assert_eq!(pick.skin_id, Some(266004));
    assert!(!pick.locked);
  }

  #[test]
  fn completed_pick_is_locked() {
    let s = session(false, true);
    assert_eq!(locked_champion_id(&s), Some(266));
    assert!(local_pick(&s).unwrap().locked);
    assert_eq!(timer_phase(&s), Some("BAN_PICK"));
  }

  #[test]
  fn base_skin_is_detected() {
    let pick = LocalPick {
      champion_id: 266,
      skin_id: Some(266000),
      locked: true,
    };
    assert!(pick.is_base_skin());
  }

  #[test]
  fn gameflow_champions_prefer_local_player_selection() {
    let flow = json!({
      "localPlayerSelection": { "summonerId": 7 },
      "gameData": {
        "playerChampionSelections": [
          { "summonerId": 8, "championIds": [1] },
          { "summonerId": 7, "championIds": [266, 266, 0] }
        ],
        "selectedChampions": [{ "championId": 99 }]
      }
    });
    assert_eq!(gameflow_champion_ids(&flow), vec![266]);

    let fallback = json!({ "gameData": { "selectedChampions": [{ "championId": 99 }] } });
    assert_eq!(gameflow_champion_ids(&fallback), vec![99]);
  }
}
