use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::lockfile::LcuCredentials;
use crate::error::ConnectionError;
use crate::events::{RawEvent, CHAMP_SELECT_SESSION_URI, GAMEFLOW_PHASE_URI, GAMEFLOW_SESSION_URI};

// REST access to the local client API (self-signed TLS, basic auth)

#[derive(Debug, Clone)]
pub struct LcuClient {
  http: reqwest::Client,
  base_url: String,
  auth: String,
}

impl LcuClient {
  pub fn new(creds: &LcuCredentials) -> Result<Self, ConnectionError> {
    let http = reqwest::Client::builder()
      .danger_accept_invalid_certs(true)
      .timeout(Duration::from_secs(5))
      .connect_timeout(Duration::from_secs(2))
      .pool_max_idle_per_host(2)
      .build()?;
    Ok(Self {
      http,
      base_url: creds.base_url(),
      auth: creds.auth_header(),
    })
  }

  /// `Ok(None)` for 404, which the client uses for "no such session right now".
  async fn get_json(&self, uri: &str) -> Result<Option<Value>, ConnectionError> {
    let resp = self
      .http
      .get(format!("{}{}", self.base_url, uri))
      .header("Authorization", &self.auth)
      .send()
      .await?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      return Err(ConnectionError::Status {
        uri: uri.to_string(),
        status: status.as_u16(),
      });
    }
    Ok(Some(resp.json::<Value>().await?))
  }

  pub async fn gameflow_phase(&self) -> Result<String, ConnectionError> {
    let value = self.get_json(GAMEFLOW_PHASE_URI).await?;
    Ok(
      value
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or("None")
        .to_string(),
    )
  }

  pub async fn champ_select_session(&self) -> Result<Option<Value>, ConnectionError> {
    self.get_json(CHAMP_SELECT_SESSION_URI).await
  }

  pub async fn gameflow_session(&self) -> Result<Value, ConnectionError> {
    Ok(self.get_json(GAMEFLOW_SESSION_URI).await?.unwrap_or(Value::Null))
  }

  /// Fresh authoritative view of upstream state, shaped like websocket events
  /// so it flows through the same normalization path.
  pub async fn resync(&self) -> Result<Vec<RawEvent>, ConnectionError> {
    let phase = self.gameflow_phase().await?;
    info!("[LCU] Re-sync: upstream phase is {}", phase);
    let mut events = vec![RawEvent::json(
      json!({ "uri": GAMEFLOW_PHASE_URI, "eventType": "Update", "data": phase }),
      true,
    )];
    if phase == "ChampSelect" {
      match self.champ_select_session().await? {
        Some(session) => events.push(RawEvent::json(
          json!({ "uri": CHAMP_SELECT_SESSION_URI, "eventType": "Update", "data": session }),
          true,
        )),
        None => debug!("[LCU] Re-sync: no champ select session"),
      }
    }
    Ok(events)
  }
}
