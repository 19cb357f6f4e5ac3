use futures_util::{SinkExt, StreamExt};
use native_tls::TlsConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::client::LcuClient;
use super::lockfile::{read_lockfile, LcuCredentials};
use crate::error::ConnectionError;
use crate::events::RawEvent;

// Websocket event stream from the local client, with reconnect and re-sync

const SUBSCRIBE_ALL: &str = "[5,\"OnJsonApiEvent\"]";

pub struct LcuStream {
  league_path: PathBuf,
  events: mpsc::Sender<RawEvent>,
  resync: Arc<Notify>,
  cancel: CancellationToken,
  backoff: Backoff,
}

enum SessionEnd {
  Closed,
  Stopped,
}

impl LcuStream {
  pub fn new(
    league_path: impl Into<PathBuf>,
    events: mpsc::Sender<RawEvent>,
    resync: Arc<Notify>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      league_path: league_path.into(),
      events,
      resync,
      cancel,
      backoff: Backoff::default(),
    }
  }

  /// Connect, forward frames, reconnect with backoff. Returns once cancelled
  /// or when nobody is listening any more.
  pub async fn run(mut self) {
    info!("[LCU] Watching {}", self.league_path.display());
    loop {
      if self.cancel.is_cancelled() {
        break;
      }
      let reason = match read_lockfile(&self.league_path) {
        Ok(creds) => match self.session(&creds).await {
          Ok(SessionEnd::Stopped) => break,
          Ok(SessionEnd::Closed) => "websocket closed".to_string(),
          Err(e) => {
            warn!("[LCU] Connection error: {}", e);
            e.to_string()
          }
        },
        Err(e) => {
          debug!("[LCU] {}", e);
          e.to_string()
        }
      };
      if !self.emit(RawEvent::connection(false, Some(reason))).await {
        break;
      }
      let delay = self.backoff.next_delay();
      debug!("[LCU] Reconnecting in {:?}", delay);
      tokio::select! {
        _ = self.cancel.cancelled() => break,
        _ = sleep(delay) => {}
      }
    }
    info!("[LCU] Stream stopped");
  }

  async fn emit(&self, event: RawEvent) -> bool {
    self.events.send(event).await.is_ok()
  }

  async fn resync_now(&self, client: &LcuClient) -> bool {
    match client.resync().await {
      Ok(events) => {
        for event in events {
          if !self.emit(event).await {
            return false;
          }
        }
      }
      Err(e) => warn!("[LCU] Re-sync failed: {}", e),
    }
    true
  }

  async fn session(&mut self, creds: &LcuCredentials) -> Result<SessionEnd, ConnectionError> {
    let mut request = creds.ws_url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
      "Authorization",
      creds
        .auth_header()
        .parse()
        .map_err(|e| ConnectionError::Header(format!("{}", e)))?,
    );
    headers.insert(
      "Sec-WebSocket-Protocol",
      "wamp"
        .parse()
        .map_err(|e| ConnectionError::Header(format!("{}", e)))?,
    );
    let tls = TlsConnector::builder()
      .danger_accept_invalid_certs(true)
      .build()?;

    info!("[LCU] Connecting to {}", creds.ws_url());
    let (mut socket, _response) = tokio_tungstenite::connect_async_tls_with_config(
      request,
      None,
      false,
      Some(Connector::NativeTls(tls)),
    )
    .await?;
    socket.send(Message::Text(SUBSCRIBE_ALL.into())).await?;
    self.backoff.reset();
    info!("[LCU] WebSocket connected");

    let client = LcuClient::new(creds)?;
    // The controller answers ConnectionRestored with a re-sync request
    if !self.emit(RawEvent::connection(true, None)).await {
      return Ok(SessionEnd::Stopped);
    }

    loop {
      tokio::select! {
        _ = self.cancel.cancelled() => {
          let _ = socket.close(None).await;
          return Ok(SessionEnd::Stopped);
        }
        _ = self.resync.notified() => {
          if !self.resync_now(&client).await {
            return Ok(SessionEnd::Stopped);
          }
        }
        frame = socket.next() => match frame {
          Some(Ok(Message::Text(text))) => {
            if !self.emit(RawEvent::text(text)).await {
              return Ok(SessionEnd::Stopped);
            }
          }
          Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
          Some(Ok(_)) => {}
          Some(Err(e)) => return Err(e.into()),
        }
      }
    }
  }
}
