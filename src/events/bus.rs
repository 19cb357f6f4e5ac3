use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

use super::normalize::normalize;
use super::types::{BusEvent, Envelope, EventKind, RawEvent};
use crate::session::Phase;

// In-process event bus: normalize, de-duplicate, deliver in arrival order

const RECENT_ID_CAPACITY: usize = 512;

pub type Handler<C> = Box<dyn FnMut(&mut C, &Envelope) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
  pub delivered: u64,
  pub duplicates: u64,
  pub malformed: u64,
  pub handler_failures: u64,
}

/// Delivers typed events to subscribers synchronously, one event at a time.
///
/// `C` is the context every handler receives mutably; the owner of the bus
/// holds it, so handlers never need shared locks.
pub struct EventBus<C> {
  handlers: HashMap<EventKind, Vec<(String, Handler<C>)>>,
  recent_ids: VecDeque<String>,
  recent_set: HashSet<String>,
  last_phase: Option<Phase>,
  connected: Option<bool>,
  stats: BusStats,
}

impl<C> Default for EventBus<C> {
  fn default() -> Self {
    Self::new()
  }
}

impl<C> EventBus<C> {
  pub fn new() -> Self {
    Self {
      handlers: HashMap::new(),
      recent_ids: VecDeque::with_capacity(RECENT_ID_CAPACITY),
      recent_set: HashSet::new(),
      last_phase: None,
      connected: None,
      stats: BusStats::default(),
    }
  }

  pub fn subscribe<F>(&mut self, kind: EventKind, name: &str, handler: F)
  where
    F: FnMut(&mut C, &Envelope) -> anyhow::Result<()> + Send + 'static,
  {
    debug!("[Bus] {} subscribed to {}", name, kind);
    self
      .handlers
      .entry(kind)
      .or_default()
      .push((name.to_string(), Box::new(handler)));
  }

  pub fn stats(&self) -> BusStats {
    self.stats
  }

  /// Normalize and publish one raw payload. Returns how many events were delivered.
  pub fn ingest(&mut self, ctx: &mut C, raw: RawEvent) -> usize {
    match normalize(&raw) {
      Ok(envelopes) => envelopes
        .into_iter()
        .filter(|env| self.publish(ctx, env))
        .count(),
      Err(e) => {
        self.stats.malformed += 1;
        warn!("[Bus] Dropping malformed event: {}", e);
        0
      }
    }
  }

  /// Deliver a typed event. Returns `false` if it was suppressed as a duplicate.
  pub fn publish(&mut self, ctx: &mut C, env: &Envelope) -> bool {
    if self.is_duplicate(env) {
      self.stats.duplicates += 1;
      debug!("[Bus] Duplicate {} suppressed", env.kind());
      return false;
    }
    self.stats.delivered += 1;

    let Some(handlers) = self.handlers.get_mut(&env.kind()) else {
      return true;
    };
    for (name, handler) in handlers.iter_mut() {
      match catch_unwind(AssertUnwindSafe(|| handler(ctx, env))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
          self.stats.handler_failures += 1;
          error!("[Bus] Handler {} failed on {}: {:#}", name, env.kind(), e);
        }
        Err(_) => {
          self.stats.handler_failures += 1;
          error!("[Bus] Handler {} panicked on {}", name, env.kind());
        }
      }
    }
    true
  }

  fn is_duplicate(&mut self, env: &Envelope) -> bool {
    if let Some(id) = &env.event_id {
      if self.recent_set.contains(id) {
        return true;
      }
      if self.recent_ids.len() == RECENT_ID_CAPACITY {
        if let Some(old) = self.recent_ids.pop_front() {
          self.recent_set.remove(&old);
        }
      }
      self.recent_ids.push_back(id.clone());
      self.recent_set.insert(id.clone());
    }

    match &env.event {
      BusEvent::PhaseChanged {
        phase,
        authoritative,
      } => {
        let repeat = self.last_phase == Some(*phase) && !authoritative;
        self.last_phase = Some(*phase);
        repeat
      }
      BusEvent::ConnectionLost { .. } => {
        let repeat = self.connected == Some(false);
        self.connected = Some(false);
        repeat
      }
      BusEvent::ConnectionRestored => {
        let repeat = self.connected == Some(true);
        self.connected = Some(true);
        repeat
      }
      _ => false,
    }
  }
}
