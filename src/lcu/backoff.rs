use std::time::Duration;

/// Exponential reconnect delay, reset after every successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
  initial: Duration,
  max: Duration,
  current: Duration,
}

impl Default for Backoff {
  fn default() -> Self {
    Self::new(Duration::from_millis(500), Duration::from_secs(30))
  }
}

impl Backoff {
  pub fn new(initial: Duration, max: Duration) -> Self {
    Self {
      initial,
      max,
      current: initial,
    }
  }

  pub fn next_delay(&mut self) -> Duration {
    let delay = self.current;
    self.current = (self.current * 2).min(self.max);
    delay
  }

  pub fn reset(&mut self) {
    self.current = self.initial;
  }
}
