use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use super::outcome::InjectionPlan;
use crate::events::SKIN_CATEGORY;
use crate::lcu::{read_lockfile, session::gameflow_champion_ids, LcuClient};

// Post-apply check that the launched match matches what was injected

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyMismatch {
  pub expected: String,
  pub actual: String,
}

#[async_trait]
pub trait Verifier: Send + Sync {
  /// `Ok` covers both a confirmed match and an inconclusive read.
  async fn verify(&self, plan: &InjectionPlan) -> Result<(), VerifyMismatch>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVerifier;

#[async_trait]
impl Verifier for NoopVerifier {
  async fn verify(&self, _plan: &InjectionPlan) -> Result<(), VerifyMismatch> {
    Ok(())
  }
}

/// Compares the injected skin's champion with the champions the client is loading.
#[derive(Debug, Clone)]
pub struct LcuLaunchVerifier {
  league_path: PathBuf,
}

impl LcuLaunchVerifier {
  pub fn new(league_path: impl Into<PathBuf>) -> Self {
    Self {
      league_path: league_path.into(),
    }
  }
}

/// Champion targets of the skin selections in `plan`.
pub fn expected_targets(plan: &InjectionPlan) -> Vec<i64> {
  plan
    .selections
    .iter()
    .filter(|s| s.category.as_str() == SKIN_CATEGORY)
    .filter_map(|s| s.target.as_ref())
    .filter_map(|t| t.as_str().parse::<i64>().ok())
    .collect()
}

/// `Err` when the client reports champions and an expected target is not among them.
pub fn compare_targets(expected: &[i64], actual: &[i64]) -> Result<(), VerifyMismatch> {
  if expected.is_empty() || actual.is_empty() || expected.iter().all(|e| actual.contains(e)) {
    return Ok(());
  }
  let join = |ids: &[i64]| {
    ids
      .iter()
      .map(|i| i.to_string())
      .collect::<Vec<_>>()
      .join(",")
  };
  Err(VerifyMismatch {
    expected: join(expected),
    actual: join(actual),
  })
}

#[async_trait]
impl Verifier for LcuLaunchVerifier {
  async fn verify(&self, plan: &InjectionPlan) -> Result<(), VerifyMismatch> {
    let expected = expected_targets(plan);
    if expected.is_empty() {
      return Ok(());
    }
    let client = match read_lockfile(&self.league_path).and_then(|creds| LcuClient::new(&creds)) {
      Ok(client) => client,
      Err(e) => {
        debug!("[Verify] Skipping launch check: {}", e);
        return Ok(());
      }
    };
    let actual = match client.gameflow_session().await {
      Ok(session) => gameflow_champion_ids(&session),
      Err(e) => {
        debug!("[Verify] Gameflow session unavailable: {}", e);
        return Ok(());
      }
    };
    let result = compare_targets(&expected, &actual);
    if result.is_ok() {
      info!("[Verify] Launch matches injected content ({:?})", expected);
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mismatch_only_when_client_reports_other_champions() {
    assert!(compare_targets(&[266], &[266, 64]).is_ok());
    assert!(compare_targets(&[266], &[]).is_ok());
    assert!(compare_targets(&[], &[64]).is_ok());
    assert!(compare_targets(&[266, 64], &[266]).is_err());
    assert_eq!(
      compare_targets(&[266], &[64, 99]),
      Err(VerifyMismatch {
        expected: "266".into(),
        actual: "64,99".into()
      })
    );
  }
}
