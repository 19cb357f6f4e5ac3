use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::catalog::ContentCatalog;
use super::outcome::{InjectionOutcome, InjectionPlan};
use super::verify::Verifier;
use crate::error::InjectionError;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Applies one frozen selection snapshot.
///
/// Implementations must stop promptly once `cancel` fires; the watchdog has
/// already reported `TimedOut` by then.
#[async_trait]
pub trait Injector: Send + Sync {
  async fn run(&self, plan: &InjectionPlan, cancel: CancellationToken) -> InjectionOutcome;
}

/// Runs the external modification tool over the resolved content files.
pub struct InjectionExecutor {
  tool: PathBuf,
  install_dir: PathBuf,
  extra_args: Vec<String>,
  catalog: Arc<dyn ContentCatalog>,
  verifier: Arc<dyn Verifier>,
}

impl InjectionExecutor {
  pub fn new(
    tool: impl Into<PathBuf>,
    install_dir: impl Into<PathBuf>,
    catalog: Arc<dyn ContentCatalog>,
    verifier: Arc<dyn Verifier>,
  ) -> Self {
    Self {
      tool: tool.into(),
      install_dir: install_dir.into(),
      extra_args: Vec::new(),
      catalog,
      verifier,
    }
  }

  pub fn with_args(mut self, args: Vec<String>) -> Self {
    self.extra_args = args;
    self
  }

  /// Validate paths and map every selection to a content file.
  fn prepare(&self, plan: &InjectionPlan) -> Result<Vec<PathBuf>, InjectionError> {
    if !self.tool.is_file() {
      return Err(InjectionError::ToolMissing(self.tool.clone()));
    }
    if !self.install_dir.is_dir() {
      return Err(InjectionError::InvalidInstallDir(self.install_dir.clone()));
    }
    let mut files = Vec::new();
    for selection in plan.selections.iter() {
      match self.catalog.resolve(selection) {
        Some(path) => files.push(path),
        None => warn!(
          "[Injection] Skipping {} {}: no content file",
          selection.category, selection.candidate
        ),
      }
    }
    if files.is_empty() {
      return Err(InjectionError::NoContent);
    }
    Ok(files)
  }

  /// `<tool> <extra args> --game:<install dir> <content file>...`, one
  /// argument per content file.
  fn command(&self, files: &[PathBuf]) -> Command {
    let mut command = Command::new(&self.tool);
    command
      .args(&self.extra_args)
      .arg(format!("--game:{}", self.install_dir.display()))
      .args(files)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    #[cfg(target_os = "windows")]
    command.creation_flags(CREATE_NO_WINDOW);
    command
  }

  async fn apply(
    &self,
    plan: &InjectionPlan,
    cancel: &CancellationToken,
  ) -> Result<InjectionOutcome, InjectionError> {
    let files = self.prepare(plan)?;
    info!(
      "[Injection] Run {}: applying {} file(s) with {}",
      plan.run_id,
      files.len(),
      self.tool.display()
    );
    let mut child = self.command(&files).spawn()?;
    let mut stderr = child.stderr.take();
    let stderr_reader = tokio::spawn(async move {
      let mut buf = String::new();
      if let Some(pipe) = stderr.as_mut() {
        let _ = pipe.read_to_string(&mut buf).await;
      }
      buf
    });

    let status = tokio::select! {
      status = child.wait() => status?,
      _ = cancel.cancelled() => {
        warn!("[Injection] Run {} cancelled; killing tool process", plan.run_id);
        if let Err(e) = child.start_kill() {
          debug!("[Injection] Kill failed: {}", e);
        }
        stderr_reader.abort();
        return Ok(InjectionOutcome::TimedOut);
      }
    };

    let stderr = stderr_reader.await.unwrap_or_default();
    if !status.success() {
      return Err(InjectionError::Process(format!(
        "{} exited with {}: {}",
        self.tool.display(),
        status,
        stderr.trim_end()
      )));
    }
    debug!("[Injection] Run {} tool finished", plan.run_id);

    Ok(match self.verifier.verify(plan).await {
      Ok(()) => InjectionOutcome::Success,
      Err(mismatch) => InjectionOutcome::VerifyFailed {
        expected: mismatch.expected,
        actual: mismatch.actual,
      },
    })
  }
}

#[async_trait]
impl Injector for InjectionExecutor {
  async fn run(&self, plan: &InjectionPlan, cancel: CancellationToken) -> InjectionOutcome {
    match self.apply(plan, &cancel).await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!("[Injection] Run {} failed: {}", plan.run_id, e);
        InjectionOutcome::ProcessError {
          message: e.to_string(),
        }
      }
    }
  }
}
