use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use loadout_injector_lib::config::{default_data_dir, AppConfig, ConfigStore};
use loadout_injector_lib::diagnostics::{DiagnosticCategory, DiagnosticsRecorder};
use loadout_injector_lib::events::RawEvent;
use loadout_injector_lib::injection::{
  DirectoryCatalog, InjectionExecutor, LcuLaunchVerifier, NoopVerifier, Verifier,
};
use loadout_injector_lib::lcu::LcuStream;
use loadout_injector_lib::logging::{export_logs, init_logging};
use loadout_injector_lib::selection::{SelectionNotice, SelectionStore};
use loadout_injector_lib::session::PhaseStateMachine;
use loadout_injector_lib::{Controller, ControllerHandle};

#[derive(Parser)]
#[command(name = "loadout-injector", version, about = "Injects chosen content right before the game launches")]
struct Cli {
  /// Data directory (config, logs, diagnostics, selection history)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Debug-level logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Watch the client and inject at game launch
  Run {
    /// League install directory containing the lockfile
    #[arg(long)]
    league_path: Option<PathBuf>,
    /// Game directory handed to the modification tool
    #[arg(long)]
    install_dir: Option<PathBuf>,
    /// Modification tool executable
    #[arg(long)]
    tool: Option<PathBuf>,
    /// Root of the content library
    #[arg(long)]
    content_root: Option<PathBuf>,
    /// Read raw events from stdin, one JSON payload per line, instead of the client
    #[arg(long)]
    stdin: bool,
    /// Skip the post-apply launch check
    #[arg(long)]
    no_verify: bool,
  },
  /// Print or clear recorded diagnostics
  Diagnostics {
    /// Clear one category (injection_threshold, monitor_timeout, other)
    #[arg(long, conflicts_with = "clear_all")]
    clear: Option<String>,
    #[arg(long)]
    clear_all: bool,
  },
  /// Show or change the timing tunables
  Settings {
    /// Injection threshold in seconds
    #[arg(long)]
    threshold: Option<f64>,
    /// Monitor auto-resume timeout in seconds
    #[arg(long)]
    monitor_timeout: Option<u64>,
  },
  /// Copy the live log to a timestamped file
  ExportLogs,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => default_data_dir()?,
  };
  let store = ConfigStore::new(&data_dir);

  match cli.command {
    Command::Run {
      league_path,
      install_dir,
      tool,
      content_root,
      stdin,
      no_verify,
    } => {
      let mut cfg = store.load()?;
      init_logging(Some(&data_dir), cli.verbose || cfg.verbose_logging);
      cfg.league_path = league_path.or(cfg.league_path);
      cfg.install_dir = install_dir.or(cfg.install_dir);
      cfg.tool_path = tool.or(cfg.tool_path);
      cfg.content_root = content_root.or(cfg.content_root);
      if no_verify {
        cfg.verify_after_apply = false;
      }
      run(&data_dir, store, cfg, stdin).await
    }
    Command::Diagnostics { clear, clear_all } => {
      init_logging(None, cli.verbose);
      let settings = store.load()?.settings()?;
      let mut recorder = DiagnosticsRecorder::open(&data_dir);
      if clear_all {
        recorder.clear_all();
      } else if let Some(name) = clear {
        let Some(category) = DiagnosticCategory::parse(&name) else {
          bail!("unknown diagnostics category '{}'", name);
        };
        let removed = recorder.clear_category(category);
        println!("Cleared {} {} entr{}", removed, category, if removed == 1 { "y" } else { "ies" });
      }
      recorder.fetch(&settings);
      let report = recorder.render_report();
      if report.is_empty() {
        println!("No diagnostics recorded.");
      } else {
        println!("{}", report);
      }
      Ok(())
    }
    Command::Settings {
      threshold,
      monitor_timeout,
    } => {
      init_logging(None, cli.verbose);
      let current = store.load()?.settings()?;
      if threshold.is_none() && monitor_timeout.is_none() {
        println!(
          "injection threshold: {:.2}s\nmonitor auto-resume timeout: {}s",
          current.injection_threshold_secs(),
          current.monitor_timeout_secs()
        );
        return Ok(());
      }
      let mut recorder = DiagnosticsRecorder::open(&data_dir);
      // The baseline is the snapshot from the last diagnostics read
      if recorder.snapshot().is_none() {
        recorder.fetch(&current);
      }
      let threshold = threshold.unwrap_or(current.injection_threshold_secs());
      let monitor_timeout = monitor_timeout.unwrap_or(current.monitor_timeout_secs());
      match store.save_settings(threshold, monitor_timeout) {
        Ok(saved) => {
          let resolved = recorder.apply_settings_save(&saved, true);
          for category in resolved {
            println!("Resolved {} diagnostics", category);
          }
          println!("Saved.");
          Ok(())
        }
        Err(e) => Err(e).context("settings were not saved"),
      }
    }
    Command::ExportLogs => {
      let path = export_logs(&data_dir)?;
      println!("{}", path.display());
      Ok(())
    }
  }
}

async fn run(data_dir: &Path, store: ConfigStore, cfg: AppConfig, stdin: bool) -> Result<()> {
  let settings = cfg.settings()?;
  let league_path = cfg.league_path.clone();
  if league_path.is_none() && !stdin {
    bail!("no League path configured (use --league-path or --stdin)");
  }
  let Some(install_dir) = cfg.install_dir.clone() else {
    bail!("no install directory configured (use --install-dir)");
  };
  let tool = cfg
    .tool_path
    .clone()
    .unwrap_or_else(|| data_dir.join("cslol-tools").join(tool_file_name()));
  let content_root = cfg
    .content_root
    .clone()
    .unwrap_or_else(|| data_dir.join("content"));

  let verifier: Arc<dyn Verifier> = match (&cfg.league_path, cfg.verify_after_apply) {
    (Some(path), true) => Arc::new(LcuLaunchVerifier::new(path)),
    _ => Arc::new(NoopVerifier),
  };
  let executor = InjectionExecutor::new(
    tool,
    install_dir,
    Arc::new(DirectoryCatalog::new(content_root)),
    verifier,
  )
  .with_args(cfg.tool_args.clone());

  let machine = PhaseStateMachine::new(cfg.categories.clone(), settings)
    .with_store(SelectionStore::in_dir(data_dir));
  let controller = Controller::new(machine, Arc::new(executor), DiagnosticsRecorder::open(data_dir))
    .with_config_store(store);
  let handle = controller.handle();
  let controller_task = tokio::spawn(controller.run());
  tokio::spawn(log_notices(handle.clone()));

  match league_path {
    Some(path) if !stdin => {
      let stream = LcuStream::new(
        path,
        handle.raw_sender(),
        handle.resync_signal(),
        handle.shutdown_token(),
      );
      tokio::spawn(stream.run());
    }
    _ => {
      tokio::spawn(feed_stdin(handle.clone()));
    }
  }

  tokio::signal::ctrl_c().await?;
  info!("Shutting down");
  handle.shutdown();
  controller_task.await?;
  Ok(())
}

async fn feed_stdin(handle: ControllerHandle) {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    match lines.next_line().await {
      Ok(Some(line)) if line.trim().is_empty() => {}
      Ok(Some(line)) => {
        if handle.ingest(RawEvent::text(line)).await.is_err() {
          break;
        }
      }
      Ok(None) => break,
      Err(e) => {
        warn!("Failed to read stdin: {}", e);
        break;
      }
    }
  }
}

async fn log_notices(handle: ControllerHandle) {
  let mut notices = handle.subscribe_notices();
  loop {
    match notices.recv().await {
      Ok(SelectionNotice::Selected(s)) => info!("[Selection] {} -> {}", s.category, s.candidate),
      Ok(SelectionNotice::Deselected(s)) => info!("[Selection] {} cleared {}", s.category, s.candidate),
      Err(RecvError::Lagged(missed)) => warn!("[Selection] Skipped {} notices", missed),
      Err(RecvError::Closed) => break,
    }
  }
}

fn tool_file_name() -> &'static str {
  if cfg!(target_os = "windows") {
    "mod-tools.exe"
  } else {
    "mod-tools"
  }
}
