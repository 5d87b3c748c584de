// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod deadline;
pub mod errors;
pub mod exec;
pub mod fileset;
pub mod logging;
pub mod message;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::command::{BuildCommand, BuildOptions, Command};
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::errors::PackrunError;
use crate::fileset::FileSet;
use crate::task::CommandTask;

/// How a `packrun` invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The tool ran and exited 0.
    Built,
    /// Nothing changed; the tool was not run.
    Skipped,
    DryRun,
    /// The tool failed, timed out, was interrupted, or could not start.
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Built | RunStatus::Skipped | RunStatus::DryRun => 0,
            RunStatus::Failed => 2,
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// Loads the config, resolves the tracked files, and drives one build task
/// until it finishes. Ctrl-C interrupts the tool and aborts the build.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut options = build_options(&cfg)?;
    options.force |= args.force;
    let timeout = args.timeout.or(cfg.timeout());

    let command = BuildCommand::new(options)?;

    if args.dry_run {
        print_dry_run(&cfg, &command, timeout);
        return Ok(RunStatus::DryRun);
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping build");
            shutdown.cancel();
        });
    }

    let task = CommandTask::new(Arc::new(command))
        .with_tool(cfg.tool_command())
        .with_shutdown(shutdown);

    let outcome = match timeout {
        Some(limit) => task.get_timeout(limit).await,
        None => task.get().await,
    };

    let status = match outcome {
        Ok(result) => match result.success() {
            Ok(true) => RunStatus::Built,
            Ok(false) => RunStatus::Skipped,
            Err(e) => {
                error!(error = %e, "build failed");
                RunStatus::Failed
            }
        },
        Err(e) => {
            error!(error = %e, "build did not complete");
            RunStatus::Failed
        }
    };
    debug!(?status, "packrun finished");
    Ok(status)
}

/// Turn the `[build]` section into [`BuildOptions`], resolving the tracked
/// file set on disk.
pub fn build_options(cfg: &ConfigFile) -> errors::Result<BuildOptions> {
    let build = &cfg.build;
    if !build.source_dir.is_dir() {
        return Err(PackrunError::ConfigError(format!(
            "source path {} is not a directory",
            build.source_dir.display()
        )));
    }
    let working_dir = build.effective_working_dir().to_path_buf();

    let files = FileSet::new(&build.source_dir, &build.include, &build.exclude)?
        .skipping(&working_dir)
        .collect_relative_paths()?;

    let mut options = BuildOptions::new(&build.source_dir, working_dir);
    options.files = files;
    options.changes_needed = build.changes_needed;
    options.invalidate_on_failure = build.invalidate_on_failure;
    options.template = build.template.clone();
    options.force = build.force;
    options.only = build.only.iter().cloned().collect();
    options.except = build.except.iter().cloned().collect();
    options.vars = build.vars.clone();
    options.var_files = build.var_files.clone();
    Ok(options)
}

fn print_dry_run(cfg: &ConfigFile, command: &BuildCommand, timeout: Option<Duration>) {
    let options = command.options();
    println!("packrun dry-run");
    println!(
        "  argv: {}",
        cfg.tool_command()
            .argv(command.name(), command.arguments())
            .join(" ")
    );
    println!("  source_dir: {}", options.source_dir.display());
    println!("  working_dir: {}", options.working_dir.display());
    println!("  changes_needed: {}", options.changes_needed);
    println!("  invalidate_on_failure: {}", options.invalidate_on_failure);
    if let Some(limit) = timeout {
        println!("  timeout: {limit:?}");
    }
    println!();

    println!("tracked files ({}):", options.files.len());
    for file in &options.files {
        println!("  - {file}");
    }

    debug!("dry-run complete (no execution)");
}
