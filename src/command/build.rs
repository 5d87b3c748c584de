// src/command/build.rs

//! Checksum-based `build` command.
//!
//! Selected source files are hashed and compared to the manifest kept in the
//! working directory. Only when they differ are the working files refreshed
//! and the build allowed to run (unless changes are not required).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::checksum::{self, ChecksumEntry, CHECKSUM_FILE_NAME};
use crate::command::{Command, FailureCode};
use crate::deadline::Deadline;
use crate::errors::{PackrunError, Result};

const COMMAND_NAME: &str = "build";

pub const DEFAULT_TEMPLATE: &str = "template.json";

/// Everything a [`BuildCommand`] needs.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory holding the source files.
    pub source_dir: PathBuf,
    /// Directory the tool runs in; tracked files are copied here.
    pub working_dir: PathBuf,
    /// Tracked files, relative to `source_dir`.
    pub files: BTreeSet<String>,
    /// Skip the run when nothing changed.
    pub changes_needed: bool,
    /// Drop the manifest when the tool fails.
    pub invalidate_on_failure: bool,
    /// Template path, relative to the working directory.
    pub template: String,
    pub force: bool,
    pub only: BTreeSet<String>,
    pub except: BTreeSet<String>,
    pub vars: BTreeMap<String, String>,
    pub var_files: Vec<String>,
}

impl BuildOptions {
    pub fn new(source_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            working_dir: working_dir.into(),
            files: BTreeSet::new(),
            changes_needed: true,
            invalidate_on_failure: true,
            template: DEFAULT_TEMPLATE.to_string(),
            force: false,
            only: BTreeSet::new(),
            except: BTreeSet::new(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
        }
    }

    /// Tool arguments, in the order the tool expects them.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.force {
            args.push("-force".to_string());
        }
        if !self.only.is_empty() {
            args.push("-only".to_string());
            args.push(join_names(&self.only));
        }
        if !self.except.is_empty() {
            args.push("-except".to_string());
            args.push(join_names(&self.except));
        }
        for (key, value) in &self.vars {
            args.push("-var".to_string());
            args.push(format!("{key}={value}"));
        }
        for var_file in &self.var_files {
            args.push("-var-file".to_string());
            args.push(var_file.clone());
        }
        args.push(self.template.clone());
        args
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[derive(Debug)]
pub struct BuildCommand {
    options: BuildOptions,
    arguments: Vec<String>,
    checksum_file: PathBuf,
    /// Source and working directory are the same; nothing is copied.
    in_place: bool,
}

impl BuildCommand {
    pub fn new(options: BuildOptions) -> Result<BuildCommand> {
        if !options.source_dir.is_dir() {
            return Err(PackrunError::ConfigError(format!(
                "source path {} is not a directory",
                options.source_dir.display()
            )));
        }
        if options.working_dir.exists() && !options.working_dir.is_dir() {
            return Err(PackrunError::ConfigError(format!(
                "working path {} is not a directory",
                options.working_dir.display()
            )));
        }
        for file in &options.files {
            validate_relative(file)?;
        }

        let in_place = same_dir(&options.source_dir, &options.working_dir);
        let checksum_file = options.working_dir.join(CHECKSUM_FILE_NAME);
        let arguments = options.arguments();

        Ok(BuildCommand {
            options,
            arguments,
            checksum_file,
            in_place,
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn checksum_file(&self) -> &Path {
        &self.checksum_file
    }

    /// Bring the working directory in line with `current`, then persist it.
    fn refresh(
        &self,
        current: &HashSet<ChecksumEntry>,
        previous: &HashSet<ChecksumEntry>,
        deadline: Deadline,
    ) -> Result<()> {
        let working = &self.options.working_dir;
        fs::create_dir_all(working)
            .map_err(|e| PackrunError::io_at("creating working dir", working, e))?;

        if !self.in_place {
            self.remove_stale(current, previous)?;

            let mut ordered: Vec<&ChecksumEntry> = current.iter().collect();
            ordered.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
            for entry in ordered {
                deadline.checked()?;
                self.copy_to_working(entry.relative_path())?;
            }
        }

        checksum::write_manifest(&self.checksum_file, current)?;
        debug!(path = %self.checksum_file.display(), entries = current.len(), "manifest written");
        Ok(())
    }

    fn remove_stale(
        &self,
        current: &HashSet<ChecksumEntry>,
        previous: &HashSet<ChecksumEntry>,
    ) -> Result<()> {
        let keep: HashSet<&str> = current.iter().map(|e| e.relative_path()).collect();
        for entry in previous {
            let rel = entry.relative_path();
            if keep.contains(rel) || validate_relative(rel).is_err() {
                continue;
            }
            let stale = self.options.working_dir.join(rel);
            match fs::remove_file(&stale) {
                Ok(()) => debug!(path = %stale.display(), "removed stale working file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(PackrunError::io_at("removing stale file", &stale, e)),
            }
        }
        Ok(())
    }

    fn copy_to_working(&self, rel: &str) -> Result<()> {
        let source = self.options.source_dir.join(rel);
        let target = self.options.working_dir.join(rel);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PackrunError::io_at("creating dir", parent, e))?;
        }
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PackrunError::io_at("replacing", &target, e)),
        }
        fs::copy(&source, &target).map_err(|e| {
            PackrunError::io(
                format!("copying {} to {}", source.display(), target.display()),
                e,
            )
        })?;
        debug!(from = %source.display(), to = %target.display(), "working file updated");
        Ok(())
    }

    fn invalidate(&self, reason: &str) {
        match checksum::invalidate_manifest(&self.checksum_file) {
            Ok(true) => info!(path = %self.checksum_file.display(), reason, "manifest invalidated"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, reason, "could not invalidate manifest"),
        }
    }
}

impl Command for BuildCommand {
    fn name(&self) -> &str {
        COMMAND_NAME
    }

    fn arguments(&self) -> &[String] {
        &self.arguments
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(&self.options.working_dir)
    }

    fn init(&self, deadline: Deadline) -> Result<bool> {
        let deadline = deadline.checked()?;
        debug!(
            source = %self.options.source_dir.display(),
            working = %self.options.working_dir.display(),
            files = self.options.files.len(),
            "checking source files for changes"
        );

        let current = checksum::compute_entries(&self.options.source_dir, &self.options.files)?;
        let previous = checksum::read_manifest(&self.checksum_file)?;

        if current != previous {
            info!(
                tracked = current.len(),
                previously = previous.len(),
                "source files changed; refreshing working directory"
            );
            self.refresh(&current, &previous, deadline)?;
            return Ok(true);
        }

        if self.options.changes_needed {
            info!("there is not any change; ignoring");
            return Ok(false);
        }
        Ok(true)
    }

    fn on_failure(&self, _code: FailureCode) {
        if self.options.invalidate_on_failure {
            self.invalidate("build failed");
        }
    }

    fn on_abort(&self) {
        self.invalidate("build aborted");
    }

    fn map_failure_code(&self, _exit_code: i32) -> FailureCode {
        FailureCode::Error
    }
}

/// Tracked paths must stay inside their root and never shadow the manifest.
fn validate_relative(rel: &str) -> Result<()> {
    let path = Path::new(rel);
    let inside = !rel.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !inside {
        return Err(PackrunError::ConfigError(format!(
            "tracked file {rel:?} is not a relative path inside the source directory"
        )));
    }
    if path == Path::new(CHECKSUM_FILE_NAME) {
        return Err(PackrunError::ConfigError(format!(
            "{CHECKSUM_FILE_NAME} cannot be a tracked file"
        )));
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
