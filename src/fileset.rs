// src/fileset.rs

//! Glob-based selection of the source files a build tracks.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::command::checksum::CHECKSUM_FILE_NAME;
use crate::errors::{PackrunError, Result};

pub const DEFAULT_INCLUDE: &str = "**/*";

/// Files under `root` matching `include` and not matching `exclude`.
///
/// Patterns are matched against paths relative to `root`, with forward
/// slashes (e.g. `"scripts/setup.sh"`).
#[derive(Clone)]
pub struct FileSet {
    root: PathBuf,
    include: GlobSet,
    exclude: Option<GlobSet>,
    skip_dirs: Vec<PathBuf>,
}

impl fmt::Debug for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSet")
            .field("root", &self.root)
            .field("skip_dirs", &self.skip_dirs)
            .finish_non_exhaustive()
    }
}

impl FileSet {
    pub fn new(root: impl Into<PathBuf>, include: &[String], exclude: &[String]) -> Result<Self> {
        if include.is_empty() {
            return Err(PackrunError::ConfigError(
                "a file set needs at least one include pattern".to_string(),
            ));
        }
        let include = build_globset(include).context("building include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            root: root.into(),
            include,
            exclude,
            skip_dirs: Vec::new(),
        })
    }

    /// Never descend into `dir` (typically a working directory nested in
    /// the source tree).
    pub fn skipping(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_dirs.push(dir.into());
        self
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if rel_path == CHECKSUM_FILE_NAME || !self.include.is_match(rel_path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }

    /// Walk `root` and return the matching files, relative and sorted.
    pub fn collect_relative_paths(&self) -> Result<BTreeSet<String>> {
        let skip: Vec<PathBuf> = self
            .skip_dirs
            .iter()
            .filter_map(|d| fs::canonicalize(d).ok())
            .collect();

        let mut files = BTreeSet::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let entries =
                fs::read_dir(&dir).map_err(|e| PackrunError::io_at("reading dir", &dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| PackrunError::io_at("reading dir", &dir, e))?;
                let path = entry.path();
                if path.is_dir() {
                    let skipped = fs::canonicalize(&path)
                        .map(|c| skip.contains(&c))
                        .unwrap_or(false);
                    if !skipped {
                        stack.push(path);
                    }
                } else if path.is_file() {
                    if let Some(rel) = relative_str(&self.root, &path) {
                        if self.matches(&rel) {
                            files.insert(rel);
                        }
                    }
                }
            }
        }

        debug!(root = %self.root.display(), count = files.len(), "collected source files");
        Ok(files)
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}
