// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::command::build::DEFAULT_TEMPLATE;
use crate::exec::launcher::{DEFAULT_TOOL_PROGRAM, MACHINE_READABLE_FLAG};
use crate::exec::ToolCommand;
use crate::fileset::DEFAULT_INCLUDE;

/// `Packrun.toml` as read from disk, before validation.
///
/// ```toml
/// [tool]
/// program = "packer"
/// timeout = "30m"
///
/// [build]
/// source_dir = "packer"
/// working_dir = "target/packer"
/// exclude = ["**/*.md"]
///
/// [build.vars]
/// version = "1.0"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tool: ToolSection,

    pub build: BuildSection,
}

/// `[tool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    /// Executable of the build tool.
    #[serde(default = "default_program")]
    pub program: String,

    /// Flags placed before the command name.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,

    /// Overall budget of one run, e.g. `"30m"`. No limit when absent.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_program() -> String {
    DEFAULT_TOOL_PROGRAM.to_string()
}

fn default_flags() -> Vec<String> {
    vec![MACHINE_READABLE_FLAG.to_string()]
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            flags: default_flags(),
            timeout: None,
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    pub source_dir: PathBuf,

    /// Where the tool runs. Defaults to `source_dir` (no copying).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Skip the run when no tracked file changed.
    #[serde(default = "default_true")]
    pub changes_needed: bool,

    /// Forget the manifest when the tool fails, so the next run retries.
    #[serde(default = "default_true")]
    pub invalidate_on_failure: bool,

    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub only: Vec<String>,

    #[serde(default)]
    pub except: Vec<String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    #[serde(default)]
    pub var_files: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec![DEFAULT_INCLUDE.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

impl BuildSection {
    pub fn effective_working_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(&self.source_dir)
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tool: ToolSection,
    pub build: BuildSection,
    timeout: Option<Duration>,
}

impl ConfigFile {
    /// Callers are expected to go through `TryFrom<RawConfigFile>`.
    pub(crate) fn new_unchecked(
        tool: ToolSection,
        build: BuildSection,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            tool,
            build,
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn tool_command(&self) -> ToolCommand {
        ToolCommand::new(&self.tool.program, &self.tool.flags)
    }

    /// Resolve relative directories against `root` (the config file's
    /// directory).
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.build.source_dir.is_relative() {
            self.build.source_dir = root.join(&self.build.source_dir);
        }
        if let Some(dir) = self.build.working_dir.take() {
            self.build.working_dir = Some(if dir.is_relative() { root.join(dir) } else { dir });
        }
        self
    }
}
