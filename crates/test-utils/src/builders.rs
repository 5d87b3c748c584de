#![allow(dead_code)]

use std::path::Path;

use packrun::command::BuildOptions;

/// Builder for `BuildOptions` to simplify test setup.
pub struct BuildOptionsBuilder {
    options: BuildOptions,
}

impl BuildOptionsBuilder {
    pub fn new(source_dir: &Path, working_dir: &Path) -> Self {
        Self {
            options: BuildOptions::new(source_dir, working_dir),
        }
    }

    pub fn file(mut self, rel: &str) -> Self {
        self.options.files.insert(rel.to_string());
        self
    }

    pub fn changes_needed(mut self, val: bool) -> Self {
        self.options.changes_needed = val;
        self
    }

    pub fn invalidate_on_failure(mut self, val: bool) -> Self {
        self.options.invalidate_on_failure = val;
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.options.template = template.to_string();
        self
    }

    pub fn force(mut self) -> Self {
        self.options.force = true;
        self
    }

    pub fn only(mut self, name: &str) -> Self {
        self.options.only.insert(name.to_string());
        self
    }

    pub fn except(mut self, name: &str) -> Self {
        self.options.except.insert(name.to_string());
        self
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.options.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn var_file(mut self, path: &str) -> Self {
        self.options.var_files.push(path.to_string());
        self
    }

    pub fn build(self) -> BuildOptions {
        self.options
    }
}
