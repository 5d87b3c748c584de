// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PackrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PackrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_tool(&raw)?;
        validate_build(&raw)?;
        let timeout = match raw.tool.timeout.as_deref() {
            Some(s) => Some(parse_duration(s).map_err(|e| {
                PackrunError::ConfigError(format!("[tool].timeout: {e}"))
            })?),
            None => None,
        };
        Ok(ConfigFile::new_unchecked(raw.tool, raw.build, timeout))
    }
}

fn validate_tool(cfg: &RawConfigFile) -> Result<()> {
    if cfg.tool.program.trim().is_empty() {
        return Err(PackrunError::ConfigError(
            "[tool].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_build(cfg: &RawConfigFile) -> Result<()> {
    let build = &cfg.build;
    if build.source_dir.as_os_str().is_empty() {
        return Err(PackrunError::ConfigError(
            "[build].source_dir must not be empty".to_string(),
        ));
    }
    if build.template.trim().is_empty() {
        return Err(PackrunError::ConfigError(
            "[build].template must not be empty".to_string(),
        ));
    }
    if build.include.is_empty() {
        return Err(PackrunError::ConfigError(
            "[build].include needs at least one pattern".to_string(),
        ));
    }
    if let Some(name) = build.only.iter().find(|n| build.except.contains(n)) {
        return Err(PackrunError::ConfigError(format!(
            "build '{name}' is listed in both [build].only and [build].except"
        )));
    }
    Ok(())
}

/// Parse `"500ms"`, `"10s"`, `"30m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration too large: '{s}'"))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
