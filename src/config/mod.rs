// src/config/mod.rs

//! `Packrun.toml` loading and validation.
//!
//! - `model.rs`: serde data model and defaults.
//! - `validate.rs`: `TryFrom<RawConfigFile> for ConfigFile`.
//! - `loader.rs`: reading from disk.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, ConfigFile, RawConfigFile, ToolSection};
pub use validate::parse_duration;
