// src/config/mod.rs

//! Configuration loading and validation for loadbatch.
//!
//! - TOML-backed data model (`model.rs`).
//! - Loading a config file from disk (`loader.rs`).
//! - Validation into an [`EngineConfig`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{EngineConfig, EngineSection, MonitorSection, RawEngineConfig, ToolConfig, ToolSection};
pub use validate::parse_duration;
