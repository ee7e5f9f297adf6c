//! Configuration system for chartwise.
//!
//! Provides TOML-based configuration with:
//! - Two model tiers (`[models.fast]`, `[models.advanced]`)
//! - Embedding, index, agent, tool, summary and logging sections
//! - Config file layering (user config dir + project-local overrides)
//! - API key resolution (named env var → backend default env var → config file)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, data_dir, load_config, load_config_file, load_config_with_options,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
