//! CLI command handlers.

pub mod ask;
pub mod config;
pub mod index;
pub mod memory;

use chartwise_config::{ChartwiseConfig, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn config(&self) -> &ChartwiseConfig {
        &self.loaded.config
    }
}
