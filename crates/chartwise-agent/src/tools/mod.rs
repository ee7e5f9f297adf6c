//! Built-in tools for the dialogue model:
//! - Web search for general medical information
//! - ClinicalTrials.gov study search

mod trials;
mod web;

// Web tools
pub use web::{SearchProvider, SearchResult, WebSearchConfig, WebSearchTool};

// Trials tool
pub use trials::{ClinicalTrialsTool, TRIAL_STATUSES};
