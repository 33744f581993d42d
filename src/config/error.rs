// ABOUTME: Error type for configuration loading, parsing, and validation.
// ABOUTME: Validation failures aggregate every violation, never just the first.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// All violations found in one pass. Warnings are carried for reporting
    /// but never block a load on their own.
    #[error("configuration validation failed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
