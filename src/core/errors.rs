/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

// Re-export FrameError from memory module
pub use crate::memory::FrameError;

/// Configuration errors
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(
        code(config::invalid_value),
        help("Environment overrides must be unsigned integers.")
    )]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(config::invalid),
        help("Check buffer, bucket and CPU counts and the physical memory range.")
    )]
    Invalid(String),

    #[error("Failed to read config file {path}: {source}")]
    #[diagnostic(
        code(config::io),
        help("KERNEL_CONFIG must name a readable JSON file.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    #[diagnostic(code(config::parse), help("The config file must be valid JSON."))]
    Parse(#[from] serde_json::Error),
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Frame error: {0}")]
    #[diagnostic(transparent)]
    Frame(#[from] FrameError),

    #[error("Config error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}
