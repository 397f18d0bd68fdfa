//! Error types for needlebench.
//!
//! Every failure the benchmark can hit falls in one of four buckets, and each bucket
//! has a fixed recovery:
//!
//! | Bucket                      | Variants                                         | Recovery                      |
//! |-----------------------------|--------------------------------------------------|-------------------------------|
//! | Source unavailable          | `SourceNotFound`, `PermissionDenied`, `Io`       | skip the source, keep going   |
//! | Device unavailable          | `DeviceUnavailable`                              | run without the GPU strategy  |
//! | Measurement fault           | `ExecutionFault`, `Device`, `Released`           | record count 0 plus the error |
//! | Run-level failure           | `InvalidPattern`, `ConfigError`, `ReleaseFailed` | surfaced to the caller        |
//!
//! ```rust,ignore
//! match Harness::new(config) {
//!     Ok(harness) => // run the matrix,
//!     Err(BenchError::InvalidPattern(msg)) => // fix the configuration,
//!     Err(e) => // anything else is fatal at startup
//! }
//! ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for benchmark operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors that can occur while building, running or draining a benchmark
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("Execution fault in {strategy}: {reason}")]
    ExecutionFault { strategy: String, reason: String },
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Strategy {0} has been released")]
    Released(String),
    #[error("Failed to release {}: {}", .failures.len(), .failures.join("; "))]
    ReleaseFailed { failures: Vec<String> },
    #[error("Harness cannot {action} while {state}")]
    InvalidState { action: String, state: String },
    #[error("Malformed report line {line}: {reason}")]
    MalformedReport { line: usize, reason: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl BenchError {
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn execution_fault(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFault {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn released(strategy: impl Into<String>) -> Self {
        Self::Released(strategy.into())
    }

    pub fn invalid_state(action: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.into(),
            state: state.to_string(),
        }
    }

    pub fn malformed_report(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedReport {
            line,
            reason: reason.into(),
        }
    }

    /// Maps an IO error on `path` to the source-unavailable variants
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::source_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// True for errors that mean "this input cannot be read", which the harness skips
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound(_) | Self::PermissionDenied(_) | Self::IoError(_)
        )
    }
}
