//! Error types for the path engine
//!
//! Structured errors use thiserror; the CLI layer wraps them with anyhow
//! context. Only `ProfileNotFound`, `InvalidInputFile`, `WriteFailure` and
//! `Config` ever abort an operation. `MalformedLogLine` and
//! `ExternalSignalTimeout` are recovered where they occur and only surface in
//! logs and in the `signals` section of an evaluation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// No learner profile to evaluate against
    #[error("Learner profile not found: {}", path.display())]
    ProfileNotFound { path: PathBuf },

    /// A single log line could not be parsed and was skipped
    #[error("Malformed line {line} in {}: {reason}", path.display())]
    MalformedLogLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// An external signal provider did not answer in time
    #[error("Signal provider '{provider}' timed out after {timeout_ms}ms")]
    ExternalSignalTimeout { provider: String, timeout_ms: u64 },

    /// An explicitly requested input file is missing or unparsable
    #[error("Invalid input file {}: {reason}", path.display())]
    InvalidInputFile { path: PathBuf, reason: String },

    /// An append or tracker write failed
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration values are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether the error aborts the current operation
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::MalformedLogLine { .. } | EngineError::ExternalSignalTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ProfileNotFound {
            path: PathBuf::from("/tmp/memory/learner_profile.json"),
        };
        assert_eq!(
            err.to_string(),
            "Learner profile not found: /tmp/memory/learner_profile.json"
        );

        let err = EngineError::ExternalSignalTimeout {
            provider: "git".to_string(),
            timeout_ms: 2000,
        };
        assert!(err.to_string().contains("2000ms"));
    }

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        let skipped = EngineError::MalformedLogLine {
            path: PathBuf::from("progress_log.jsonl"),
            line: 4,
            reason: "expected value".to_string(),
        };
        assert!(!skipped.is_fatal());

        let write = EngineError::WriteFailure {
            path: PathBuf::from("decisions.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(write.is_fatal());
        assert!(EngineError::Config("weights".into()).is_fatal());
    }
}
