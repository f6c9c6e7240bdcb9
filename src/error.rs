//! Error handling for gstbook
//!
//! Defines the domain error type and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Core error types for consolidation runs
#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("database error: {0}")]
    DbError(String),

    #[error("input format error: {0}")]
    InputFormat(String),

    #[error("taxonomy misconfiguration: {0}")]
    Taxonomy(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("no uploaded files found for project {0}")]
    NoUploads(String),

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("failed to write output workbook: {0}")]
    OutputWrite(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for consolidation operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = ConsolidationError::NoUploads("p-1".to_string());
        assert_eq!(err.to_string(), "no uploaded files found for project p-1");
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("zip header corrupt")).context("failed to open bundle");
        match result {
            Err(e) => {
                assert!(e.to_string().contains("failed to open bundle"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("zip header corrupt"));
            }
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = ConsolidationError::InvalidTransition {
            from: "completed".to_string(),
            to: "processing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid run transition: completed -> processing"
        );
    }
}
