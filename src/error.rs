//! Error kinds shared across the store, version control and query layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminologyError {
    /// Branch, component or reference set member missing.
    #[error("{0} not found")]
    NotFound(String),

    /// Concurrent writer or rebase conflict. Carries the componentIds in
    /// conflict so a merge review can be opened.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        component_ids: Vec<String>,
    },

    /// Unknown acceptability value, inactivation indicator, association name,
    /// malformed ECL or similar caller mistake.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// ECL construct outside the supported subset.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// ISA cycle found during semantic index update. The commit rolls back.
    #[error("cycle detected through concepts {0:?}")]
    CycleDetected(Vec<u64>),

    /// Referential problem in stored data. Large-batch writes drop and warn
    /// instead of raising this; read paths raise it.
    #[error("integrity: {0}")]
    Integrity(String),

    /// Store I/O failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl TerminologyError {
    pub fn conflict(message: impl Into<String>, component_ids: Vec<String>) -> Self {
        TerminologyError::Conflict {
            message: message.into(),
            component_ids,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TerminologyError::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, TerminologyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = TerminologyError::not_found("Branch MAIN/A");
        assert_eq!(err.to_string(), "Branch MAIN/A not found");

        let err = TerminologyError::Unsupported("MemberOf".to_string());
        assert_eq!(err.to_string(), "unsupported: MemberOf");

        let err = TerminologyError::CycleDetected(vec![100, 200]);
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TerminologyError>();
    }
}
