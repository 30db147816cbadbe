//! Error types for the workspace core.
//!
//! One structured error enum covers the whole crate. Handler-timeout is
//! deliberately absent: a slow event subscriber is a logged delivery
//! policy, never an error value, so it cannot stall unrelated views.

use crate::core::addr::Addr;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for workspace operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Address does not resolve to any loaded function
    #[error("invalid address: {0} is not mapped to any function")]
    InvalidAddress(Addr),

    /// Two mutations targeting overlapping structures raced; the later
    /// committer is rejected and the session keeps the earlier result
    #[error("analysis conflict at {addr}: computed against generation {expected}, session is at {found}")]
    AnalysisConflict {
        addr: Addr,
        expected: u64,
        found: u64,
    },

    /// The external analysis engine failed
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// Rename target name is already bound to a different address
    #[error("symbol name already in use: {name} -> {bound_to}")]
    SymbolInUse { name: String, bound_to: Addr },

    /// View handle does not name an open view
    #[error("view not found: {0}")]
    ViewNotFound(Uuid),

    /// Job id does not name a known job
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// A persisted layout was saved against a different binary
    #[error("layout mismatch: saved against {saved}, session has {loaded}")]
    LayoutMismatch { saved: String, loaded: String },

    /// Malformed console or protocol input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

/// Result type alias for workspace operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::InvalidAddress(Addr(0x4000));
        assert_eq!(
            err.to_string(),
            "invalid address: 0x4000 is not mapped to any function"
        );

        let err = SessionError::AnalysisConflict {
            addr: Addr(0x1000),
            expected: 2,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "analysis conflict at 0x1000: computed against generation 2, session is at 3"
        );
    }

    #[test]
    fn test_symbol_in_use_display() {
        let err = SessionError::SymbolInUse {
            name: "main".into(),
            bound_to: Addr(0x2000),
        };
        assert!(err.to_string().contains("main"));
        assert!(err.to_string().contains("0x2000"));
    }

    #[test]
    fn test_json_error_converts() {
        let bad: std::result::Result<u32, serde_json::Error> = serde_json::from_str("notjson");
        let err: SessionError = bad.unwrap_err().into();
        assert!(matches!(err, SessionError::Serialization(_)));
    }
}
