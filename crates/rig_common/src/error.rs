//! Error types for rig.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RigError {
    #[error("Candidate tool list inadequate: {0}")]
    Validation(String),

    #[error("Unknown relationship kind: {0}")]
    InvalidRelationshipKind(String),

    #[error("Relationship endpoint does not exist: {kind} {name}")]
    DanglingReference { kind: &'static str, name: String },

    #[error("Recommendation oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Knowledge backend error: {0}")]
    KnowledgeBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RigError {
    /// Whether this error may abort a whole resolution run.
    ///
    /// Only an unreachable oracle on the very first stack request is fatal;
    /// everything else degrades into a retry, a fallback or a report entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RigError::OracleUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RigError>;
