//! Error types for the aggregation engine.
//!
//! Errors are classified by how far they propagate:
//! - InvalidInput: malformed date/timezone/offset, unknown client — fail
//!   fast, returned to the caller, no partial computation.
//! - PartialSourceFailure: one pillar's query failed — caught at the fetch
//!   boundary, logged, treated as an empty result. Never reaches callers.
//! - AggregationInconsistency: missing fields, zero divisors — zero-defaulted
//!   inside the reducers. Never constructed as an error at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("timezone offset {0} minutes is outside the valid range (±18h)")]
    InvalidOffset(i32),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    // Store failures on the persist path. Fetch-path store failures are
    // degraded to empty results before they can become an EngineError.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for the InvalidInput class — the only class surfaced to callers
    /// as a user-visible "could not load" failure.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidDate(_)
                | EngineError::InvalidTimezone(_)
                | EngineError::InvalidOffset(_)
                | EngineError::ClientNotFound(_)
        )
    }
}

/// Errors specific to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to encode record payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        assert!(EngineError::InvalidDate("2026-13-40".into()).is_invalid_input());
        assert!(EngineError::InvalidTimezone("Mars/Olympus".into()).is_invalid_input());
        assert!(EngineError::InvalidOffset(20_000).is_invalid_input());
        assert!(EngineError::ClientNotFound("c-1".into()).is_invalid_input());
        assert!(!EngineError::Store(StoreError::HomeDirNotFound).is_invalid_input());
    }
}
