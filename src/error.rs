// ⚠️ Error taxonomy shared by calculator, ledger, store and services
//
// NotFound     - missing route / ship-year / target
// InvalidState - banking action not permitted by the current balance or pool
// Validation   - malformed request shape
// Database / Unexpected - store or transport failure, never shown to callers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ComplianceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ComplianceError::NotFound(what.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        ComplianceError::InvalidState(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        ComplianceError::Validation(reason.into())
    }

    /// Store/transport failures; their detail is logged, not returned.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ComplianceError::Database(_) | ComplianceError::Unexpected(_)
        )
    }
}

impl From<serde_json::Error> for ComplianceError {
    fn from(err: serde_json::Error) -> Self {
        ComplianceError::Unexpected(format!("serialization failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_classification() {
        assert!(!ComplianceError::not_found("ship S1 / 2024").is_internal());
        assert!(!ComplianceError::invalid_state("balance is 0").is_internal());
        assert!(!ComplianceError::validation("shipId is empty").is_internal());
        assert!(ComplianceError::Unexpected("lock poisoned".into()).is_internal());
        assert!(ComplianceError::from(rusqlite::Error::InvalidQuery).is_internal());
    }

    #[test]
    fn test_display_messages() {
        let err = ComplianceError::not_found("route R009");
        assert_eq!(err.to_string(), "not found: route R009");

        let err = ComplianceError::invalid_state("no banked surplus available");
        assert_eq!(err.to_string(), "invalid state: no banked surplus available");
    }
}
