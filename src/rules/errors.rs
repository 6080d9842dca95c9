use thiserror::Error;

use crate::ports::kv::StorageError;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule '{rule_id}': required field '{field}' missing from event data")]
    MissingField { rule_id: String, field: String },

    #[error("Rule '{rule_id}': invalid condition on field '{field}': {reason}")]
    InvalidCondition {
        rule_id: String,
        field: String,
        reason: String,
    },

    #[error("Rule '{0}' not found")]
    RuleNotFound(String),

    #[error("Failed to parse rules document: {0}")]
    ParseError(String),

    #[error("Rules persistence error: {0}")]
    ProviderError(#[from] StorageError),
}
