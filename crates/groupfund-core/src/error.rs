use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FundError {
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("obligation {obligation_id} is already settled")]
    AlreadySettled { obligation_id: Uuid },

    #[error("provider transaction {provider_trans_id} already settled another obligation")]
    DuplicateTransaction { provider_trans_id: String },

    #[error("amount mismatch: due {expected}, claimed {claimed}")]
    AmountMismatch { expected: Decimal, claimed: Decimal },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("upstream failure: {0}")]
    Upstream(String),
}

pub type FundResult<T> = Result<T, FundError>;

impl FundError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }
}
