//! Error types for transaction submission.

use thiserror::Error;

use crate::Amount;
use crate::gateway::GatewayError;
use crate::model::{Currency, TransactionResult, TxId};
use crate::store::StoreError;

/// Top-level error returned by [`Engine::submit`](super::Engine::submit).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("processing failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// The result is in history but its notification could not be stored.
    #[error(
        "transaction {id} committed but not announced: {source}",
        id = .result.transaction_id
    )]
    Unannounced {
        result: Box<TransactionResult>,
        source: StoreError,
    },
}

impl EngineError {
    /// The committed result, when the transaction went through despite the
    /// error.
    pub fn committed_result(&self) -> Option<&TransactionResult> {
        match self {
            EngineError::Unannounced { result, .. } => Some(result),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Collaborator(CollaboratorError::Store(e))
    }
}

/// Client-fixable problems with a request. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("approval code must be {expected} digits, got {actual}")]
    ApprovalCodeLengthMismatch { expected: usize, actual: usize },

    #[error("approval code must contain only digits")]
    ApprovalCodeNotNumeric,

    #[error("amount {0} must be positive")]
    InvalidAmount(Amount),

    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),
}

/// A request that validated but cannot be applied to the referenced
/// transaction. Not retried: the outcome would not change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("void target {0} not found")]
    VoidTargetNotFound(TxId),

    #[error("transaction {0} is already voided")]
    AlreadyVoided(TxId),

    #[error("pre-authorization {0} not found")]
    PreAuthNotFound(TxId),

    #[error("pre-authorization {0} has expired")]
    PreAuthExpired(TxId),

    #[error("pre-authorization {0} is already completed")]
    PreAuthAlreadyCompleted(TxId),

    #[error("completion of {pre_auth} for {requested} exceeds held {held}")]
    CompletionExceedsHold {
        pre_auth: TxId,
        held: Amount,
        requested: Amount,
    },

    #[error("completion of {pre_auth} in {requested} does not match held currency {held}")]
    CompletionCurrencyMismatch {
        pre_auth: TxId,
        held: Currency,
        requested: Currency,
    },
}

/// An external collaborator failed. The caller may retry with backoff; the
/// engine makes a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("authorization gateway timed out")]
    GatewayTimeout,

    #[error("authorization gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl From<GatewayError> for CollaboratorError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Timeout => CollaboratorError::GatewayTimeout,
            GatewayError::Unavailable(reason) => CollaboratorError::GatewayUnavailable(reason),
        }
    }
}
