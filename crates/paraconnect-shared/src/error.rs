use thiserror::Error;

/// Errors raised by the pure domain rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Action not permitted: {0}")]
    NotPermitted(String),

    #[error("Workspace locked: {0}")]
    Locked(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("Payout amount cannot be negative")]
    Negative,

    #[error("Payout amount {amount} exceeds remaining balance {remaining}")]
    ExceedsRemaining { amount: i64, remaining: i64 },
}
