//! Error types for tally-core.

/// Errors produced by pricing rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    /// Payment amount is negative or too large.
    #[error("invalid payment amount: {0}")]
    InvalidAmount(i64),

    /// The table's unit size is not positive.
    #[error("invalid pricing rate")]
    InvalidRate,

    /// Unrecognised renewal policy name.
    #[error("unknown renewal policy: {0}")]
    UnknownPolicy(String),
}
