//! One error union for the whole engine.
//!
//! Domain failures carry enough structured context (current status, attempted
//! edge, computed overflow) for the caller to build a precise message without
//! re-querying state. Infrastructure failures are separate variants so the
//! boundary can tell "your request was invalid" from "the system is
//! unavailable".

use crate::tier::Tier;
use crate::types::Money;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed on `{field}`: {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("{entity} {id} is {status}, operation requires {required}")]
    InvalidStatus {
        entity: &'static str,
        id: String,
        status: &'static str,
        required: &'static str,
    },

    #[error("estimated value {value} is outside the {tier:?} range")]
    TierMismatch { tier: Tier, value: Money },

    #[error("vendor {id} is not active")]
    VendorInactive { id: String },

    #[error("payment of {amount} would exceed contract value {contract_value} by {excess}")]
    PaymentExceeded {
        amount: Money,
        contract_value: Money,
        excess: Money,
    },

    #[error("contract {id} still has {outstanding} payment(s) pending or processing")]
    PendingPayments { id: String, outstanding: usize },

    // Defensive: a pending request should always hold exactly one pending step.
    #[error("request {id} has no pending approval step")]
    NoPendingStep { id: String },

    #[error("storage failure")]
    Storage(#[from] sled::Error),

    #[error("row encoding failed")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),

    #[error("row decoding failed")]
    Decode(#[from] minicbor::decode::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn bad_edge(
        entity: &'static str,
        id: impl Into<String>,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Error::InvalidStatusTransition {
            entity,
            id: id.into(),
            from,
            to,
        }
    }

    pub fn bad_status(
        entity: &'static str,
        id: impl Into<String>,
        status: &'static str,
        required: &'static str,
    ) -> Self {
        Error::InvalidStatus {
            entity,
            id: id.into(),
            status,
            required,
        }
    }

    /// True for domain failures, false for infrastructure ones.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Error::Storage(_) | Error::Encode(_) | Error::Decode(_)
        )
    }
}

impl From<sled::transaction::TransactionError<Error>> for Error {
    fn from(e: sled::transaction::TransactionError<Error>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}
