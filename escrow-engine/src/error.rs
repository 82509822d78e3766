//! Error types for the escrow system
//!
//! Every failure is reported synchronously as the outcome of the call and
//! aborts the whole operation. Nothing here is retried internally.

use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::models::TaskId;

/// Coarse classification of an [`EscrowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller lacks coordinator or administrator privilege
    Authorization,
    /// Record is not in the state the operation requires
    State,
    /// Malformed input (null party, zero amount, bad encoding)
    Validation,
    /// Deadline or validity window violated
    Temporal,
    /// Signature mismatch or consumed nonce
    Signature,
    /// The funds movement itself failed
    Ledger,
    /// Nested call into an in-flight operation
    Reentrancy,
    /// Configuration and internal failures
    Internal,
}

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Caller is not allowed to perform the operation
    #[error("Unauthorized: {caller} is not {role}")]
    Unauthorized { caller: Address, role: String },

    /// A payment record already exists for the task
    #[error("Payment already exists for task {0}")]
    PaymentExists(TaskId),

    /// No payment record exists for the task
    #[error("Payment not found for task {0}")]
    PaymentNotFound(TaskId),

    /// State machine transition errors
    #[error("Invalid state transition: {from_state} -> {to_state}: {reason}")]
    StateTransition {
        from_state: String,
        to_state: String,
        reason: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment deadline has passed
    #[error("Deadline passed for task {0}")]
    DeadlinePassed(TaskId),

    /// Payment deadline has not been reached yet
    #[error("Deadline not reached for task {0}")]
    DeadlineNotReached(TaskId),

    /// Requested deadline is not in the future
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    /// Authorization window has not opened yet
    #[error("Authorization is not yet valid")]
    AuthorizationNotYetValid,

    /// Authorization window has closed
    #[error("Authorization is expired")]
    AuthorizationExpired,

    /// (authorizer, nonce) pair was already used or canceled
    #[error("Authorization {nonce} already used or canceled for {authorizer}")]
    AuthorizationUsed { authorizer: Address, nonce: B256 },

    /// Signature does not validate for the claimed signer
    #[error("Invalid signature")]
    InvalidSignature,

    /// Cryptographic errors
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Balance too low for the transfer
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Allowance too low for the pull
    #[error("Insufficient allowance: {0}")]
    InsufficientAllowance(String),

    /// Other ledger failures
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Nested call while another state-mutating operation is in flight
    #[error("Re-entrant call rejected")]
    Reentrancy,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Create an unauthorized-caller error
    pub fn unauthorized<S: Into<String>>(caller: Address, role: S) -> Self {
        Self::Unauthorized {
            caller,
            role: role.into(),
        }
    }

    /// Create a state transition error
    pub fn state_transition<S: Into<String>>(from_state: S, to_state: S, reason: S) -> Self {
        Self::StateTransition {
            from_state: from_state.into(),
            to_state: to_state.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a cryptographic error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a ledger error
    pub fn ledger<S: Into<String>>(msg: S) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Authorization,
            Self::PaymentExists(_) | Self::PaymentNotFound(_) | Self::StateTransition { .. } => {
                ErrorCategory::State
            }
            Self::Validation(_) => ErrorCategory::Validation,
            Self::DeadlinePassed(_)
            | Self::DeadlineNotReached(_)
            | Self::InvalidDeadline(_)
            | Self::AuthorizationNotYetValid
            | Self::AuthorizationExpired => ErrorCategory::Temporal,
            Self::AuthorizationUsed { .. } | Self::InvalidSignature | Self::Crypto(_) => {
                ErrorCategory::Signature
            }
            Self::InsufficientBalance(_) | Self::InsufficientAllowance(_) | Self::Ledger(_) => {
                ErrorCategory::Ledger
            }
            Self::Reentrancy => ErrorCategory::Reentrancy,
            Self::Config(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<config::ConfigError> for EscrowError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let task = TaskId::new("T1");
        assert_eq!(
            EscrowError::unauthorized(Address::ZERO, "coordinator").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            EscrowError::PaymentExists(task.clone()).category(),
            ErrorCategory::State
        );
        assert_eq!(
            EscrowError::DeadlinePassed(task).category(),
            ErrorCategory::Temporal
        );
        assert_eq!(
            EscrowError::AuthorizationUsed {
                authorizer: Address::ZERO,
                nonce: B256::ZERO
            }
            .category(),
            ErrorCategory::Signature
        );
        assert_eq!(
            EscrowError::InsufficientAllowance("x".into()).category(),
            ErrorCategory::Ledger
        );
    }

    #[test]
    fn test_state_transition_message() {
        let err = EscrowError::state_transition("Completed", "Refunded", "already settled");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: Completed -> Refunded: already settled"
        );
    }
}
