//! Core data models for the escrow system
//!
//! This module contains the payment record, its state machine,
//! and the audit notification emitted on every state change.

use crate::error::EscrowError;
use crate::EscrowResult;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-chosen unique key of a payment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Payment state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// No record exists for the task id
    #[default]
    None,
    /// Funds pulled from the client and held in escrow
    Deposited,
    /// Funds released to the agent
    Completed,
    /// Funds returned to the client
    Refunded,
    /// Deadline passed; funds still held until refunded
    Expired,
}

impl PaymentStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    /// Check if this state allows a deposit
    pub fn can_deposit(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Check if this state allows release to the agent
    pub fn can_release(&self) -> bool {
        matches!(self, Self::Deposited)
    }

    /// Check if this state allows refund to the client
    pub fn can_refund(&self) -> bool {
        matches!(self, Self::Deposited | Self::Expired)
    }

    /// Check if this state can be marked expired
    pub fn can_expire(&self) -> bool {
        matches!(self, Self::Deposited)
    }

    /// Validate a state transition
    pub fn validate_transition(&self, to_state: PaymentStatus) -> EscrowResult<()> {
        let valid = matches!(
            (self, to_state),
            (Self::None, Self::Deposited)
                | (Self::Deposited, Self::Completed)
                | (Self::Deposited, Self::Refunded)
                | (Self::Deposited, Self::Expired)
                | (Self::Expired, Self::Refunded)
        );

        if valid {
            Ok(())
        } else {
            Err(EscrowError::state_transition(
                format!("{:?}", self),
                format!("{:?}", to_state),
                "Invalid payment status".to_string(),
            ))
        }
    }
}

/// Escrowed payment for a single task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayment {
    pub task_id: TaskId,
    pub client: Address,
    pub agent: Address,
    pub amount: U256,
    pub deposit_time: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: PaymentStatus,
}

impl TaskPayment {
    /// Create a freshly deposited payment
    pub fn deposited(
        task_id: TaskId,
        client: Address,
        agent: Address,
        amount: U256,
        deposit_time: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            client,
            agent,
            amount,
            deposit_time,
            deadline,
            status: PaymentStatus::Deposited,
        }
    }

    /// Deadline has passed at `now`
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// Deposited and still within its deadline
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Deposited && !self.is_past_deadline(now)
    }

    /// Move to `to_state`, enforcing the state machine
    pub fn transition(&mut self, to_state: PaymentStatus) -> EscrowResult<()> {
        self.status.validate_transition(to_state)?;
        self.status = to_state;
        Ok(())
    }
}

/// Kind of escrow notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEventKind {
    PaymentDeposited,
    PaymentReleased,
    PaymentRefunded,
    PaymentExpired,
    CoordinatorAuthorized,
    CoordinatorRevoked,
    AdminTransferred,
    NonceIncremented,
}

impl EscrowEventKind {
    /// Dotted event name used in published payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentDeposited => "payment.deposited",
            Self::PaymentReleased => "payment.released",
            Self::PaymentRefunded => "payment.refunded",
            Self::PaymentExpired => "payment.expired",
            Self::CoordinatorAuthorized => "coordinator.authorized",
            Self::CoordinatorRevoked => "coordinator.revoked",
            Self::AdminTransferred => "admin.transferred",
            Self::NonceIncremented => "nonce.incremented",
        }
    }
}

/// Escrow event for audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub id: Uuid,
    pub kind: EscrowEventKind,

    // References
    pub task_id: Option<TaskId>,

    // Parties
    pub client: Option<Address>,
    pub agent: Option<Address>,

    // Payment data
    pub amount: Option<U256>,
    pub status: Option<PaymentStatus>,

    // Actor
    pub actor: Address,

    // Metadata
    pub metadata: Option<serde_json::Value>,

    // Timestamp (immutable)
    pub created_at: DateTime<Utc>,
}

impl EscrowEvent {
    /// Create an event describing a payment record after a transition
    pub fn for_payment(
        kind: EscrowEventKind,
        payment: &TaskPayment,
        actor: Address,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            task_id: Some(payment.task_id.clone()),
            client: Some(payment.client),
            agent: Some(payment.agent),
            amount: Some(payment.amount),
            status: Some(payment.status),
            actor,
            metadata: None,
            created_at,
        }
    }

    /// Create an event that is not tied to a payment
    pub fn administrative(
        kind: EscrowEventKind,
        actor: Address,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            task_id: None,
            client: None,
            agent: None,
            amount: None,
            status: None,
            actor,
            metadata: Some(metadata),
            created_at,
        }
    }
}
