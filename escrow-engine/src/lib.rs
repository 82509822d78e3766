//! Payment escrow for agent task marketplaces
//!
//! This crate implements a coordinator-driven escrow over a fungible-token
//! ledger:
//! - A per-task payment state machine with deadlines and refunds
//! - EIP-712 signed transfer authorizations (ERC-3009 style) with
//!   plain-key and programmable-account signers
//! - An in-memory reference ledger with allowances and authorization nonces
//! - Audit notifications for every state change

pub mod authorization;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_publisher;
pub mod ledger;
pub mod models;
pub mod node;
pub mod payment_escrow;

use error::EscrowError;

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
