//! Main Escrow Node - High-level API for the escrow system
//!
//! Wires the reference ledger, the payment escrow and the event sinks
//! together from an [`EscrowNodeConfig`].

use crate::{
    clock::{Clock, SystemClock},
    config::EscrowNodeConfig,
    event_publisher::{EventSink, FanoutEventSink, MemoryEventSink, TracingEventSink},
    ledger::{InMemoryLedger, Ledger},
    models::EscrowEvent,
    payment_escrow::PaymentEscrow,
    EscrowResult,
};
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Main escrow node that owns all components
pub struct EscrowNode {
    config: EscrowNodeConfig,
    clock: Arc<dyn Clock>,
    /// Reference ledger holding client and escrow balances
    ledger: Arc<InMemoryLedger>,
    /// Observer copy of every published notification
    events: MemoryEventSink,
    escrow: Arc<PaymentEscrow>,
}

impl EscrowNode {
    /// Create a node on the wall clock
    pub fn new(config: EscrowNodeConfig) -> EscrowResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a node on an injected clock
    pub fn with_clock(config: EscrowNodeConfig, clock: Arc<dyn Clock>) -> EscrowResult<Self> {
        info!("Initializing escrow node with all components");
        config.validate()?;

        let ledger = Arc::new(InMemoryLedger::new(config.ledger.clone(), clock.clone()));
        let events = MemoryEventSink::new();
        let sink: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(vec![
            Arc::new(events.clone()),
            Arc::new(TracingEventSink),
        ]));
        let escrow = Arc::new(PaymentEscrow::new(
            config.escrow.clone(),
            ledger.clone(),
            sink,
            clock.clone(),
        ));

        info!(
            "Escrow node initialized (escrow {}, ledger {} on chain {})",
            config.escrow.address, config.ledger.address, config.ledger.chain_id
        );

        Ok(Self {
            config,
            clock,
            ledger,
            events,
            escrow,
        })
    }

    pub fn config(&self) -> &EscrowNodeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }

    pub fn escrow(&self) -> &Arc<PaymentEscrow> {
        &self.escrow
    }

    /// Snapshot of all escrow notifications published so far
    pub fn events(&self) -> Vec<EscrowEvent> {
        self.events.events()
    }

    /// Health check for the escrow node
    pub async fn health_check(&self) -> EscrowResult<NodeHealth> {
        let mut issues = Vec::new();

        let escrow_balance = match self.ledger.balance_of(self.escrow.address()).await {
            Ok(balance) => balance,
            Err(e) => {
                issues.push(format!("Ledger error: {}", e));
                U256::ZERO
            }
        };

        let held_amount = match self.escrow.held_amount().await {
            Ok(held) => held,
            Err(e) => {
                issues.push(format!("Escrow error: {}", e));
                U256::ZERO
            }
        };

        if escrow_balance < held_amount {
            warn!(
                "Escrow balance {} does not cover held payments {}",
                escrow_balance, held_amount
            );
            issues.push(format!(
                "Escrow balance {} is below held payments {}",
                escrow_balance, held_amount
            ));
        }

        if let Err(e) = self.escrow.admin().await {
            issues.push(format!("Escrow error: {}", e));
        }

        Ok(NodeHealth {
            healthy: issues.is_empty(),
            issues,
            escrow_balance,
            held_amount,
            timestamp: self.clock.now(),
        })
    }
}

/// Node health status
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub escrow_balance: U256,
    pub held_amount: U256,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::{EscrowEventKind, PaymentStatus, TaskId},
        payment_escrow::DepositRequest,
    };
    use alloy_primitives::Address;
    use chrono::Duration;

    #[tokio::test]
    async fn test_node_initialization() {
        let node = EscrowNode::new(EscrowNodeConfig::default()).unwrap();

        let health = node.health_check().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.held_amount, U256::ZERO);
        assert_eq!(node.escrow().admin().await.unwrap(), node.config().escrow.admin);
        assert_eq!(node.ledger().address(), node.config().ledger.address);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EscrowNodeConfig::default();
        config.escrow.address = config.ledger.address;
        assert!(EscrowNode::new(config).is_err());
    }

    #[tokio::test]
    async fn test_payment_lifecycle_through_node() {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let node = EscrowNode::with_clock(EscrowNodeConfig::default(), clock.clone()).unwrap();
        let admin = node.config().escrow.admin;
        let coordinator = Address::repeat_byte(0xc0);
        let client = Address::repeat_byte(0x0c);
        let agent = Address::repeat_byte(0xa9);
        let escrow = node.escrow();

        escrow.authorize_coordinator(admin, coordinator).await.unwrap();
        node.ledger().mint(client, U256::from(500u64)).await.unwrap();
        node.ledger()
            .approve(client, escrow.address(), U256::from(500u64))
            .await
            .unwrap();

        escrow
            .deposit(
                coordinator,
                DepositRequest {
                    task_id: TaskId::new("T1"),
                    client,
                    agent,
                    amount: U256::from(200u64),
                    deadline: clock.now() + Duration::hours(1),
                },
            )
            .await
            .unwrap();

        let health = node.health_check().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.held_amount, U256::from(200u64));
        assert_eq!(health.escrow_balance, U256::from(200u64));

        escrow
            .release_payment(coordinator, &TaskId::new("T1"))
            .await
            .unwrap();
        assert_eq!(
            escrow.payment_status(&TaskId::new("T1")).await.unwrap(),
            PaymentStatus::Completed
        );

        let health = node.health_check().await.unwrap();
        assert_eq!(health.held_amount, U256::ZERO);

        let kinds: Vec<_> = node.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EscrowEventKind::CoordinatorAuthorized,
                EscrowEventKind::PaymentDeposited,
                EscrowEventKind::PaymentReleased,
            ]
        );
    }
}
