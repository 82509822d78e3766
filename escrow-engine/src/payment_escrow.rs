//! Payment Escrow - Coordinates the payment lifecycle
//!
//! Holds one [`TaskPayment`] per task id and moves it through
//! `None -> Deposited -> {Completed | Refunded | Expired -> Refunded}`.
//! Funds move through the [`Ledger`] in full, exactly once in and at most
//! once out per task.
//!
//! Every state-mutating call runs as one unit under a process-wide busy
//! flag. The flag is set on entry and cleared when the call returns, fails or
//! is dropped. A call that finds it set, such as a ledger or account calling
//! back into the escrow from any task, is refused with
//! [`EscrowError::Reentrancy`] instead of waiting. Reads made while a call is
//! in flight are refused the same way.
//!
//! The record is committed and its event published in the same poll that
//! observes the ledger's success, so a dropped call either has no effect or
//! has both.

use crate::{
    authorization::TransferAuthorization,
    clock::Clock,
    coordinator::{ensure_admin, CoordinatorSet},
    error::EscrowError,
    event_publisher::EventSink,
    ledger::Ledger,
    models::{EscrowEvent, EscrowEventKind, PaymentStatus, TaskId, TaskPayment},
    EscrowResult,
};
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Configuration for the payment escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentEscrowConfig {
    /// The escrow's own ledger account
    pub address: Address,
    /// Initial administrator
    pub admin: Address,
}

impl Default for PaymentEscrowConfig {
    fn default() -> Self {
        Self {
            address: Address::repeat_byte(0xe5),
            admin: Address::repeat_byte(0xad),
        }
    }
}

/// Deposit request using a pre-approved allowance
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub task_id: TaskId,
    pub client: Address,
    pub agent: Address,
    pub amount: U256,
    pub deadline: DateTime<Utc>,
}

/// Deposit request using a signed transfer authorization
#[derive(Debug, Clone)]
pub struct AuthorizedDepositRequest {
    pub task_id: TaskId,
    pub client: Address,
    pub agent: Address,
    pub amount: U256,
    pub valid_after: u64,
    /// Also becomes the payment deadline
    pub valid_before: u64,
    pub nonce: B256,
    pub signature: Vec<u8>,
}

struct EscrowState {
    admin: Address,
    coordinators: CoordinatorSet,
    payments: HashMap<TaskId, TaskPayment>,
    sequential_nonces: HashMap<Address, u64>,
}

impl EscrowState {
    fn payment(&self, task_id: &TaskId) -> EscrowResult<&TaskPayment> {
        self.payments
            .get(task_id)
            .ok_or_else(|| EscrowError::PaymentNotFound(task_id.clone()))
    }
}

/// Escrow service owning the payment table, coordinator set and counters
pub struct PaymentEscrow {
    config: PaymentEscrowConfig,
    ledger: Arc<dyn Ledger>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    /// Set while a state-mutating call is in flight
    busy: AtomicBool,
    state: Mutex<EscrowState>,
}

/// Exclusive access for one state-mutating call
struct EscrowCall<'a> {
    // drops before `_busy`, so the flag clears only once the state is released
    state: MutexGuard<'a, EscrowState>,
    _busy: BusyFlag<'a>,
}

impl Deref for EscrowCall<'_> {
    type Target = EscrowState;

    fn deref(&self) -> &EscrowState {
        &self.state
    }
}

impl DerefMut for EscrowCall<'_> {
    fn deref_mut(&mut self) -> &mut EscrowState {
        &mut self.state
    }
}

struct BusyFlag<'a>(&'a AtomicBool);

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PaymentEscrow {
    /// Create a new payment escrow
    pub fn new(
        config: PaymentEscrowConfig,
        ledger: Arc<dyn Ledger>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Initializing payment escrow at {} (admin {})",
            config.address, config.admin
        );
        let state = EscrowState {
            admin: config.admin,
            coordinators: CoordinatorSet::new(),
            payments: HashMap::new(),
            sequential_nonces: HashMap::new(),
        };
        Self {
            config,
            ledger,
            events,
            clock,
            busy: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// The escrow's own ledger account
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Pull `amount` from the client's allowance and open the payment
    pub async fn deposit(&self, caller: Address, request: DepositRequest) -> EscrowResult<TaskPayment> {
        info!("Depositing payment for task: {}", request.task_id);

        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let now = self.clock.now();
        validate_deposit(
            &state,
            &request.task_id,
            request.client,
            request.agent,
            request.amount,
            request.deadline,
            now,
        )?;

        self.ledger
            .pull_with_allowance(
                self.config.address,
                request.client,
                self.config.address,
                request.amount,
            )
            .await?;

        let payment = TaskPayment::deposited(
            request.task_id,
            request.client,
            request.agent,
            request.amount,
            now,
            request.deadline,
        );
        state
            .payments
            .insert(payment.task_id.clone(), payment.clone());

        self.publish(EscrowEventKind::PaymentDeposited, &payment, caller, None);

        info!(
            "Deposited {} for task {} (client {}, agent {})",
            payment.amount, payment.task_id, payment.client, payment.agent
        );
        Ok(payment)
    }

    /// Pull `amount` with the client's signed authorization and open the payment
    pub async fn deposit_with_authorization(
        &self,
        caller: Address,
        request: AuthorizedDepositRequest,
    ) -> EscrowResult<TaskPayment> {
        info!(
            "Depositing payment with authorization for task: {}",
            request.task_id
        );

        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let now = self.clock.now();
        let deadline = i64::try_from(request.valid_before)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                EscrowError::validation(format!(
                    "valid_before {} is out of range",
                    request.valid_before
                ))
            })?;
        validate_deposit(
            &state,
            &request.task_id,
            request.client,
            request.agent,
            request.amount,
            deadline,
            now,
        )?;

        let authorization = TransferAuthorization {
            from: request.client,
            to: self.config.address,
            value: request.amount,
            valid_after: request.valid_after,
            valid_before: request.valid_before,
            nonce: request.nonce,
        };
        self.ledger
            .pull_with_authorization(&authorization, &request.signature)
            .await?;

        let payment = TaskPayment::deposited(
            request.task_id,
            request.client,
            request.agent,
            request.amount,
            now,
            deadline,
        );
        state
            .payments
            .insert(payment.task_id.clone(), payment.clone());

        self.publish(
            EscrowEventKind::PaymentDeposited,
            &payment,
            caller,
            Some(serde_json::json!({ "authorization_nonce": request.nonce })),
        );

        info!(
            "Deposited {} for task {} via authorization {}",
            payment.amount, payment.task_id, request.nonce
        );
        Ok(payment)
    }

    /// Pay the agent in full; only before the deadline
    pub async fn release_payment(&self, caller: Address, task_id: &TaskId) -> EscrowResult<TaskPayment> {
        info!("Releasing payment for task: {}", task_id);

        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let mut payment = state.payment(task_id)?.clone();
        payment.status.validate_transition(PaymentStatus::Completed)?;
        if payment.is_past_deadline(self.clock.now()) {
            warn!("Release rejected for task {}: deadline passed", task_id);
            return Err(EscrowError::DeadlinePassed(task_id.clone()));
        }

        payment.transition(PaymentStatus::Completed)?;
        self.ledger
            .push_transfer(self.config.address, payment.agent, payment.amount)
            .await?;
        state.payments.insert(task_id.clone(), payment.clone());

        self.publish(EscrowEventKind::PaymentReleased, &payment, caller, None);

        info!(
            "Released {} for task {} to agent {}",
            payment.amount, task_id, payment.agent
        );
        Ok(payment)
    }

    /// Return the funds to the client from a deposited or expired payment
    pub async fn refund_payment(&self, caller: Address, task_id: &TaskId) -> EscrowResult<TaskPayment> {
        info!("Refunding payment for task: {}", task_id);

        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let mut payment = state.payment(task_id)?.clone();
        payment.transition(PaymentStatus::Refunded)?;
        self.ledger
            .push_transfer(self.config.address, payment.client, payment.amount)
            .await?;
        state.payments.insert(task_id.clone(), payment.clone());

        self.publish(EscrowEventKind::PaymentRefunded, &payment, caller, None);

        info!(
            "Refunded {} for task {} to client {}",
            payment.amount, task_id, payment.client
        );
        Ok(payment)
    }

    /// Record that a deposited payment outlived its deadline; callable by anyone
    pub async fn mark_expired(&self, caller: Address, task_id: &TaskId) -> EscrowResult<TaskPayment> {
        let mut state = self.enter()?;

        let mut payment = state.payment(task_id)?.clone();
        payment.status.validate_transition(PaymentStatus::Expired)?;
        if !payment.is_past_deadline(self.clock.now()) {
            return Err(EscrowError::DeadlineNotReached(task_id.clone()));
        }

        payment.transition(PaymentStatus::Expired)?;
        state.payments.insert(task_id.clone(), payment.clone());

        self.publish(EscrowEventKind::PaymentExpired, &payment, caller, None);

        info!("Marked task {} expired", task_id);
        Ok(payment)
    }

    /// Refund a deposited payment whose deadline has passed, skipping `Expired`
    pub async fn auto_refund_expired(
        &self,
        caller: Address,
        task_id: &TaskId,
    ) -> EscrowResult<TaskPayment> {
        info!("Auto-refunding expired payment for task: {}", task_id);

        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let mut payment = state.payment(task_id)?.clone();
        if payment.status != PaymentStatus::Deposited {
            return Err(EscrowError::state_transition(
                format!("{:?}", payment.status),
                format!("{:?}", PaymentStatus::Refunded),
                "Only deposited payments can be auto-refunded".to_string(),
            ));
        }
        if !payment.is_past_deadline(self.clock.now()) {
            return Err(EscrowError::DeadlineNotReached(task_id.clone()));
        }

        payment.transition(PaymentStatus::Refunded)?;
        self.ledger
            .push_transfer(self.config.address, payment.client, payment.amount)
            .await?;
        state.payments.insert(task_id.clone(), payment.clone());

        self.publish(
            EscrowEventKind::PaymentRefunded,
            &payment,
            caller,
            Some(serde_json::json!({ "reason": "expired" })),
        );

        info!(
            "Auto-refunded {} for expired task {} to client {}",
            payment.amount, task_id, payment.client
        );
        Ok(payment)
    }

    /// Consume the client's current sequential nonce, returning it
    pub async fn increment_nonce(&self, caller: Address, client: Address) -> EscrowResult<u64> {
        let mut state = self.enter()?;
        state.coordinators.ensure_authorized(caller)?;

        let current = state.sequential_nonces.get(&client).copied().unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or_else(|| EscrowError::internal("Sequential nonce overflow"))?;
        state.sequential_nonces.insert(client, next);

        self.publish_admin(
            EscrowEventKind::NonceIncremented,
            caller,
            serde_json::json!({ "client": client, "nonce": current }),
        );

        Ok(current)
    }

    pub async fn authorize_coordinator(&self, caller: Address, coordinator: Address) -> EscrowResult<()> {
        let mut state = self.enter()?;
        ensure_admin(caller, state.admin)?;
        state.coordinators.authorize(coordinator)?;

        self.publish_admin(
            EscrowEventKind::CoordinatorAuthorized,
            caller,
            serde_json::json!({ "coordinator": coordinator }),
        );

        info!("Authorized coordinator {}", coordinator);
        Ok(())
    }

    pub async fn revoke_coordinator(&self, caller: Address, coordinator: Address) -> EscrowResult<()> {
        let mut state = self.enter()?;
        ensure_admin(caller, state.admin)?;
        state.coordinators.revoke(coordinator);

        self.publish_admin(
            EscrowEventKind::CoordinatorRevoked,
            caller,
            serde_json::json!({ "coordinator": coordinator }),
        );

        info!("Revoked coordinator {}", coordinator);
        Ok(())
    }

    /// Hand the administrator role to `new_admin`
    pub async fn transfer_admin(&self, caller: Address, new_admin: Address) -> EscrowResult<()> {
        let mut state = self.enter()?;
        ensure_admin(caller, state.admin)?;
        if new_admin == Address::ZERO {
            return Err(EscrowError::validation("Administrator cannot be the zero address"));
        }
        state.admin = new_admin;

        self.publish_admin(
            EscrowEventKind::AdminTransferred,
            caller,
            serde_json::json!({ "previous": caller, "admin": new_admin }),
        );

        info!("Transferred administrator role from {} to {}", caller, new_admin);
        Ok(())
    }

    /// Full record, if the task id was ever deposited
    pub async fn get_payment(&self, task_id: &TaskId) -> EscrowResult<Option<TaskPayment>> {
        Ok(self.read()?.payments.get(task_id).cloned())
    }

    /// Status of a task id; `None` when no record exists
    pub async fn payment_status(&self, task_id: &TaskId) -> EscrowResult<PaymentStatus> {
        Ok(self
            .get_payment(task_id)
            .await?
            .map(|payment| payment.status)
            .unwrap_or_default())
    }

    /// Deposited and not past its deadline
    pub async fn is_payment_active(&self, task_id: &TaskId) -> EscrowResult<bool> {
        let now = self.clock.now();
        Ok(self
            .get_payment(task_id)
            .await?
            .map(|payment| payment.is_active(now))
            .unwrap_or(false))
    }

    /// Next sequential nonce for `client`
    pub async fn nonce(&self, client: Address) -> EscrowResult<u64> {
        Ok(self
            .read()?
            .sequential_nonces
            .get(&client)
            .copied()
            .unwrap_or(0))
    }

    pub async fn is_coordinator(&self, address: Address) -> EscrowResult<bool> {
        Ok(self.read()?.coordinators.is_authorized(address))
    }

    pub async fn coordinators(&self) -> EscrowResult<Vec<Address>> {
        Ok(self.read()?.coordinators.authorized())
    }

    /// Sum held for deposited and expired payments
    pub async fn held_amount(&self) -> EscrowResult<U256> {
        let state = self.read()?;
        Ok(state
            .payments
            .values()
            .filter(|payment| payment.status.can_refund())
            .fold(U256::ZERO, |held, payment| held.saturating_add(payment.amount)))
    }

    pub async fn admin(&self) -> EscrowResult<Address> {
        Ok(self.read()?.admin)
    }

    /// Whether a state-mutating call is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the busy flag and the state for one state-mutating call
    fn enter(&self) -> EscrowResult<EscrowCall<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected escrow call while another call is in flight");
            return Err(EscrowError::Reentrancy);
        }
        let busy = BusyFlag(&self.busy);
        // a concurrent read may hold the state briefly
        let state = self.state.try_lock().map_err(|_| {
            warn!("Rejected escrow call while the state is being read");
            EscrowError::Reentrancy
        })?;
        Ok(EscrowCall {
            state,
            _busy: busy,
        })
    }

    /// State for a read; refused while a call is in flight
    fn read(&self) -> EscrowResult<MutexGuard<'_, EscrowState>> {
        if self.is_busy() {
            warn!("Rejected escrow read while a call is in flight");
            return Err(EscrowError::Reentrancy);
        }
        self.state.try_lock().map_err(|_| {
            warn!("Rejected escrow read while a call is in flight");
            EscrowError::Reentrancy
        })
    }

    fn publish(
        &self,
        kind: EscrowEventKind,
        payment: &TaskPayment,
        actor: Address,
        metadata: Option<serde_json::Value>,
    ) {
        let mut event = EscrowEvent::for_payment(kind, payment, actor, self.clock.now());
        event.metadata = metadata;
        self.events.publish(event);
    }

    fn publish_admin(&self, kind: EscrowEventKind, actor: Address, metadata: serde_json::Value) {
        let event = EscrowEvent::administrative(kind, actor, metadata, self.clock.now());
        self.events.publish(event);
    }
}

fn validate_deposit(
    state: &EscrowState,
    task_id: &TaskId,
    client: Address,
    agent: Address,
    amount: U256,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> EscrowResult<()> {
    if state.payments.contains_key(task_id) {
        return Err(EscrowError::PaymentExists(task_id.clone()));
    }

    if task_id.as_str().is_empty() {
        return Err(EscrowError::validation("Task id cannot be empty"));
    }

    if client == Address::ZERO {
        return Err(EscrowError::validation("Client cannot be the zero address"));
    }

    if agent == Address::ZERO {
        return Err(EscrowError::validation("Agent cannot be the zero address"));
    }

    if amount.is_zero() {
        return Err(EscrowError::validation("Amount must be greater than 0"));
    }

    if deadline <= now {
        return Err(EscrowError::InvalidDeadline(format!(
            "deadline {} is not after {}",
            deadline, now
        )));
    }

    Ok(())
}
