//! Ledger - Balance-and-allowance token consumed by the escrow
//!
//! The escrow only talks to the ledger through the [`Ledger`] trait: push
//! from its own balance, pull with a prior allowance, or pull with a signed
//! authorization. [`InMemoryLedger`] is a complete reference implementation
//! used for embedding, simulation and tests.

use crate::{
    authorization::{
        AuthorizationKind, AuthorizationVerifier, CancelAuthorization, SigningDomain,
        SignatureValidator, Signer, TransferAuthorization,
    },
    clock::Clock,
    error::EscrowError,
    EscrowResult,
};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Funds-movement primitives the escrow relies on
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Credit `to` with `amount` taken from `sender`'s own balance
    async fn push_transfer(&self, sender: Address, to: Address, amount: U256) -> EscrowResult<()>;

    /// Debit `from` using the allowance it granted `spender`, credit `to`
    async fn pull_with_allowance(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EscrowResult<()>;

    /// Verify a signed transfer authorization, consume its nonce and move the funds
    async fn pull_with_authorization(
        &self,
        authorization: &TransferAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()>;

    async fn balance_of(&self, account: Address) -> EscrowResult<U256>;
}

/// Configuration for the reference ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// EIP-712 domain name
    pub name: String,
    /// EIP-712 domain version
    pub version: String,
    /// Network identifier bound into every signature
    pub chain_id: u64,
    /// Ledger address, the EIP-712 verifying contract
    pub address: Address,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: "Escrow Dollar".to_string(),
            version: "1".to_string(),
            chain_id: 31337, // local development chain
            address: Address::repeat_byte(0x11),
        }
    }
}

impl LedgerConfig {
    pub fn domain(&self) -> SigningDomain {
        SigningDomain::new(
            self.name.clone(),
            self.version.clone(),
            self.chain_id,
            self.address,
        )
    }
}

/// Ledger audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
    AuthorizationUsed {
        authorizer: Address,
        nonce: B256,
    },
    AuthorizationCanceled {
        authorizer: Address,
        nonce: B256,
    },
}

/// Balance changes computed ahead of any mutation
struct TransferPlan {
    from: Address,
    to: Address,
    amount: U256,
    from_balance: U256,
    to_balance: U256,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
    consumed_nonces: HashSet<(Address, B256)>,
    accounts: HashMap<Address, Arc<dyn SignatureValidator>>,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn signer_for(&self, address: Address) -> Signer {
        match self.accounts.get(&address) {
            Some(validator) => Signer::ProgrammableAccount {
                address,
                validator: validator.clone(),
            },
            None => Signer::PlainKey(address),
        }
    }

    fn ensure_unused(&self, authorizer: Address, nonce: B256) -> EscrowResult<()> {
        if self.consumed_nonces.contains(&(authorizer, nonce)) {
            warn!("Authorization {} already used by {}", nonce, authorizer);
            return Err(EscrowError::AuthorizationUsed { authorizer, nonce });
        }
        Ok(())
    }

    fn plan_transfer(&self, from: Address, to: Address, amount: U256) -> EscrowResult<TransferPlan> {
        if to == Address::ZERO {
            return Err(EscrowError::validation("Transfer to the zero address"));
        }

        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(EscrowError::InsufficientBalance(format!(
                "{} holds {}, needs {}",
                from, from_balance, amount
            )));
        }

        let to_balance = if from == to {
            from_balance
        } else {
            self.balance(to)
                .checked_add(amount)
                .ok_or_else(|| EscrowError::ledger("Balance overflow"))?
        };

        Ok(TransferPlan {
            from,
            to,
            amount,
            from_balance: from_balance - amount,
            to_balance,
        })
    }

    fn apply_transfer(&mut self, plan: TransferPlan) {
        if plan.from != plan.to {
            self.balances.insert(plan.from, plan.from_balance);
            self.balances.insert(plan.to, plan.to_balance);
        }
        self.events.push(LedgerEvent::Transfer {
            from: plan.from,
            to: plan.to,
            value: plan.amount,
        });
    }

    fn consume_nonce(&mut self, authorizer: Address, nonce: B256) {
        self.consumed_nonces.insert((authorizer, nonce));
        self.events
            .push(LedgerEvent::AuthorizationUsed { authorizer, nonce });
    }
}

/// In-memory balance-and-allowance token with signed authorizations
pub struct InMemoryLedger {
    config: LedgerConfig,
    verifier: AuthorizationVerifier,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Create a new empty ledger
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            "Initializing ledger {} v{} on chain {} at {}",
            config.name, config.version, config.chain_id, config.address
        );
        let verifier = AuthorizationVerifier::new(config.domain());
        Self {
            config,
            verifier,
            clock,
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn verifier(&self) -> &AuthorizationVerifier {
        &self.verifier
    }

    pub fn domain(&self) -> &SigningDomain {
        self.verifier.domain()
    }

    /// Install programmable-account validation logic at `address`
    pub async fn register_account(&self, address: Address, validator: Arc<dyn SignatureValidator>) {
        info!("Registering programmable account {}", address);
        self.state.write().await.accounts.insert(address, validator);
    }

    /// Create new units for `to`
    pub async fn mint(&self, to: Address, amount: U256) -> EscrowResult<()> {
        if to == Address::ZERO {
            return Err(EscrowError::validation("Mint to the zero address"));
        }

        let mut state = self.state.write().await;
        let total_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| EscrowError::ledger("Total supply overflow"))?;
        let balance = state
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| EscrowError::ledger("Balance overflow"))?;

        state.total_supply = total_supply;
        state.balances.insert(to, balance);
        state.events.push(LedgerEvent::Transfer {
            from: Address::ZERO,
            to,
            value: amount,
        });

        debug!("Minted {} to {}", amount, to);
        Ok(())
    }

    pub async fn total_supply(&self) -> U256 {
        self.state.read().await.total_supply
    }

    pub async fn approve(&self, owner: Address, spender: Address, amount: U256) -> EscrowResult<()> {
        if spender == Address::ZERO {
            return Err(EscrowError::validation("Approve to the zero address"));
        }

        let mut state = self.state.write().await;
        state.allowances.insert((owner, spender), amount);
        state.events.push(LedgerEvent::Approval {
            owner,
            spender,
            value: amount,
        });
        Ok(())
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.state.read().await.allowance(owner, spender)
    }

    pub async fn transfer(&self, sender: Address, to: Address, amount: U256) -> EscrowResult<()> {
        let mut state = self.state.write().await;
        let plan = state.plan_transfer(sender, to, amount)?;
        state.apply_transfer(plan);
        Ok(())
    }

    pub async fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EscrowResult<()> {
        let mut state = self.state.write().await;

        let allowance = state.allowance(from, spender);
        if allowance < amount {
            return Err(EscrowError::InsufficientAllowance(format!(
                "{} allowed {} to spend {}, needs {}",
                from, spender, allowance, amount
            )));
        }

        let plan = state.plan_transfer(from, to, amount)?;
        // an unlimited allowance is never drawn down
        if allowance != U256::MAX {
            state.allowances.insert((from, spender), allowance - amount);
        }
        state.apply_transfer(plan);
        Ok(())
    }

    /// Execute a transfer signed by `authorization.from`
    pub async fn transfer_with_authorization(
        &self,
        authorization: &TransferAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()> {
        self.redeem(authorization, AuthorizationKind::Transfer, signature)
            .await
    }

    /// Execute a transfer signed by `authorization.from`; only the payee may submit it
    pub async fn receive_with_authorization(
        &self,
        caller: Address,
        authorization: &TransferAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()> {
        if caller != authorization.to {
            return Err(EscrowError::unauthorized(caller, "the payee"));
        }
        self.redeem(authorization, AuthorizationKind::Receive, signature)
            .await
    }

    /// Burn an unused nonce so its authorization can never be redeemed
    pub async fn cancel_authorization(
        &self,
        cancel: &CancelAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()> {
        let mut state = self.state.write().await;
        state.ensure_unused(cancel.authorizer, cancel.nonce)?;

        let signer = state.signer_for(cancel.authorizer);
        self.verifier.verify_cancel(&signer, cancel, signature)?;

        state
            .consumed_nonces
            .insert((cancel.authorizer, cancel.nonce));
        state.events.push(LedgerEvent::AuthorizationCanceled {
            authorizer: cancel.authorizer,
            nonce: cancel.nonce,
        });

        info!(
            "Canceled authorization {} for {}",
            cancel.nonce, cancel.authorizer
        );
        Ok(())
    }

    /// Whether (authorizer, nonce) has been used or canceled
    pub async fn authorization_state(&self, authorizer: Address, nonce: B256) -> bool {
        self.state
            .read()
            .await
            .consumed_nonces
            .contains(&(authorizer, nonce))
    }

    /// Snapshot of the ledger's audit log
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().await.events.clone()
    }

    async fn redeem(
        &self,
        authorization: &TransferAuthorization,
        kind: AuthorizationKind,
        signature: &[u8],
    ) -> EscrowResult<()> {
        let mut state = self.state.write().await;

        authorization.check_window(self.clock.unix_seconds())?;
        state.ensure_unused(authorization.from, authorization.nonce)?;

        let signer = state.signer_for(authorization.from);
        self.verifier
            .verify_transfer(&signer, authorization, kind, signature)?;

        // every check happens before the nonce is burned
        let plan = state.plan_transfer(authorization.from, authorization.to, authorization.value)?;

        state.consume_nonce(authorization.from, authorization.nonce);
        state.apply_transfer(plan);

        info!(
            "Redeemed {:?} authorization {} from {} to {} for {}",
            kind,
            authorization.nonce,
            authorization.from,
            authorization.to,
            authorization.value
        );
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn push_transfer(&self, sender: Address, to: Address, amount: U256) -> EscrowResult<()> {
        self.transfer(sender, to, amount).await
    }

    async fn pull_with_allowance(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EscrowResult<()> {
        self.transfer_from(spender, from, to, amount).await
    }

    async fn pull_with_authorization(
        &self,
        authorization: &TransferAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()> {
        self.transfer_with_authorization(authorization, signature)
            .await
    }

    async fn balance_of(&self, account: Address) -> EscrowResult<U256> {
        Ok(self.state.read().await.balance(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{LocalSigner, OwnerKeyAccount};
    use crate::clock::ManualClock;
    use crate::error::ErrorCategory;

    const NOW: i64 = 1_700_000_000;

    fn ledger() -> (InMemoryLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix(NOW));
        (InMemoryLedger::new(LedgerConfig::default(), clock.clone()), clock)
    }

    fn authorization(from: Address, to: Address, value: u64, nonce: u8) -> TransferAuthorization {
        TransferAuthorization {
            from,
            to,
            value: U256::from(value),
            valid_after: NOW as u64 - 60,
            valid_before: NOW as u64 + 600,
            nonce: B256::repeat_byte(nonce),
        }
    }

    fn sign(
        ledger: &InMemoryLedger,
        signer: &LocalSigner,
        auth: &TransferAuthorization,
        kind: AuthorizationKind,
    ) -> Vec<u8> {
        signer.sign_digest(&ledger.verifier().transfer_digest(auth, kind))
    }

    async fn balance(ledger: &InMemoryLedger, account: Address) -> U256 {
        ledger.balance_of(account).await.unwrap()
    }

    #[tokio::test]
    async fn test_mint_and_transfer() {
        let (ledger, _) = ledger();
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);

        ledger.mint(alice, U256::from(500u64)).await.unwrap();
        ledger.transfer(alice, bob, U256::from(200u64)).await.unwrap();

        assert_eq!(balance(&ledger, alice).await, U256::from(300u64));
        assert_eq!(balance(&ledger, bob).await, U256::from(200u64));
        assert_eq!(ledger.total_supply().await, U256::from(500u64));

        let err = ledger
            .transfer(bob, alice, U256::from(201u64))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientBalance(_)));
        assert!(ledger
            .transfer(alice, Address::ZERO, U256::from(1u64))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_self_transfer_keeps_balance() {
        let (ledger, _) = ledger();
        let alice = Address::repeat_byte(0xa1);
        ledger.mint(alice, U256::from(10u64)).await.unwrap();
        ledger.transfer(alice, alice, U256::from(10u64)).await.unwrap();
        assert_eq!(balance(&ledger, alice).await, U256::from(10u64));
    }

    #[tokio::test]
    async fn test_transfer_from_consumes_allowance() {
        let (ledger, _) = ledger();
        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);

        ledger.mint(owner, U256::from(100u64)).await.unwrap();
        let err = ledger
            .transfer_from(spender, owner, spender, U256::from(10u64))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientAllowance(_)));

        ledger.approve(owner, spender, U256::from(60u64)).await.unwrap();
        ledger
            .transfer_from(spender, owner, spender, U256::from(40u64))
            .await
            .unwrap();
        assert_eq!(ledger.allowance(owner, spender).await, U256::from(20u64));
        assert_eq!(balance(&ledger, spender).await, U256::from(40u64));

        ledger.approve(owner, spender, U256::MAX).await.unwrap();
        ledger
            .transfer_from(spender, owner, spender, U256::from(60u64))
            .await
            .unwrap();
        assert_eq!(ledger.allowance(owner, spender).await, U256::MAX);
    }

    #[tokio::test]
    async fn test_failed_pull_keeps_allowance() {
        let (ledger, _) = ledger();
        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);

        ledger.approve(owner, spender, U256::from(60u64)).await.unwrap();
        let err = ledger
            .transfer_from(spender, owner, spender, U256::from(40u64))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Ledger);
        assert_eq!(ledger.allowance(owner, spender).await, U256::from(60u64));
    }

    #[tokio::test]
    async fn test_authorization_redeemed_once() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        let payee = Address::repeat_byte(0xee);
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let auth = authorization(payer.address(), payee, 30, 1);
        let signature = sign(&ledger, &payer, &auth, AuthorizationKind::Transfer);

        ledger
            .transfer_with_authorization(&auth, &signature)
            .await
            .unwrap();
        assert!(ledger.authorization_state(payer.address(), auth.nonce).await);
        assert_eq!(balance(&ledger, payee).await, U256::from(30u64));

        let err = ledger
            .transfer_with_authorization(&auth, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AuthorizationUsed { .. }));
        assert_eq!(balance(&ledger, payee).await, U256::from(30u64));

        let events = ledger.events().await;
        assert!(events.contains(&LedgerEvent::AuthorizationUsed {
            authorizer: payer.address(),
            nonce: auth.nonce
        }));
    }

    #[tokio::test]
    async fn test_reused_nonce_rejected_for_any_amount() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let first = authorization(payer.address(), Address::repeat_byte(0xee), 10, 7);
        let signature = sign(&ledger, &payer, &first, AuthorizationKind::Transfer);
        ledger
            .transfer_with_authorization(&first, &signature)
            .await
            .unwrap();

        let second = authorization(payer.address(), Address::repeat_byte(0xdd), 20, 7);
        let signature = sign(&ledger, &payer, &second, AuthorizationKind::Transfer);
        let err = ledger
            .transfer_with_authorization(&second, &signature)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Signature);
    }

    #[tokio::test]
    async fn test_window_enforced() {
        let (ledger, clock) = ledger();
        let payer = LocalSigner::random();
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let mut auth = authorization(payer.address(), Address::repeat_byte(0xee), 10, 2);
        auth.valid_after = NOW as u64 + 30;
        let signature = sign(&ledger, &payer, &auth, AuthorizationKind::Transfer);

        let err = ledger
            .transfer_with_authorization(&auth, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AuthorizationNotYetValid));

        clock.advance(chrono::Duration::seconds(31));
        ledger
            .transfer_with_authorization(&auth, &signature)
            .await
            .unwrap();

        let late = authorization(payer.address(), Address::repeat_byte(0xee), 10, 3);
        let signature = sign(&ledger, &payer, &late, AuthorizationKind::Transfer);
        clock.advance(chrono::Duration::seconds(600));
        let err = ledger
            .transfer_with_authorization(&late, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AuthorizationExpired));
        assert!(!ledger.authorization_state(payer.address(), late.nonce).await);
    }

    #[tokio::test]
    async fn test_failures_leave_nonce_and_balances() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        let payee = Address::repeat_byte(0xee);
        ledger.mint(payer.address(), U256::from(10u64)).await.unwrap();

        // signed by someone else
        let auth = authorization(payer.address(), payee, 5, 4);
        let forged = sign(&ledger, &LocalSigner::random(), &auth, AuthorizationKind::Transfer);
        let err = ledger
            .transfer_with_authorization(&auth, &forged)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidSignature));

        // validly signed but unfunded
        let too_much = authorization(payer.address(), payee, 50, 5);
        let signature = sign(&ledger, &payer, &too_much, AuthorizationKind::Transfer);
        let err = ledger
            .transfer_with_authorization(&too_much, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientBalance(_)));

        assert!(!ledger.authorization_state(payer.address(), auth.nonce).await);
        assert!(!ledger.authorization_state(payer.address(), too_much.nonce).await);
        assert_eq!(balance(&ledger, payer.address()).await, U256::from(10u64));
        assert_eq!(balance(&ledger, payee).await, U256::ZERO);
    }

    #[tokio::test]
    async fn test_tampered_amount_rejected() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let auth = authorization(payer.address(), Address::repeat_byte(0xee), 10, 6);
        let signature = sign(&ledger, &payer, &auth, AuthorizationKind::Transfer);
        let tampered = TransferAuthorization {
            value: U256::from(90u64),
            ..auth
        };
        assert!(ledger
            .transfer_with_authorization(&tampered, &signature)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_receive_requires_payee() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        let payee = Address::repeat_byte(0xee);
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let auth = authorization(payer.address(), payee, 10, 8);
        let signature = sign(&ledger, &payer, &auth, AuthorizationKind::Receive);

        let err = ledger
            .receive_with_authorization(Address::repeat_byte(0x66), &auth, &signature)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);

        // a receive signature cannot be replayed as a transfer
        assert!(ledger
            .transfer_with_authorization(&auth, &signature)
            .await
            .is_err());

        ledger
            .receive_with_authorization(payee, &auth, &signature)
            .await
            .unwrap();
        assert_eq!(balance(&ledger, payee).await, U256::from(10u64));
    }

    #[tokio::test]
    async fn test_cancel_blocks_redemption() {
        let (ledger, _) = ledger();
        let payer = LocalSigner::random();
        ledger.mint(payer.address(), U256::from(100u64)).await.unwrap();

        let auth = authorization(payer.address(), Address::repeat_byte(0xee), 10, 9);
        let transfer_signature = sign(&ledger, &payer, &auth, AuthorizationKind::Transfer);

        let cancel = CancelAuthorization {
            authorizer: payer.address(),
            nonce: auth.nonce,
        };
        let cancel_signature = payer.sign_digest(&ledger.verifier().cancel_digest(&cancel));

        let forged = LocalSigner::random().sign_digest(&ledger.verifier().cancel_digest(&cancel));
        assert!(ledger.cancel_authorization(&cancel, &forged).await.is_err());

        ledger
            .cancel_authorization(&cancel, &cancel_signature)
            .await
            .unwrap();
        assert!(ledger.authorization_state(payer.address(), auth.nonce).await);

        let err = ledger
            .transfer_with_authorization(&auth, &transfer_signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AuthorizationUsed { .. }));

        let err = ledger
            .cancel_authorization(&cancel, &cancel_signature)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AuthorizationUsed { .. }));
    }

    #[tokio::test]
    async fn test_programmable_account_authorization() {
        let (ledger, _) = ledger();
        let owner = LocalSigner::random();
        let wallet = Address::repeat_byte(0x5a);
        ledger
            .register_account(wallet, Arc::new(OwnerKeyAccount::new(owner.address())))
            .await;
        ledger.mint(wallet, U256::from(100u64)).await.unwrap();

        let auth = authorization(wallet, Address::repeat_byte(0xee), 25, 10);
        let digest = ledger
            .verifier()
            .transfer_digest(&auth, AuthorizationKind::Transfer);

        let stranger = LocalSigner::random().sign_digest(&digest);
        assert!(matches!(
            ledger
                .transfer_with_authorization(&auth, &stranger)
                .await
                .unwrap_err(),
            EscrowError::InvalidSignature
        ));

        ledger
            .transfer_with_authorization(&auth, &owner.sign_digest(&digest))
            .await
            .unwrap();
        assert_eq!(balance(&ledger, wallet).await, U256::from(75u64));
    }
}
