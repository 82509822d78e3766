//! Authorization Verifier - Validates signed pull authorizations
//!
//! A payer signs an EIP-712 structured hash of the authorization tuple
//! off-ledger. The domain binds the signature to one ledger deployment
//! (name, version, chain id, ledger address) so it cannot be replayed
//! against another.
//!
//! Two signer kinds are supported:
//! - plain keys, checked by recovering the secp256k1 key from the signature
//! - programmable accounts, which run their own validation predicate and
//!   answer with the [`VALID_SIGNATURE_MAGIC`] sentinel
//!
//! The verifier is stateless. Nonce bookkeeping belongs to the ledger.

use crate::{error::EscrowError, EscrowResult};
use alloy_primitives::{b256, hex, keccak256, Address, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, sync::Arc};
use tracing::debug;

/// ERC-3009 typed messages
pub mod typed {
    use alloy_sol_types::sol;

    sol! {
        struct TransferWithAuthorization {
            address from;
            address to;
            uint256 value;
            uint256 validAfter;
            uint256 validBefore;
            bytes32 nonce;
        }

        struct ReceiveWithAuthorization {
            address from;
            address to;
            uint256 value;
            uint256 validAfter;
            uint256 validBefore;
            bytes32 nonce;
        }

        struct CancelAuthorization {
            address authorizer;
            bytes32 nonce;
        }
    }
}

/// Return value of a programmable account that accepts a signature
pub const VALID_SIGNATURE_MAGIC: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];
/// Return value of a programmable account that rejects a signature
pub const INVALID_SIGNATURE_MAGIC: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// r || s || v
pub const SIGNATURE_LENGTH: usize = 65;

// secp256k1 n / 2; signatures with s above it are malleable twins
const SECP256K1_HALF_ORDER: B256 =
    b256!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Configured signing domain of a ledger deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl SigningDomain {
    pub fn new<S: Into<String>>(
        name: S,
        version: S,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// EIP-712 domain with name, version, chain id and verifying contract
    pub fn eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Owned(self.name.clone())),
            Some(Cow::Owned(self.version.clone())),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    /// Domain separator
    pub fn separator(&self) -> B256 {
        self.eip712().separator()
    }
}

/// Which typed message an authorization is signed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationKind {
    /// Redeemable by anyone holding the signature
    Transfer,
    /// Redeemable only by the payee
    Receive,
}

/// Signed permission to move `value` from `from` to `to` once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    /// Unix seconds; valid strictly after
    pub valid_after: u64,
    /// Unix seconds; valid strictly before
    pub valid_before: u64,
    pub nonce: B256,
}

impl TransferAuthorization {
    pub fn transfer_message(&self) -> typed::TransferWithAuthorization {
        typed::TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.value,
            validAfter: U256::from(self.valid_after),
            validBefore: U256::from(self.valid_before),
            nonce: self.nonce,
        }
    }

    pub fn receive_message(&self) -> typed::ReceiveWithAuthorization {
        typed::ReceiveWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.value,
            validAfter: U256::from(self.valid_after),
            validBefore: U256::from(self.valid_before),
            nonce: self.nonce,
        }
    }

    pub fn struct_hash(&self, kind: AuthorizationKind) -> B256 {
        match kind {
            AuthorizationKind::Transfer => self.transfer_message().eip712_hash_struct(),
            AuthorizationKind::Receive => self.receive_message().eip712_hash_struct(),
        }
    }

    /// EIP-712 signing hash under `domain`
    pub fn digest(&self, domain: &Eip712Domain, kind: AuthorizationKind) -> B256 {
        match kind {
            AuthorizationKind::Transfer => self.transfer_message().eip712_signing_hash(domain),
            AuthorizationKind::Receive => self.receive_message().eip712_signing_hash(domain),
        }
    }

    /// Require `valid_after < now < valid_before`
    pub fn check_window(&self, now: u64) -> EscrowResult<()> {
        if now <= self.valid_after {
            return Err(EscrowError::AuthorizationNotYetValid);
        }
        if now >= self.valid_before {
            return Err(EscrowError::AuthorizationExpired);
        }
        Ok(())
    }
}

/// Signed request to burn an unused nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAuthorization {
    pub authorizer: Address,
    pub nonce: B256,
}

impl CancelAuthorization {
    pub fn message(&self) -> typed::CancelAuthorization {
        typed::CancelAuthorization {
            authorizer: self.authorizer,
            nonce: self.nonce,
        }
    }

    pub fn struct_hash(&self) -> B256 {
        self.message().eip712_hash_struct()
    }

    pub fn digest(&self, domain: &Eip712Domain) -> B256 {
        self.message().eip712_signing_hash(domain)
    }
}

/// Validation logic installed at a programmable account
pub trait SignatureValidator: Send + Sync {
    /// Returns [`VALID_SIGNATURE_MAGIC`] iff `signature` is valid for `hash`.
    /// Must not mutate state.
    fn is_valid_signature(&self, hash: &B256, signature: &[u8]) -> [u8; 4];
}

/// The party a signature is checked against
#[derive(Clone)]
pub enum Signer {
    PlainKey(Address),
    ProgrammableAccount {
        address: Address,
        validator: Arc<dyn SignatureValidator>,
    },
}

impl Signer {
    pub fn address(&self) -> Address {
        match self {
            Self::PlainKey(address) => *address,
            Self::ProgrammableAccount { address, .. } => *address,
        }
    }

    /// Check `signature` over `hash` for this signer
    pub fn verify(&self, hash: &B256, signature: &[u8]) -> bool {
        match self {
            Self::PlainKey(address) => match recover_signer(hash, signature) {
                Ok(recovered) => recovered == *address,
                Err(e) => {
                    debug!("Signature recovery failed for {}: {}", address, e);
                    false
                }
            },
            Self::ProgrammableAccount { validator, .. } => {
                validator.is_valid_signature(hash, signature) == VALID_SIGNATURE_MAGIC
            }
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainKey(address) => f.debug_tuple("PlainKey").field(address).finish(),
            Self::ProgrammableAccount { address, .. } => f
                .debug_struct("ProgrammableAccount")
                .field("address", address)
                .finish_non_exhaustive(),
        }
    }
}

/// Verifies authorizations for a single signing domain
#[derive(Debug, Clone)]
pub struct AuthorizationVerifier {
    domain: SigningDomain,
    eip712: Eip712Domain,
    separator: B256,
}

impl AuthorizationVerifier {
    pub fn new(domain: SigningDomain) -> Self {
        let eip712 = domain.eip712();
        let separator = eip712.separator();
        Self {
            domain,
            eip712,
            separator,
        }
    }

    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    pub fn domain_separator(&self) -> B256 {
        self.separator
    }

    pub fn transfer_digest(&self, auth: &TransferAuthorization, kind: AuthorizationKind) -> B256 {
        auth.digest(&self.eip712, kind)
    }

    pub fn cancel_digest(&self, cancel: &CancelAuthorization) -> B256 {
        cancel.digest(&self.eip712)
    }

    /// Verify that `signer` signed `auth` as `kind`
    pub fn verify_transfer(
        &self,
        signer: &Signer,
        auth: &TransferAuthorization,
        kind: AuthorizationKind,
        signature: &[u8],
    ) -> EscrowResult<()> {
        if signer.address() != auth.from {
            return Err(EscrowError::InvalidSignature);
        }
        let digest = self.transfer_digest(auth, kind);
        debug!("Verifying {:?} authorization digest {}", kind, digest);
        if signer.verify(&digest, signature) {
            Ok(())
        } else {
            Err(EscrowError::InvalidSignature)
        }
    }

    /// Verify that `signer` signed the cancellation
    pub fn verify_cancel(
        &self,
        signer: &Signer,
        cancel: &CancelAuthorization,
        signature: &[u8],
    ) -> EscrowResult<()> {
        if signer.address() != cancel.authorizer {
            return Err(EscrowError::InvalidSignature);
        }
        if signer.verify(&self.cancel_digest(cancel), signature) {
            Ok(())
        } else {
            Err(EscrowError::InvalidSignature)
        }
    }
}

/// Recover the address that produced a 65-byte `r || s || v` signature
pub fn recover_signer(digest: &B256, signature: &[u8]) -> EscrowResult<Address> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(EscrowError::crypto(format!(
            "Signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }

    let (compact, v) = signature.split_at(64);
    if &compact[32..] > SECP256K1_HALF_ORDER.as_slice() {
        return Err(EscrowError::crypto("Signature s value is not canonical"));
    }

    let recovery = match v[0] {
        0 | 27 => 0,
        1 | 28 => 1,
        other => {
            return Err(EscrowError::crypto(format!(
                "Invalid recovery byte {}",
                other
            )))
        }
    };
    let recovery_id =
        RecoveryId::from_i32(recovery).map_err(|e| EscrowError::crypto(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(compact, recovery_id)
        .map_err(|e| EscrowError::crypto(e.to_string()))?;

    let public_key = SECP256K1
        .recover_ecdsa(&Message::from_digest(digest.0), &signature)
        .map_err(|e| EscrowError::crypto(e.to_string()))?;

    Ok(public_key_address(&public_key))
}

/// Last 20 bytes of keccak256 of the uncompressed public key
pub fn public_key_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Address::from_slice(&hash[12..])
}

/// Programmable account that accepts signatures from a single owner key
#[derive(Debug, Clone)]
pub struct OwnerKeyAccount {
    owner: Address,
}

impl OwnerKeyAccount {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }
}

impl SignatureValidator for OwnerKeyAccount {
    fn is_valid_signature(&self, hash: &B256, signature: &[u8]) -> [u8; 4] {
        match recover_signer(hash, signature) {
            Ok(recovered) if recovered == self.owner => VALID_SIGNATURE_MAGIC,
            _ => INVALID_SIGNATURE_MAGIC,
        }
    }
}

/// secp256k1 key that signs authorization digests
pub struct LocalSigner {
    secret: SecretKey,
    address: Address,
}

impl LocalSigner {
    /// Generate a fresh key
    pub fn random() -> Self {
        Self::from_secret(SecretKey::new(&mut secp256k1::rand::thread_rng()))
    }

    pub fn from_bytes(bytes: &[u8]) -> EscrowResult<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|e| EscrowError::crypto(e.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    /// Parse a hex encoded key, with or without 0x
    pub fn from_hex(key: &str) -> EscrowResult<Self> {
        let bytes = hex::decode(key.trim()).map_err(|e| EscrowError::crypto(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let address = public_key_address(&PublicKey::from_secret_key(SECP256K1, &secret));
        Self { secret, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn secret_hex(&self) -> String {
        hex::encode_prefixed(self.secret.secret_bytes())
    }

    /// Sign a digest, returning `r || s || v` with v in {27, 28}
    pub fn sign_digest(&self, digest: &B256) -> Vec<u8> {
        let signature =
            SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(digest.0), &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        let mut out = Vec::with_capacity(SIGNATURE_LENGTH);
        out.extend_from_slice(&compact);
        out.push(27 + recovery_id.to_i32() as u8);
        out
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
