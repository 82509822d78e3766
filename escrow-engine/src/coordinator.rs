//! Coordinator access control
//!
//! Coordinators drive every escrow transition except `mark_expired`. The set
//! is written only by the single administrator, whose privilege is a plain
//! comparison against the currently configured admin address.

use crate::{error::EscrowError, EscrowResult};
use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::warn;

/// Fail unless `caller` is the current administrator
pub fn ensure_admin(caller: Address, admin: Address) -> EscrowResult<()> {
    if caller != admin {
        warn!("Rejected administrator call from {}", caller);
        return Err(EscrowError::unauthorized(caller, "the administrator"));
    }
    Ok(())
}

/// Address -> authorized flag
#[derive(Debug, Clone, Default)]
pub struct CoordinatorSet {
    coordinators: HashMap<Address, bool>,
}

impl CoordinatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authorized(&self, address: Address) -> bool {
        self.coordinators.get(&address).copied().unwrap_or(false)
    }

    /// Fail unless `caller` is an authorized coordinator
    pub fn ensure_authorized(&self, caller: Address) -> EscrowResult<()> {
        if !self.is_authorized(caller) {
            warn!("Rejected coordinator call from {}", caller);
            return Err(EscrowError::unauthorized(caller, "an authorized coordinator"));
        }
        Ok(())
    }

    pub fn authorize(&mut self, coordinator: Address) -> EscrowResult<()> {
        if coordinator == Address::ZERO {
            return Err(EscrowError::validation("Coordinator cannot be the zero address"));
        }
        self.coordinators.insert(coordinator, true);
        Ok(())
    }

    pub fn revoke(&mut self, coordinator: Address) {
        self.coordinators.insert(coordinator, false);
    }

    /// Currently authorized coordinators
    pub fn authorized(&self) -> Vec<Address> {
        let mut authorized: Vec<Address> = self
            .coordinators
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(address, _)| *address)
            .collect();
        authorized.sort();
        authorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_admin_check_is_pure() {
        let admin = Address::repeat_byte(0xad);
        assert!(ensure_admin(admin, admin).is_ok());

        let err = ensure_admin(Address::repeat_byte(0x01), admin).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);
    }

    #[test]
    fn test_authorize_and_revoke() {
        let mut set = CoordinatorSet::new();
        let coordinator = Address::repeat_byte(0xc0);

        assert!(set.ensure_authorized(coordinator).is_err());
        set.authorize(coordinator).unwrap();
        assert!(set.ensure_authorized(coordinator).is_ok());
        assert_eq!(set.authorized(), vec![coordinator]);

        set.revoke(coordinator);
        assert!(!set.is_authorized(coordinator));
        assert!(set.authorized().is_empty());
    }

    #[test]
    fn test_zero_address_rejected() {
        let mut set = CoordinatorSet::new();
        assert!(set.authorize(Address::ZERO).is_err());
        assert!(!set.is_authorized(Address::ZERO));
    }
}
