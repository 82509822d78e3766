//! Node configuration
//!
//! Sources are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `ESCROW__<SECTION>__<KEY>` environment variables.
//! A file that is named explicitly must exist.

use crate::{error::EscrowError, ledger::LedgerConfig, payment_escrow::PaymentEscrowConfig, EscrowResult};
use alloy_primitives::Address;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

const ENV_PREFIX: &str = "ESCROW";
const ENV_SEPARATOR: &str = "__";

/// Configuration for the escrow node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowNodeConfig {
    /// Escrow service configuration
    pub escrow: PaymentEscrowConfig,
    /// Ledger and EIP-712 domain configuration
    pub ledger: LedgerConfig,
}

impl EscrowNodeConfig {
    /// Load from an optional TOML file and the environment
    ///
    /// Fails when `path` is given but the file cannot be read.
    pub fn load(path: Option<&str>) -> EscrowResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path);
            builder = builder.add_source(File::with_name(path).required(true));
        }
        let config: Self = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml_str(document: &str) -> EscrowResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EscrowResult<()> {
        if self.escrow.address == Address::ZERO {
            return Err(EscrowError::config("escrow.address cannot be the zero address"));
        }
        if self.escrow.admin == Address::ZERO {
            return Err(EscrowError::config("escrow.admin cannot be the zero address"));
        }
        if self.ledger.address == Address::ZERO {
            return Err(EscrowError::config("ledger.address cannot be the zero address"));
        }
        if self.escrow.address == self.ledger.address {
            return Err(EscrowError::config(
                "escrow.address and ledger.address must differ",
            ));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use alloy_primitives::address;

    #[test]
    fn test_defaults_are_valid() {
        let config = EscrowNodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger.chain_id, 31337);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EscrowNodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, EscrowNodeConfig::default());
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let err = EscrowNodeConfig::load(Some("/nonexistent/escrow.toml")).unwrap_err();
        assert!(matches!(err, EscrowError::Config(_)));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = EscrowNodeConfig::from_toml_str(
            r#"
            [escrow]
            admin = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"

            [ledger]
            name = "USD Coin"
            version = "2"
            chain_id = 1
            "#,
        )
        .unwrap();

        assert_eq!(
            config.escrow.admin,
            address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf")
        );
        assert_eq!(config.escrow.address, PaymentEscrowConfig::default().address);
        assert_eq!(config.ledger.name, "USD Coin");
        assert_eq!(config.ledger.chain_id, 1);
        assert_eq!(config.ledger.address, LedgerConfig::default().address);
    }

    #[test]
    fn test_zero_admin_rejected() {
        let err = EscrowNodeConfig::from_toml_str(
            r#"
            [escrow]
            admin = "0x0000000000000000000000000000000000000000"
            "#,
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_malformed_address_rejected() {
        let err = EscrowNodeConfig::from_toml_str(
            r#"
            [ledger]
            address = "not-an-address"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, EscrowError::Config(_)));
    }
}
