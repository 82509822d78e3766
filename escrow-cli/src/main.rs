//! Payment escrow operator CLI
//!
//! Key management, EIP-712 authorization signing and an in-memory
//! end-to-end simulation of the escrow lifecycle.
//!
//! # Usage
//!
//! ```bash
//! escrow-cli keygen
//! escrow-cli sign-transfer --key 0x... --to 0x... --value 100 --valid-before 1700000600
//! escrow-cli recover --digest 0x... --signature 0x...
//! escrow-cli --config escrow.toml simulate
//! ```

use alloy_primitives::{hex, Address, B256, U256};
use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use payment_escrow::{
    authorization::{
        recover_signer, AuthorizationKind, AuthorizationVerifier, CancelAuthorization,
        LocalSigner, TransferAuthorization,
    },
    clock::Clock,
    config::EscrowNodeConfig,
    ledger::Ledger,
    models::TaskId,
    node::EscrowNode,
    payment_escrow::{AuthorizedDepositRequest, DepositRequest},
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "escrow-cli")]
#[command(about = "Operate and exercise the payment escrow")]
#[command(version)]
struct Cli {
    /// Optional TOML configuration file; ESCROW__* variables override it
    #[arg(long, global = true, env = "ESCROW_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new secp256k1 key and print its address
    Keygen,

    /// Print the address controlled by a key
    Address {
        /// Hex-encoded 32-byte secret key
        #[arg(long, env = "ESCROW_SIGNER_KEY")]
        key: String,
    },

    /// Sign a transfer authorization redeemable by any caller
    SignTransfer(SignArgs),

    /// Sign a receive authorization redeemable only by the payee
    SignReceive(SignArgs),

    /// Sign the cancellation of an unused authorization nonce
    SignCancel {
        #[arg(long, env = "ESCROW_SIGNER_KEY")]
        key: String,

        /// Authorizer, when signing for a programmable account
        #[arg(long)]
        authorizer: Option<Address>,

        /// 32-byte authorization nonce
        #[arg(long)]
        nonce: B256,
    },

    /// Recover the plain-key signer of a digest
    Recover {
        #[arg(long)]
        digest: B256,

        /// 65-byte r || s || v signature, hex encoded
        #[arg(long)]
        signature: String,
    },

    /// Run deposit/release and authorized deposit/refund on an in-memory node
    Simulate,
}

#[derive(clap::Args)]
struct SignArgs {
    #[arg(long, env = "ESCROW_SIGNER_KEY")]
    key: String,

    /// Payer, when signing for a programmable account
    #[arg(long)]
    from: Option<Address>,

    /// Payee
    #[arg(long)]
    to: Address,

    /// Amount in base units
    #[arg(long)]
    value: U256,

    /// Unix seconds; the authorization is valid strictly after this
    #[arg(long, default_value_t = 0)]
    valid_after: u64,

    /// Unix seconds; the authorization is valid strictly before this
    #[arg(long)]
    valid_before: u64,

    /// 32-byte nonce; random when omitted
    #[arg(long)]
    nonce: Option<B256>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EscrowNodeConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Keygen => {
            let signer = LocalSigner::random();
            print_json(json!({
                "address": signer.address(),
                "secret_key": signer.secret_hex(),
            }))
        }
        Commands::Address { key } => {
            let signer = parse_signer(&key)?;
            print_json(json!({ "address": signer.address() }))
        }
        Commands::SignTransfer(args) => sign_authorization(&config, args, AuthorizationKind::Transfer),
        Commands::SignReceive(args) => sign_authorization(&config, args, AuthorizationKind::Receive),
        Commands::SignCancel {
            key,
            authorizer,
            nonce,
        } => {
            let signer = parse_signer(&key)?;
            let cancel = CancelAuthorization {
                authorizer: authorizer.unwrap_or_else(|| signer.address()),
                nonce,
            };
            let digest = AuthorizationVerifier::new(config.ledger.domain()).cancel_digest(&cancel);
            let signature = signer.sign_digest(&digest);
            print_json(json!({
                "authorizer": cancel.authorizer,
                "nonce": cancel.nonce,
                "digest": digest,
                "signature": hex::encode_prefixed(signature),
            }))
        }
        Commands::Recover { digest, signature } => {
            let signature = hex::decode(signature.trim()).context("Signature is not valid hex")?;
            let signer = recover_signer(&digest, &signature)?;
            print_json(json!({ "signer": signer }))
        }
        Commands::Simulate => simulate(config).await,
    }
}

fn parse_signer(key: &str) -> Result<LocalSigner> {
    LocalSigner::from_hex(key).context("Invalid secret key")
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn sign_authorization(config: &EscrowNodeConfig, args: SignArgs, kind: AuthorizationKind) -> Result<()> {
    let signer = parse_signer(&args.key)?;
    let authorization = TransferAuthorization {
        from: args.from.unwrap_or_else(|| signer.address()),
        to: args.to,
        value: args.value,
        valid_after: args.valid_after,
        valid_before: args.valid_before,
        nonce: args.nonce.unwrap_or_else(B256::random),
    };
    if authorization.valid_before <= authorization.valid_after {
        anyhow::bail!("valid_before must be greater than valid_after");
    }

    let verifier = AuthorizationVerifier::new(config.ledger.domain());
    let digest = verifier.transfer_digest(&authorization, kind);
    let signature = signer.sign_digest(&digest);

    print_json(json!({
        "kind": kind,
        "domain_separator": verifier.domain_separator(),
        "authorization": {
            "from": authorization.from,
            "to": authorization.to,
            "value": authorization.value.to_string(),
            "valid_after": authorization.valid_after,
            "valid_before": authorization.valid_before,
            "nonce": authorization.nonce,
        },
        "digest": digest,
        "signature": hex::encode_prefixed(signature),
    }))
}

async fn simulate(config: EscrowNodeConfig) -> Result<()> {
    let node = EscrowNode::new(config)?;
    let escrow = node.escrow();
    let ledger = node.ledger();
    let admin = node.config().escrow.admin;

    let coordinator = Address::random();
    let client = LocalSigner::random();
    let agent = Address::random();
    info!(
        "Simulating with coordinator {}, client {}, agent {}",
        coordinator,
        client.address(),
        agent
    );

    escrow.authorize_coordinator(admin, coordinator).await?;
    ledger.mint(client.address(), U256::from(1_000u64)).await?;
    ledger
        .approve(client.address(), escrow.address(), U256::from(100u64))
        .await?;

    // allowance path: deposit then release to the agent
    let allowance_task = TaskId::new("sim-allowance");
    escrow
        .deposit(
            coordinator,
            DepositRequest {
                task_id: allowance_task.clone(),
                client: client.address(),
                agent,
                amount: U256::from(100u64),
                deadline: node.clock().now() + Duration::hours(1),
            },
        )
        .await?;
    escrow.release_payment(coordinator, &allowance_task).await?;

    // authorization path: signed pull then refund to the client
    let authorized_task = TaskId::new("sim-authorization");
    let now = node.clock().unix_seconds();
    let authorization = TransferAuthorization {
        from: client.address(),
        to: escrow.address(),
        value: U256::from(250u64),
        valid_after: now.saturating_sub(1),
        valid_before: now + 600,
        nonce: B256::random(),
    };
    let digest = ledger
        .verifier()
        .transfer_digest(&authorization, AuthorizationKind::Transfer);
    escrow
        .deposit_with_authorization(
            coordinator,
            AuthorizedDepositRequest {
                task_id: authorized_task.clone(),
                client: authorization.from,
                agent,
                amount: authorization.value,
                valid_after: authorization.valid_after,
                valid_before: authorization.valid_before,
                nonce: authorization.nonce,
                signature: client.sign_digest(&digest),
            },
        )
        .await?;
    escrow.refund_payment(coordinator, &authorized_task).await?;

    let health = node.health_check().await?;
    print_json(json!({
        "events": node.events(),
        "balances": {
            "client": ledger.balance_of(client.address()).await?.to_string(),
            "agent": ledger.balance_of(agent).await?.to_string(),
            "escrow": ledger.balance_of(escrow.address()).await?.to_string(),
        },
        "healthy": health.healthy,
    }))
}
