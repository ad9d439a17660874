//! Fee-vault withdrawal tool.
//!
//! Drains accumulated trading fees from the program's fee-vault PDA into
//! the authority wallet, leaving the rent-exempt minimum behind. With no
//! argument it withdraws everything above the rent floor; pass a lamport
//! amount to withdraw less.
//!
//! Usage:
//!   cargo run --bin withdraw                # drain everything above rent
//!   cargo run --bin withdraw -- 250000000   # withdraw 0.25 SOL
//!
//! Reads the same configuration as the agent (augurd.toml or environment).

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signer::Signer;

use augurd::chain::gateway::{ChainOps, SolanaGateway};
use augurd::config::Config;
use augurd::program::pda;

/// Lamports above the rent floor, `None` when nothing can be taken.
fn withdrawable(balance: u64, rent_floor: u64) -> Option<u64> {
    let amount = balance.saturating_sub(rent_floor);
    if amount == 0 {
        None
    } else {
        Some(amount)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = match Config::load(std::path::Path::new("augurd.toml")) {
        Ok(c) => c,
        Err(_) => Config::from_env(),
    };

    let requested = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>().context("amount must be a lamport count"))
        .transpose()?;

    let program_id = config.solana.program_id()?;
    let keypair = Arc::new(config.solana.keypair()?);
    let rpc = Arc::new(RpcClient::new_with_commitment(
        config.solana.rpc_url.clone(),
        CommitmentConfig::confirmed(),
    ));

    let (fee_vault, _) = pda::fee_vault_pda(&program_id);
    println!("Authority: {}", keypair.pubkey());
    println!("Fee vault: {}", fee_vault);

    let balance = rpc.get_balance(&fee_vault).await?;
    let rent_floor = rpc.get_minimum_balance_for_rent_exemption(0).await?;
    println!(
        "Balance:   {} lamports ({} rent-exempt minimum)",
        balance, rent_floor
    );

    let Some(available) = withdrawable(balance, rent_floor) else {
        println!("Nothing to withdraw (balance is at or below the rent minimum).");
        return Ok(());
    };

    let amount = match requested {
        Some(req) if req > available => {
            bail!(
                "requested {} lamports but only {} are withdrawable",
                req,
                available
            )
        }
        Some(req) => req,
        None => available,
    };

    print!("Withdraw {} lamports to the authority? [y/N]: ", amount);
    io::stdout().flush()?;
    let mut confirm = String::new();
    io::stdin().read_line(&mut confirm)?;
    if !confirm.trim().eq_ignore_ascii_case("y") {
        println!("Aborted.");
        return Ok(());
    }

    let gateway = SolanaGateway::new(
        rpc,
        keypair,
        program_id,
        config.solana.revision.revision(),
    );
    let signature = gateway.withdraw_fees(amount).await?;

    println!("Withdrew {} lamports.", amount);
    println!("Signature: {}", signature);
    Ok(())
}
