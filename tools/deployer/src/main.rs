use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use growstreams_deployer::{
    config::Cli, keyring::Signer, logging, orchestrator::Orchestrator, runtime,
};
use tracing::{info, warn};

const UNIT: u128 = 1_000_000_000_000;
const LOW_BALANCE: u128 = 10 * UNIT;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = logging::init_tracing(cli.log_json) {
        eprintln!("failed initialising logging: {err:#}");
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when a required step failed.
async fn run(cli: Cli) -> Result<bool> {
    let (mode, config) = cli.into_config()?;
    let keyring = Arc::new(config.keyring()?);

    let runtime = runtime::connect(&config.node)
        .await
        .with_context(|| format!("failed connecting to {}", config.node))?;
    let chain = runtime.chain_name().await.context("failed reading chain name")?;
    info!(node = %config.node, chain = %chain, account = %keyring.account(), ?mode, "connected");

    let balance = runtime
        .free_balance(keyring.account())
        .await
        .context("failed reading deployer balance")?;
    println!("Account: {}", keyring.account());
    println!("Balance: {} VARA", format_units(balance));
    if balance < LOW_BALANCE {
        warn!(balance = %balance, "deployer balance is low; uploads may fail");
    }

    let orchestrator = Orchestrator::new(config, runtime, keyring);
    let report = orchestrator
        .run(mode)
        .await
        .context("deployment state store")?;
    report.print_summary();
    Ok(report.is_success())
}

fn format_units(amount: u128) -> String {
    format!("{}.{:04}", amount / UNIT, (amount % UNIT) / (UNIT / 10_000))
}
