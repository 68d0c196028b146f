//! Staking simulator
//!
//! Deploys the protocol on a fresh ledger, runs a deposit, stake, lending
//! round and profit cycle for a set of stakers and prints the resulting
//! state as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use liquid_staking::{Genesis, LoanOutcome, LoanRequest, Op, Protocol, TreasuryTotals};
use messaging_actors::{LedgerAudit, LedgerStats};
use serde::Serialize;
use staking_config::{init_tracing, StakingConfig};
use std::path::PathBuf;
use tracing::info;
use types::{Address, Coins, Tokens};

#[derive(Parser)]
#[command(name = "staking-sim")]
#[command(about = "Run a liquid staking cycle on a simulated ledger")]
struct Cli {
    /// Base configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay under `environments/`
    #[arg(short, long)]
    env: Option<String>,

    /// Number of stakers
    #[arg(long, default_value_t = 3)]
    stakers: usize,

    /// Whole coins each staker deposits
    #[arg(long, default_value_t = 10)]
    deposit: u64,

    /// Round profit reported by the elector, in whole coins
    #[arg(long, default_value_t = 2)]
    profit: u64,
}

#[derive(Serialize)]
struct WalletReport {
    owner: String,
    tokens: Tokens,
    unstaking: Tokens,
    pending: Coins,
}

#[derive(Serialize)]
struct Report {
    totals: TreasuryTotals,
    treasury_balance: Coins,
    rounds_imbalance: u8,
    wallets: Vec<WalletReport>,
    ledger: LedgerStats,
    audit: LedgerAudit,
}

fn load(cli: &Cli) -> Result<StakingConfig> {
    match &cli.config {
        Some(path) => StakingConfig::load(Some(path), cli.env.as_deref()),
        None => Ok(StakingConfig::default()),
    }
}

async fn run(cli: Cli, config: StakingConfig) -> Result<Report> {
    let protocol = Protocol::bootstrap(&config, Genesis::default()).await?;
    let fees = *protocol.fees();

    let mut stakers = Vec::with_capacity(cli.stakers);
    for i in 0..cli.stakers {
        let name = format!("staker-{}", i);
        stakers.push((name.clone(), protocol.open_account(&name, Coins::whole(1_000)).await?));
    }

    let deposit = Coins::whole(cli.deposit).checked_add(fees.deposit_coins_fee)?;
    for (_, staker) in &stakers {
        protocol.comment(*staker, "d", deposit).await?;
        protocol.settle().await?;
        protocol
            .comment(*staker, "m", fees.stake_first_coins_fee)
            .await?;
    }
    protocol.settle().await?;

    let validator = Address::external("validator-1");
    let driver = protocol.authorities().driver;
    let open = Op::OpenRound {
        loans: vec![LoanRequest {
            validator,
            max_stake: Coins::MAX,
        }],
    };
    protocol.send(driver, open, Coins::whole(1)).await?;
    protocol.settle().await?;
    info!(round = %protocol.treasury_state().await?.next_round, "Round opened");

    let profit = Coins::whole(cli.profit);
    let loan = protocol.loan_address(types::RoundId::FIRST, validator)?;
    protocol
        .send_to(
            protocol.authorities().elector,
            loan,
            Op::RoundOutcome {
                outcome: LoanOutcome::Profit(profit),
            },
            profit.checked_add(Coins::whole(1))?,
        )
        .await?;
    protocol.settle().await?;

    let treasury = protocol.treasury_state().await?;
    let owners: Vec<Address> = stakers.iter().map(|(_, address)| *address).collect();
    let wallets = protocol
        .wallet_states(&owners)
        .await?
        .into_iter()
        .zip(&stakers)
        .filter_map(|(state, (name, _))| {
            state.map(|wallet| WalletReport {
                owner: name.clone(),
                tokens: wallet.tokens,
                unstaking: wallet.unstaking,
                pending: wallet.staking_total(),
            })
        })
        .collect();

    Ok(Report {
        totals: treasury.totals,
        treasury_balance: treasury.balance,
        rounds_imbalance: treasury.rounds_imbalance,
        wallets,
        ledger: protocol.system().metrics().get_stats(),
        audit: protocol.system().audit().await?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load(&cli).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(stakers = cli.stakers, deposit = cli.deposit, "Starting staking simulation");
    let report = run(cli, config).await?;
    if !report.audit.is_balanced() {
        anyhow::bail!("Ledger audit out of balance: {:?}", report.audit);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
