//! Cashpoint demo terminal.
//!
//! Starts the XFS manager over the simulated devices and walks one customer
//! session (withdrawal or balance inquiry) through the NDC screens, logging
//! every device event.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cashpoint_core::constants::{
    DEFAULT_ACCOUNT_BALANCE, DEFAULT_XFS_VERSION, EVENT_CARD_EJECTED, EVENT_CARD_INSERTED,
    EVENT_CARD_RETAINED, EVENT_CASH_PRESENTED, EVENT_CASH_RETRACTED, EVENT_PAPER_OUT,
    WFS_INF_CDM_CASH_UNIT_INFO,
};
use cashpoint_emulator::{Authorizer, SessionStore};
use cashpoint_hardware::{InfoReply, Latency, ServiceHandle, XfsConfig, XfsManager};

mod terminal;

use terminal::{ATM_ID, Terminal, TransactionKind};

#[derive(Parser, Debug)]
#[command(name = "cashpoint")]
#[command(about = "Simulated ATM session over XFS-style device services")]
struct Args {
    /// Path to a JSON device configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transaction to run
    #[arg(short, long, value_enum, default_value_t = TransactionKind::Withdrawal)]
    transaction: TransactionKind,

    /// Amount to withdraw
    #[arg(short, long, default_value_t = 50)]
    amount: u32,

    /// PIN keyed by the customer (defaults to the configured simulated PIN)
    #[arg(long)]
    pin: Option<String>,

    /// Opening balance of the customer's account
    #[arg(long, default_value_t = DEFAULT_ACCOUNT_BALANCE)]
    balance: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<XfsConfig> {
    let Some(path) = path else {
        return Ok(XfsConfig::default().with_latency(Latency::Scaled(0.1)));
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = XfsConfig::from_json_str(&json)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

fn subscribe_event_log(manager: &XfsManager) {
    for event_type in [
        EVENT_CARD_INSERTED,
        EVENT_CARD_EJECTED,
        EVENT_CARD_RETAINED,
        EVENT_CASH_PRESENTED,
        EVENT_CASH_RETRACTED,
        EVENT_PAPER_OUT,
    ] {
        manager.events().subscribe(event_type, |event| {
            info!(
                event = %event.event_type,
                id = event.event_id,
                service = %event.service_handle,
                payload = ?event.payload,
                "Device event"
            );
        });
    }
}

async fn print_inventory(manager: &XfsManager, dispenser: ServiceHandle) -> anyhow::Result<()> {
    if let InfoReply::CashUnits(info) = manager
        .get_info(dispenser, WFS_INF_CDM_CASH_UNIT_INFO)
        .await?
    {
        println!("Cash units:");
        for unit in &info.units {
            println!(
                "  {:>4} {} x {:>3}",
                unit.denomination, unit.currency, unit.count
            );
        }
        println!("  total {}", info.total_value());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?;
    // The account PIN is the one the simulated PIN pad keys by default.
    let host = Authorizer::new(config.simulated_pin.clone(), args.balance);
    let manager = XfsManager::new(config);
    subscribe_event_log(&manager);

    manager
        .startup(DEFAULT_XFS_VERSION)
        .context("Failed to start XFS manager")?;
    info!(services = ?manager.logical_names(), "Services registered");

    let mut terminal = Terminal::open(&manager, host)?;
    let outcome = terminal
        .serve(args.transaction, args.amount, args.pin)
        .await;

    match &outcome {
        Ok(Some(mix)) => {
            for note in &mix.notes {
                info!(denomination = note.denomination, count = note.count, "Dispensed");
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %format_args!("{e:#}"), "Transaction failed");
            if let Err(e) = terminal.abort().await {
                error!(error = %format_args!("{e:#}"), "Session could not be closed cleanly");
            }
        }
    }

    println!("{}", terminal.session.transaction_record(ATM_ID).to_json()?);
    print_inventory(&manager, terminal.dispenser).await?;

    terminal.close()?;
    manager.cleanup()?;

    outcome.map(|_| ())
}
