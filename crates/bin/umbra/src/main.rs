//! umbra - shielded pool cli
//!
//! generates shielded addresses and runs the bridge scenarios against
//! in-memory l1/l2 ledgers.

mod simulate;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use umbra_pool::{Keypair, PoolConfig};

#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "umbra shielded pool - addresses and local simulation")]
struct Cli {
    /// pool config (toml). defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate a fresh shielded keypair and print its address
    Keygen,

    /// Run bridge scenarios and print balances as json
    Simulate {
        #[arg(short, long, value_enum, default_value = "all")]
        scenario: Scenario,
    },

    /// Print the effective pool config
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// deposit 0.1 through the bridge, withdraw 0.08 on l2
    DepositWithdraw,
    /// deposit 0.13, pay 0.06 to a second holder, withdraw on l2 and l1
    SplitL1,
    All,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("umbra=info".parse()?)
                .add_directive("umbra_pool=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Keygen => {
            let keypair = Keypair::random(&mut rand::rngs::OsRng);
            println!("{}", keypair.address());
        }
        Command::Simulate { scenario } => {
            let mut reports = Vec::new();
            if matches!(scenario, Scenario::DepositWithdraw | Scenario::All) {
                reports.push(simulate::deposit_withdraw(&config)?);
            }
            if matches!(scenario, Scenario::SplitL1 | Scenario::All) {
                reports.push(simulate::split_l1(&config)?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PoolConfig> {
    let Some(path) = path else {
        return Ok(PoolConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: PoolConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    tracing::info!(
        "loaded config: tree height {}, root history {}",
        config.tree_height,
        config.root_history_size
    );
    Ok(config)
}
