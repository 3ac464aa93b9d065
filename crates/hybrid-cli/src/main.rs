use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use num_bigint::BigUint;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hybrid_consensus::{ChainConfig, ChainHeader, DifficultyOracle, EngineConfig, HybridFactors};

#[derive(Parser)]
#[command(name = "hybrid-cli")]
#[command(about = "Hybrid consensus engine operator tools", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML, YAML or JSON); mainnet defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the difficulty epochs and their activation blocks
    Schedule,

    /// Validate the configuration and print it as JSON
    CheckConfig,

    /// Compute the difficulty of a child block
    Difficulty {
        /// Parent block number
        #[arg(long)]
        parent_number: u64,
        /// Parent timestamp, unix seconds
        #[arg(long)]
        parent_time: u64,
        /// Parent difficulty
        #[arg(long)]
        parent_difficulty: BigUint,
        /// Whether the parent included uncles
        #[arg(long)]
        parent_has_uncles: bool,
        /// Child timestamp, unix seconds
        #[arg(long)]
        time: u64,
        /// Stake factor for the hybrid stage
        #[arg(long)]
        pos: Option<BigUint>,
        /// Transaction factor for the hybrid stage
        #[arg(long)]
        pot: Option<BigUint>,
        /// Trust factor for the hybrid stage
        #[arg(long)]
        trust: Option<BigUint>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading engine configuration from {}", path.display())),
        None => Ok(EngineConfig::new(ChainConfig::mainnet())),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let oracle = DifficultyOracle::new(&config.chain, config.difficulty.clone())?;

    match cli.command {
        Commands::Schedule => {
            for (epoch, block) in oracle.schedule().activations() {
                println!("{:<16} {}", epoch.as_str(), block);
            }
        }
        Commands::CheckConfig => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Difficulty {
            parent_number,
            parent_time,
            parent_difficulty,
            parent_has_uncles,
            time,
            pos,
            pot,
            trust,
        } => {
            let mut parent = ChainHeader {
                number: parent_number,
                time: parent_time,
                difficulty: parent_difficulty,
                ..Default::default()
            };
            if parent_has_uncles {
                // any non-empty uncle hash marks the parent as having uncles
                parent.uncle_hash = hybrid_consensus::Hash([0xff; 32]);
            }

            let epoch = oracle.epoch_for_child(&parent);
            let base = oracle.compute_difficulty(time, &parent);
            info!("Child #{} falls in {}", parent_number.saturating_add(1), epoch.as_str());
            println!("epoch:      {}", epoch.as_str());
            println!("difficulty: {}", base);

            if pos.is_some() || pot.is_some() || trust.is_some() {
                let factors = HybridFactors {
                    pos: pos.unwrap_or_default(),
                    pot: pot.unwrap_or_default(),
                    trust: trust.unwrap_or_default(),
                };
                let hybrid = oracle.compute_hybrid_difficulty(&base, &factors, &config.weights);
                println!("hybrid:     {}", hybrid);
            }
        }
    }

    Ok(())
}
