//! `multiboard-run`: acquire synchronised rounds from a group of boards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_board::BoardCapabilities;
use multiboard_daq::config::{RunConfig, DEFAULT_CONFIG_PATH};
use multiboard_daq::{logging, runner};

#[derive(Parser)]
#[command(name = "multiboard-run")]
#[command(about = "Synchronised multi-board acquisition", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire rounds and print per-board summaries
    Run {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the number of rounds to collect
        #[arg(short, long)]
        rounds: Option<u64>,

        /// Only print the final report
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate a configuration and show the resolved boards
    Check {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            rounds,
            quiet,
        } => {
            let mut config = load(&config)?;
            if let Some(rounds) = rounds {
                anyhow::ensure!(rounds > 0, "--rounds must be at least 1");
                config.run.rounds = rounds;
            }
            if quiet {
                config.run.print_summary = false;
            }
            logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
            tracing::info!(name = %config.application.name, rounds = config.run.rounds, "Starting run");

            let print = config.run.print_summary;
            let report = runner::run(&config, |snapshot| {
                if print {
                    println!("round {}", snapshot.round);
                    for batch in &snapshot.boards {
                        println!("  {}", runner::BoardSummary::from_batch(batch));
                    }
                }
            })
            .await?;

            println!(
                "{} rounds received, {} dropped",
                report.rounds, report.dropped
            );
            for summary in &report.last {
                println!("  {summary}");
            }
            if let Some(code) = report.failure {
                anyhow::bail!("acquisition failed with code {code}");
            }
        }
        Commands::Check { config } => {
            let config = load(&config)?;
            let caps = BoardCapabilities::default();
            println!("{}: {} rounds", config.application.name, config.run.rounds);
            for board in &config.boards {
                if !board.enabled {
                    println!("  board {} disabled", board.id);
                    continue;
                }
                let resolved = board
                    .acquisition
                    .resolve(&caps)
                    .with_context(|| format!("board {} does not resolve", board.id))?;
                println!(
                    "  board {}: {} ch @ {:.3} Hz (requested {:.3}), {} samples x {} buffers, {}",
                    board.id,
                    resolved.geometry.channels,
                    resolved.achieved_rate,
                    board.acquisition.sample_rate,
                    resolved.geometry.samples_per_buffer,
                    resolved.geometry.depth,
                    resolved.range().description(),
                );
            }
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<RunConfig> {
    let config = RunConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}
