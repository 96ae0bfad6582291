use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use waterworld_core::broadphase::Strategy;
use waterworld_core::mdp::GridWorld;
use waterworld_core::metrics::init_logging;
use waterworld_core::rl::DpOptions;
use waterworld_core::AppConfig;
use waterworld_lib::runner::evolve::{self, Method};
use waterworld_lib::runner::{gridworld, waterworld};
use waterworld_lib::worker::serve_stdio;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to run
    #[arg(short, long, value_enum, default_value = "waterworld")]
    mode: Mode,

    /// Config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Water world ticks, or ticks per fitness evaluation in evolve mode
    #[arg(long, default_value_t = 10_000)]
    ticks: u64,

    /// Grid world episodes, or generations in evolve mode
    #[arg(long, default_value_t = 500)]
    episodes: usize,

    /// Step cap per grid world episode
    #[arg(long, default_value_t = 1000)]
    max_steps: usize,

    /// Broad-phase override: brute, grid or quadtree
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Tabular agent for grid world mode
    #[arg(long, value_enum, default_value = "td")]
    agent: GridAgent,

    /// Evolution method
    #[arg(long, value_enum, default_value = "ga")]
    method: Method,

    /// Hidden units of evolved networks
    #[arg(long, default_value_t = 20)]
    hidden: usize,

    /// Write the trained brain here
    #[arg(long)]
    save: Option<PathBuf>,

    /// Start from a saved brain
    #[arg(long)]
    load: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Waterworld,
    Gridworld,
    Evolve,
    /// Serve newline-delimited worker requests on stdin
    Worker,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum GridAgent {
    Td,
    Dp,
}

fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::info!(path = ?path, "No config file, using defaults");
        return Ok(AppConfig::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    AppConfig::from_toml(&content).with_context(|| format!("loading {:?}", path))
}

fn print_summary<T: Serialize>(summary: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(strategy) = args.strategy {
        config.broadphase.strategy = strategy;
    }
    config.validate()?;

    let save = args.save.as_deref();
    let load = args.load.as_deref();
    match args.mode {
        Mode::Waterworld => {
            let summary = waterworld::run(&config, args.ticks, load, save)?;
            print_summary(&summary)?;
        }
        Mode::Gridworld => {
            let summary = match args.agent {
                GridAgent::Td => gridworld::run_td(
                    GridWorld::cliff_demo(),
                    config.td.clone(),
                    args.episodes,
                    args.max_steps,
                    load,
                    save,
                )?,
                GridAgent::Dp => gridworld::run_dp(
                    GridWorld::cliff_demo(),
                    DpOptions {
                        gamma: config.td.gamma.min(0.99),
                        seed: config.td.seed,
                    },
                    args.max_steps,
                )?,
            };
            print_summary(&summary)?;
        }
        Mode::Evolve => {
            let summary = evolve::run(
                &config,
                args.method,
                args.episodes as u64,
                args.hidden,
                args.ticks,
                save,
            )?;
            print_summary(&summary)?;
        }
        Mode::Worker => serve_stdio().await?,
    }

    Ok(())
}
