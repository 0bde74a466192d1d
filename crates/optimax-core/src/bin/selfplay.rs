//! OptiMAX self-play runner.
//!
//! Plays headless bot-vs-bot games and prints the results as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use optimax_core::{run_batch_selfplay, BotKind, RulesConfig, SelfPlayConfig};

#[derive(Parser)]
#[command(name = "optimax-selfplay")]
#[command(about = "Run headless OptiMAX Rogue games between scripted bots", version)]
struct Cli {
    /// Seed of the first game; later games use consecutive seeds
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of games to play
    #[arg(short, long, default_value_t = 1)]
    games: u32,

    /// Ticks before a game is called a draw
    #[arg(long, default_value_t = 2_000)]
    max_ticks: u64,

    /// Bot driving the first agent (random, ladder, hunter)
    #[arg(long, default_value_t = BotKind::Hunter)]
    first: BotKind,

    /// Bot driving the second agent
    #[arg(long, default_value_t = BotKind::Ladder)]
    second: BotKind,

    /// JSON file with rule overrides
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Only print the aggregate metrics
    #[arg(long)]
    summary: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Tracing filter directive
    #[arg(long, default_value = "optimax_core=info")]
    log_filter: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_filter));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let rules = match &cli.rules {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading rules from {}", path.display()))?;
            serde_json::from_str::<RulesConfig>(&text)
                .with_context(|| format!("parsing rules from {}", path.display()))?
        }
        None => RulesConfig::default(),
    };
    rules.validate().context("invalid rules")?;

    let config = SelfPlayConfig {
        seed: cli.seed,
        max_ticks: cli.max_ticks,
        bots: [cli.first, cli.second],
        rules,
    };

    info!(
        games = cli.games,
        seed = cli.seed,
        first = %cli.first,
        second = %cli.second,
        "starting self-play"
    );
    let batch = run_batch_selfplay(&config, cli.games)?;
    info!(
        draws = batch.aggregate.draws,
        first_wins = batch.aggregate.wins[0],
        second_wins = batch.aggregate.wins[1],
        "self-play finished"
    );

    let json = match (cli.summary, cli.pretty) {
        (true, true) => serde_json::to_string_pretty(&batch.aggregate)?,
        (true, false) => serde_json::to_string(&batch.aggregate)?,
        (false, true) => serde_json::to_string_pretty(&batch)?,
        (false, false) => serde_json::to_string(&batch)?,
    };
    println!("{json}");
    Ok(())
}
