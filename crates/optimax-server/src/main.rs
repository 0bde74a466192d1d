//! OptiMAX Rogue server
//!
//! Authoritative two-agent roguelike server. Lobbies tick on their own tasks; this loop only
//! moves packets between renet and the lobby manager.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use optimax_server::{Outbound, Server, ServerConfig, ServerRunner, TransportConfig, PROTOCOL_ID};

/// ~60 Hz network frame
const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "optimax-server")]
#[command(about = "Authoritative lobby and tick server for OptiMAX Rogue", version)]
struct Cli {
    /// YAML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Per-tick action window in milliseconds
    #[arg(long)]
    tick_timeout_ms: Option<u64>,

    /// Minimum milliseconds between resolved ticks
    #[arg(long)]
    min_tick_interval_ms: Option<u64>,

    /// Maximum simultaneous connections
    #[arg(long)]
    max_clients: Option<usize>,

    /// Fixed world seed for every lobby
    #[arg(long)]
    seed: Option<u64>,

    /// Tracing filter directive
    #[arg(long, default_value = "optimax_server=info")]
    log_filter: String,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(ms) = self.tick_timeout_ms {
            config.tick_timeout_ms = ms;
        }
        if let Some(ms) = self.min_tick_interval_ms {
            config.min_tick_interval_ms = ms;
        }
        if let Some(max) = self.max_clients {
            config.max_clients = max;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate().context("invalid server config")?;
        Ok(config)
    }
}

/// One network frame: feed the server what arrived, then flush what lobbies queued.
fn frame(
    runner: &mut ServerRunner,
    server: &mut Server,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    delta: Duration,
) {
    let incoming = runner.receive(delta);
    for client in incoming.connected {
        server.client_connected(client, Instant::now());
    }
    for client in incoming.disconnected {
        server.client_disconnected(client);
    }
    for (client, packet) in incoming.packets {
        server.handle_packet(client, &packet, Instant::now());
    }

    for outcome in server.maintain(tokio::time::Instant::now()) {
        info!(
            lobby = %outcome.lobby,
            winner = ?outcome.game_over.winner,
            reason = ?outcome.game_over.reason,
            final_tick = outcome.game_over.final_tick,
            "game over"
        );
    }

    while let Ok(Outbound { client, message }) = outbound.try_recv() {
        runner.send(client, &message);
    }
    runner.flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_filter));
    fmt().with_env_filter(filter).init();

    let config = cli.server_config()?;

    let mut runner =
        ServerRunner::new(TransportConfig::from(&config)).context("failed to create transport")?;

    info!("OptiMAX Rogue server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        address = ?runner.local_addr(),
        protocol = format_args!("{PROTOCOL_ID:016x}"),
        tick_timeout_ms = config.tick_timeout_ms,
        min_tick_interval_ms = config.min_tick_interval_ms,
        "listening"
    );

    let (outbox, mut outbound) = mpsc::unbounded_channel();
    let mut server = Server::new(config, outbox);

    let mut last = Instant::now();
    loop {
        let start = Instant::now();
        frame(&mut runner, &mut server, &mut outbound, start - last);
        last = start;

        let sleep = FRAME.saturating_sub(start.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                runner.disconnect_all();
                return Ok(());
            }
        }
    }
}
