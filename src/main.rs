//! Rendezvous Server
//!
//! Pairs up peer-to-peer game clients and tells each how to reach the others.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rendezvous::network::server::{DEFAULT_MAP, DEFAULT_PORT};
use rendezvous::{RendezvousServer, ServerConfig, MAX_PLAYERS, MIN_PLAYERS, VERSION};

#[derive(Debug, Parser)]
#[command(name = "rendezvous-server", version, about = "Peer-to-peer match rendezvous server")]
struct Args {
    /// Players per match
    #[arg(
        short = 'n',
        long = "players",
        default_value_t = 2,
        value_parser = clap::value_parser!(u8).range(MIN_PLAYERS as i64..=MAX_PLAYERS as i64)
    )]
    players: u8,

    /// Listen port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Map name sent to every player
    #[arg(long, default_value = DEFAULT_MAP)]
    map: String,

    /// Seconds a client may wait to register and then to be matched
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Maximum concurrently pending connections
    #[arg(long, default_value_t = 256)]
    max_pending: usize,

    /// First port of the allocation range
    #[arg(long, default_value_t = 50000)]
    port_range_start: u16,

    /// End (exclusive) of the allocation range
    #[arg(long, default_value_t = 55000)]
    port_range_end: u16,

    /// Fixed seed for port allocation
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.host, self.port),
            players: self.players as usize,
            map_name: self.map.clone(),
            registration_timeout: Duration::from_secs(self.timeout_secs),
            max_pending: self.max_pending,
            port_range: self.port_range_start..self.port_range_end,
            port_seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Rendezvous Server v{}", VERSION);

    let server = RendezvousServer::bind(args.server_config())
        .await
        .with_context(|| format!("starting server on {}:{}", args.host, args.port))?;
    info!("Matching {} players on map {:?}", args.players, args.map);

    let run = server.run();
    tokio::pin!(run);
    tokio::select! {
        result = &mut run => return result.context("server stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("Interrupted, shutting down");
        }
    }

    server.shutdown();
    run.await.context("server stopped")?;
    Ok(())
}
