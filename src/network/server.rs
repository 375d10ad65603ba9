//! Rendezvous TCP Server
//!
//! Accepts registration connections and hands each to its own handler task.
//! Owns the coordinator task for the lifetime of `run`.

use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::core::ports::{PortAllocationError, PortAllocator, DEFAULT_PORT_RANGE};
use crate::matching::coordinator::{CoordinatorConfig, CoordinatorError, MatchCoordinator};
use crate::network::handler::handle_registration;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 11100;

/// Default map name.
pub const DEFAULT_MAP: &str = "debugMap";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Players per match.
    pub players: usize,
    /// Map name sent in every game setup.
    pub map_name: String,
    /// How long a connection may wait to register and then to be matched.
    pub registration_timeout: Duration,
    /// Maximum concurrently pending connections.
    pub max_pending: usize,
    /// Range ports are allocated from.
    pub port_range: Range<u16>,
    /// Fixed seed for port allocation. Entropy-seeded when `None`.
    pub port_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            players: 2,
            map_name: DEFAULT_MAP.to_string(),
            registration_timeout: Duration::from_secs(120),
            max_pending: 256,
            port_range: DEFAULT_PORT_RANGE,
            port_seed: None,
        }
    }
}

impl ServerConfig {
    fn coordinator_config(&self) -> Result<CoordinatorConfig, CoordinatorError> {
        CoordinatorConfig::new(self.players, self.map_name.clone())
    }

    fn port_allocator(&self) -> Result<PortAllocator, PortAllocationError> {
        match self.port_seed {
            Some(seed) => PortAllocator::seeded(self.port_range.clone(), seed),
            None => PortAllocator::from_entropy(self.port_range.clone()),
        }
    }
}

/// First pause after a failed accept.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between failing accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause between consecutive accept errors, doubling up to a cap.
///
/// Errors such as running out of file descriptors persist until a
/// connection closes.
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            next: ACCEPT_BACKOFF_MIN,
        }
    }

    /// Delay before the next accept, growing with each call.
    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    /// Called after a successful accept.
    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// Invalid match configuration.
    #[error("Invalid configuration: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Invalid port range.
    #[error("Invalid port configuration: {0}")]
    Ports(#[from] PortAllocationError),
}

/// The rendezvous server.
pub struct RendezvousServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl RendezvousServer {
    /// Validate `config` and bind the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.coordinator_config()?;
        config.port_allocator()?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            local_addr,
            shutdown_tx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let (coordinator, handle) = MatchCoordinator::new(
            self.config.coordinator_config()?,
            self.config.port_allocator()?,
        );
        let coordinator_task = tokio::spawn(coordinator.run());

        let permits = Arc::new(Semaphore::new(self.config.max_pending));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut backoff = AcceptBackoff::new();
        info!(
            "Rendezvous server listening on {} ({} players per match)",
            self.local_addr, self.config.players
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            backoff.reset();
                            let permit = match permits.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Pending connection limit reached, rejecting {}", addr);
                                    continue;
                                }
                            };

                            info!("New connection from {}", addr);
                            let handle = handle.clone();
                            let timeout = self.config.registration_timeout;
                            tokio::spawn(async move {
                                let _permit = permit;
                                match handle_registration(stream, addr, handle, timeout).await {
                                    Ok(outcome) => info!("Connection {} closed: {}", addr, outcome),
                                    Err(e) => warn!("Registration from {} failed: {}", addr, e),
                                }
                            });
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            error!("Accept error: {} (retrying in {:?})", e, delay);
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Pending handlers see their outcome resolve as discarded and close
        coordinator_task.abort();
        Ok(())
    }

    /// Stop the accept loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            port_seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 11100);
        assert_eq!(config.players, 2);
        assert_eq!(config.map_name, "debugMap");
        assert_eq!(config.registration_timeout, Duration::from_secs(120));
        assert_eq!(config.port_range, 50000..55000);
    }

    #[test]
    fn test_accept_backoff_doubles_to_cap_and_resets() {
        let mut backoff = AcceptBackoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));

        for _ in 0..20 {
            assert!(backoff.next_delay() <= ACCEPT_BACKOFF_MAX);
        }
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MAX);

        backoff.reset();
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MIN);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = RendezvousServer::bind(local_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_player_count() {
        let config = ServerConfig {
            players: 5,
            ..local_config()
        };
        assert!(matches!(
            RendezvousServer::bind(config).await,
            Err(ServerError::Coordinator(CoordinatorError::InvalidPlayerCount(5)))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_port_range() {
        let config = ServerConfig {
            port_range: 0..10,
            ..local_config()
        };
        assert!(matches!(
            RendezvousServer::bind(config).await,
            Err(ServerError::Ports(_))
        ));
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(RendezvousServer::bind(local_config()).await.unwrap());
        let runner = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        // Give the accept loop time to subscribe
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), runner).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
