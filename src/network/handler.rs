//! Registration Handler
//!
//! One handler runs per accepted connection. It reads a single registration
//! frame, submits the registrant to the coordinator, then waits for one of:
//!
//! - the match result, which it writes back before closing;
//! - the registration timeout, which withdraws the registrant;
//! - the connection failing, which also withdraws it.
//!
//! A client that half-closes after registering is still waiting to read its
//! game setup, so end-of-stream on its side does not withdraw it.
//!
//! Every path ends with the connection closed. Clients retry by reconnecting.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::matching::coordinator::{
    CoordinatorClosed, CoordinatorHandle, MatchOutcome, PendingMatch,
};
use crate::network::framing::{read_frame, write_frame, FrameError};
use crate::network::protocol::{RegistrationRequest, RegistrationRuleError};

/// Errors that end a connection before its registrant reaches the roster.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The registration frame could not be read.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// The client sent nothing within the registration timeout.
    #[error("No registration received within {0:?}")]
    Timeout(Duration),

    /// The payload is not a registration.
    #[error("Malformed registration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The registration parsed but breaks a field rule.
    #[error("Invalid registration: {0}")]
    Invalid(#[from] RegistrationRuleError),

    /// The coordinator is gone.
    #[error("Coordinator unavailable: {0}")]
    CoordinatorUnavailable(#[from] CoordinatorClosed),
}

/// How a registered connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Game setup written to the client.
    Delivered,
    /// A match formed but the game setup could not be written.
    DeliveryFailed,
    /// The registrant's batch was discarded.
    Discarded(String),
    /// No match formed within the registration timeout.
    TimedOut,
    /// The connection failed while waiting.
    ClientLeft,
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "game setup delivered"),
            Self::DeliveryFailed => write!(f, "game setup not delivered"),
            Self::Discarded(reason) => write!(f, "match discarded ({reason})"),
            Self::TimedOut => write!(f, "registration timed out"),
            Self::ClientLeft => write!(f, "client left before match"),
        }
    }
}

/// Why a handler withdrew its registrant.
#[derive(Debug, Clone, Copy)]
enum WithdrawReason {
    TimedOut,
    ClientLeft,
}

/// Serve one registration connection to completion.
pub async fn handle_registration<S>(
    mut stream: S,
    observed_addr: SocketAddr,
    coordinator: CoordinatorHandle,
    timeout: Duration,
) -> Result<RegistrationOutcome, RegistrationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = tokio::time::timeout(timeout, read_frame(&mut stream))
        .await
        .map_err(|_| RegistrationError::Timeout(timeout))??;
    debug!(
        "Registration from {}: {}",
        observed_addr,
        String::from_utf8_lossy(&payload)
    );

    let request = RegistrationRequest::from_slice(&payload)?;
    let registrant = request.into_registrant(coordinator.next_id(), observed_addr)?;
    info!(
        "Registered {} {:?} local {} observed {}",
        registrant.id, registrant.name, registrant.local_addr, observed_addr
    );

    let mut pending = coordinator.submit(registrant).await?;
    let (outcome, withdrawn) =
        wait_for_match(&mut stream, &mut pending, &coordinator, timeout).await;

    let result = match outcome {
        MatchOutcome::Matched(payload) => match write_frame(&mut stream, &payload).await {
            Ok(()) => RegistrationOutcome::Delivered,
            Err(e) => {
                warn!("Failed to send game setup to {}: {}", observed_addr, e);
                RegistrationOutcome::DeliveryFailed
            }
        },
        MatchOutcome::Discarded(reason) => RegistrationOutcome::Discarded(reason),
        MatchOutcome::Withdrawn => match withdrawn {
            Some(WithdrawReason::ClientLeft) => RegistrationOutcome::ClientLeft,
            Some(WithdrawReason::TimedOut) | None => RegistrationOutcome::TimedOut,
        },
    };

    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown of {} failed: {}", observed_addr, e);
    }
    Ok(result)
}

/// Wait for the coordinator's answer, withdrawing on timeout or a failed connection.
async fn wait_for_match<S>(
    stream: &mut S,
    pending: &mut PendingMatch,
    coordinator: &CoordinatorHandle,
    timeout: Duration,
) -> (MatchOutcome, Option<WithdrawReason>)
where
    S: AsyncRead + Unpin,
{
    let id = pending.id();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut scratch = [0u8; 256];
    // EOF only means the client is done sending; it may still be reading
    let mut read_open = true;

    let reason = loop {
        tokio::select! {
            outcome = pending.outcome() => return (outcome, None),
            _ = &mut deadline => {
                warn!("Registrant {} timed out after {:?}", id, timeout);
                break WithdrawReason::TimedOut;
            }
            read = stream.read(&mut scratch), if read_open => match read {
                Ok(0) => {
                    debug!("Registrant {} half-closed, still waiting", id);
                    read_open = false;
                }
                Ok(n) => debug!("Ignoring {} unexpected bytes from {}", n, id),
                Err(e) => {
                    info!("Registrant {} connection lost while waiting: {}", id, e);
                    break WithdrawReason::ClientLeft;
                }
            },
        }
    };

    if let Err(e) = coordinator.withdraw(id).await {
        debug!("Withdraw of {} skipped: {}", id, e);
    }
    // Either Withdrawn, or the match that beat the withdrawal
    (pending.outcome().await, Some(reason))
}
