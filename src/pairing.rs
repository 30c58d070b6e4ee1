//! Pairing seam.
//!
//! The challenge/response exchange that makes the host trust the relay's
//! client certificate lives outside this crate. This module holds the state
//! it reports, the PIN it needs, and the startup flow around it.

use rand::Rng;
use std::future::Future;
use thiserror::Error;

use crate::host::{HostClient, HostError};

/// Outcome of a pairing attempt, or the host's view of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    NotPaired,
    Paired,
    PinWrong,
    Failed,
    AlreadyInProgress,
}

/// Performs the pairing exchange with the host.
pub trait Pairing: Send + Sync {
    /// Pair using `pin`, which the user types on the host.
    fn pair(&self, server_info: &str, pin: &str) -> impl Future<Output = Result<PairState, HostError>> + Send;
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("the relay is not paired with the host")]
    NotPaired,

    #[error("incorrect PIN")]
    PinWrong,

    #[error("pairing failed")]
    Failed,

    #[error("another pairing attempt is already in progress on the host")]
    AlreadyInProgress,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Four random decimal digits.
pub fn generate_pin() -> String {
    let mut rng = rand::thread_rng();
    (0..4).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

/// Fail unless the host already trusts the relay's client identity.
pub async fn require_paired(host: &HostClient) -> Result<(), PairingError> {
    match host.get_pair_state().await? {
        PairState::Paired => Ok(()),
        _ => Err(PairingError::NotPaired),
    }
}

/// Pair with the host unless already paired.
///
/// `announce_pin` receives the PIN before the exchange starts so it can be
/// shown to the user.
pub async fn ensure_paired<P, F>(host: &HostClient, pairing: &P, announce_pin: F) -> Result<(), PairingError>
where
    P: Pairing,
    F: FnOnce(&str),
{
    if host.get_pair_state().await? == PairState::Paired {
        tracing::info!("Already paired with host");
        return Ok(());
    }

    let pin = generate_pin();
    announce_pin(&pin);

    let server_info = host.get_server_info().await?;
    let state = pairing.pair(&server_info, &pin).await?;
    tracing::info!(state = ?state, "Pairing finished");
    outcome(state)
}

fn outcome(state: PairState) -> Result<(), PairingError> {
    match state {
        PairState::Paired => Ok(()),
        PairState::PinWrong => Err(PairingError::PinWrong),
        PairState::AlreadyInProgress => Err(PairingError::AlreadyInProgress),
        PairState::Failed | PairState::NotPaired => Err(PairingError::Failed),
    }
}
