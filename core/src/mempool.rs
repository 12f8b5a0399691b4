use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::error::UltronError;
use crate::features::FeatureVector;
use crate::registry::Connection;
use crate::types::NetworkId;

/// Poll failure scoped to one network and one tick
#[derive(Error, Debug)]
#[error("Mempool poll failed on {network}: {cause}")]
pub struct PollError {
    pub network: NetworkId,
    #[source]
    pub cause: UltronError,
}

/// Pull the pending block of `connection` and project each transaction.
///
/// An empty pending block yields an empty vector, not an error.
pub async fn poll(
    connection: &Connection,
    timeout: Option<Duration>,
) -> Result<Vec<FeatureVector>, PollError> {
    let start = Instant::now();
    let fetch = connection.client().pending_transactions();

    let pending = match timeout {
        Some(limit) => tokio::time::timeout(limit, fetch)
            .await
            .map_err(|_| UltronError::Timeout(format!("pending block fetch exceeded {:?}", limit)))
            .and_then(|result| result),
        None => fetch.await,
    }
    .map_err(|cause| PollError {
        network: connection.id().clone(),
        cause,
    })?;

    let vectors: Vec<FeatureVector> = pending.iter().map(FeatureVector::from).collect();

    debug!(
        network = %connection.id(),
        transactions = vectors.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Mempool polled"
    );

    Ok(vectors)
}
