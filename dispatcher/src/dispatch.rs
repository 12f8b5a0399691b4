//! Execution Dispatcher
//!
//! nonce -> chain id -> build -> sign -> submit. Each step that leaves the
//! process runs under the optional step timeout.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use ultron_core::{Connection, FeatureVector, NetworkId, Result, TxHash, UltronError};

use crate::builder::TransactionBuilder;
use crate::nonce::NonceTracker;
use crate::signer::{Account, TransactionSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Nonce,
    ChainId,
    Build,
    Sign,
    Submit,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchStage::Nonce => "nonce",
            DispatchStage::ChainId => "chain_id",
            DispatchStage::Build => "build",
            DispatchStage::Sign => "sign",
            DispatchStage::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Dispatch failure scoped to one accepted transaction
#[derive(Error, Debug)]
#[error("Dispatch failed on {network} at {stage}: {cause}")]
pub struct DispatchError {
    pub network: NetworkId,
    pub stage: DispatchStage,
    #[source]
    pub cause: UltronError,
}

pub struct Dispatcher {
    signer: Arc<dyn TransactionSigner>,
    nonces: NonceTracker,
    step_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            signer,
            nonces: NonceTracker::new(),
            step_timeout: None,
        }
    }

    pub fn with_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = Some(step_timeout);
        self
    }

    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    /// Build, sign and submit the counter-transaction for `features`.
    pub async fn dispatch(
        &self,
        connection: &Connection,
        account: &Account,
        features: &FeatureVector,
    ) -> std::result::Result<TxHash, DispatchError> {
        let start = Instant::now();
        let network = connection.id();
        let client = connection.client();
        let fail = |stage: DispatchStage| {
            move |cause: UltronError| DispatchError {
                network: network.clone(),
                stage,
                cause,
            }
        };

        let remote_nonce = self
            .step(client.transaction_count(&account.address))
            .await
            .map_err(fail(DispatchStage::Nonce))?;
        let nonce = self
            .nonces
            .resolve(network, &account.address, remote_nonce)
            .await;

        let chain_id = self
            .step(client.chain_id())
            .await
            .map_err(fail(DispatchStage::ChainId))?;

        let tx = TransactionBuilder::new(account.address)
            .nonce(nonce)
            .chain_id(chain_id)
            .build(features)
            .map_err(fail(DispatchStage::Build))?;

        let signed = self
            .step(self.signer.sign(account, &tx))
            .await
            .map_err(fail(DispatchStage::Sign))?;

        let hash = self
            .step(client.send_raw_transaction(&signed.raw))
            .await
            .map_err(fail(DispatchStage::Submit))?;

        self.nonces.commit(network, &account.address, nonce).await;

        info!(
            network = %network,
            nonce,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "✅ Transaction submitted: {}",
            hash
        );

        Ok(hash)
    }

    async fn step<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                debug!("Dispatch step exceeded {:?}", limit);
                Err(UltronError::Timeout(format!("dispatch step exceeded {:?}", limit)))
            }),
            None => fut.await,
        }
    }
}
