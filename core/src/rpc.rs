//! JSON-RPC chain client
//!
//! Every EVM network the agent watches (mainnet, rollups, sidechains) exposes
//! the same handful of methods, so one alloy HTTP provider type serves all of
//! them; only the endpoint differs.

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportError, TransportResult};
use async_trait::async_trait;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, UltronError};
use crate::types::{Address, Bytes, Network, PendingTransaction, TxHash};

/// Operations the core needs from a network node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number; doubles as the liveness check.
    async fn block_number(&self) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    /// Transactions of the pending block, with full bodies.
    async fn pending_transactions(&self) -> Result<Vec<PendingTransaction>>;

    /// Next usable nonce for `address`, counting pending transactions.
    async fn transaction_count(&self, address: &Address) -> Result<u64>;

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash>;

    fn endpoint(&self) -> &str;
}

/// Builds a client for a configured network.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, network: &Network) -> Result<Arc<dyn ChainClient>>;
}

/// Factory producing [`RpcClient`]s that share one request timeout.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    request_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, network: &Network) -> Result<Arc<dyn ChainClient>> {
        let client = RpcClient::new(network.rpc_url.clone(), self.request_timeout)?;
        Ok(Arc::new(client))
    }
}

/// HTTP JSON-RPC client for one endpoint
pub struct RpcClient {
    provider: DynProvider,
    endpoint: String,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(UltronError::ConnectionError("empty RPC endpoint".to_string()));
        }

        let url: Url = endpoint.trim().parse().map_err(|e| {
            UltronError::ConnectionError(format!("invalid RPC endpoint '{}': {}", endpoint, e))
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            endpoint,
            request_timeout: timeout,
        })
    }

    async fn request<T, F>(&self, method: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        debug!(endpoint = %self.endpoint, method, "JSON-RPC call");

        tokio::time::timeout(self.request_timeout, call.into_future())
            .await
            .map_err(|_| {
                UltronError::Timeout(format!(
                    "{} exceeded {:?}",
                    method, self.request_timeout
                ))
            })?
            .map_err(|e| classify_rpc_error(method, e))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_number(&self) -> Result<u64> {
        self.request("eth_blockNumber", self.provider.get_block_number())
            .await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.request("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn pending_transactions(&self) -> Result<Vec<PendingTransaction>> {
        let block = self
            .request(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Pending)
                    .full(),
            )
            .await?;

        let Some(block) = block else {
            debug!(endpoint = %self.endpoint, "No pending block available");
            return Ok(Vec::new());
        };

        let Some(bodies) = block.transactions.as_transactions() else {
            warn!(endpoint = %self.endpoint, "Pending block came back without transaction bodies");
            return Ok(Vec::new());
        };

        Ok(bodies.iter().map(PendingTransaction::from_consensus).collect())
    }

    async fn transaction_count(&self, address: &Address) -> Result<u64> {
        self.request(
            "eth_getTransactionCount",
            self.provider.get_transaction_count(*address).pending(),
        )
        .await
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash> {
        let pending = self
            .request(
                "eth_sendRawTransaction",
                self.provider.send_raw_transaction(raw.as_ref()),
            )
            .await?;
        Ok(*pending.tx_hash())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify_rpc_error(method: &str, e: TransportError) -> UltronError {
    match e {
        RpcError::ErrorResp(payload) => UltronError::RpcError(format!(
            "{} failed: {} (code {})",
            method, payload.message, payload.code
        )),
        RpcError::NullResp => UltronError::RpcError(format!("{} returned no result", method)),
        RpcError::DeserError { err, .. } => {
            UltronError::ParseError(format!("Failed to parse {} response: {}", method, err))
        }
        RpcError::Transport(kind) => {
            UltronError::NetworkError(format!("{} request failed: {}", method, kind))
        }
        other => UltronError::RpcError(format!("{} failed: {}", method, other)),
    }
}
