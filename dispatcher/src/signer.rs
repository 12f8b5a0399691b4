use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use ultron_core::{
    Address, OutgoingTransaction, Result, SignedTransaction, TransactionRequest, UltronError,
};

/// Sending account.
///
/// `key_ref` is an opaque reference the signer resolves to a key; it never
/// holds key material itself.
#[derive(Clone, Deserialize)]
pub struct Account {
    pub address: Address,
    #[serde(default)]
    pub key_ref: String,
}

impl Account {
    pub fn new(address: Address, key_ref: impl Into<String>) -> Self {
        Self {
            address,
            key_ref: key_ref.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("key_ref", &"<redacted>")
            .finish()
    }
}

/// External signing collaborator
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, account: &Account, tx: &OutgoingTransaction) -> Result<SignedTransaction>;
}

/// Signer reached over JSON-RPC `eth_signTransaction` (clef, web3signer and similar)
pub struct RemoteSigner {
    http_client: Client,
    signer_url: String,
    next_id: AtomicU64,
}

impl RemoteSigner {
    pub fn new(signer_url: String, timeout: Duration) -> Result<Self> {
        if signer_url.trim().is_empty() {
            return Err(UltronError::ConfigError("signer url is empty".to_string()));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UltronError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer_url,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn signer_url(&self) -> &str {
        &self.signer_url
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    async fn sign(&self, account: &Account, tx: &OutgoingTransaction) -> Result<SignedTransaction> {
        let request = SignTransactionRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_signTransaction",
            params: [tx.to_request()],
        };

        debug!(from = %account.address, nonce = tx.nonce, "Requesting signature");

        let mut builder = self.http_client.post(&self.signer_url).json(&request);
        if !account.key_ref.is_empty() {
            builder = builder.bearer_auth(&account.key_ref);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UltronError::SigningError(format!("Signer request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UltronError::SigningError(format!(
                "Signer returned HTTP {}",
                status
            )));
        }

        let body: SignTransactionResponse = response.json().await.map_err(|e| {
            UltronError::SigningError(format!("Failed to parse signer response: {}", e))
        })?;

        decode_sign_response(body)
    }
}

fn decode_sign_response(body: SignTransactionResponse) -> Result<SignedTransaction> {
    if let Some(error) = body.error {
        return Err(UltronError::SigningError(format!(
            "Signer rejected transaction: {}",
            error.message
        )));
    }

    match body.result {
        Some(SignResult::Raw(raw)) | Some(SignResult::Envelope { raw }) => {
            SignedTransaction::new(raw)
        }
        None => Err(UltronError::SigningError(
            "Signer returned no result".to_string(),
        )),
    }
}

#[derive(Serialize)]
struct SignTransactionRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [TransactionRequest; 1],
}

#[derive(Deserialize)]
struct SignTransactionResponse {
    result: Option<SignResult>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignResult {
    Raw(String),
    Envelope { raw: String },
}

#[derive(Deserialize)]
struct RpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}
