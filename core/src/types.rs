use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::primitives::TxKind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, UltronError};

pub use alloy::primitives::{Address, Bytes, TxHash, U256};
pub use alloy::rpc::types::TransactionRequest;

// ================================================================================================
// Networks
// ================================================================================================

/// Network identifier such as `ETH` or `ARBITRUM`.
///
/// Identifiers are case-insensitive on input and always stored upper-cased, so
/// `eth` from an environment variable and `ETH` from a config file name the
/// same network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// A configured network. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub rpc_url: String,
    /// Expected chain id. When set, the liveness check rejects endpoints
    /// reporting a different one.
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl Network {
    pub fn new(id: impl AsRef<str>, rpc_url: impl Into<String>) -> Self {
        Self {
            id: NetworkId::new(id),
            rpc_url: rpc_url.into(),
            chain_id: None,
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// Lifecycle of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Unverified,
    Healthy,
    Failed,
}

impl ConnectionState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionState::Healthy)
    }
}

// ================================================================================================
// Transactions
// ================================================================================================

/// Transaction observed in a network's pending block. Lives for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub max_fee_per_gas: Option<u128>,
}

impl PendingTransaction {
    /// Project any typed transaction body.
    ///
    /// Dynamic-fee transactions may omit `gasPrice` while still in the pool;
    /// their fee cap stands in for it.
    pub fn from_consensus<T: ConsensusTransaction>(tx: &T) -> Self {
        let max_fee_per_gas = tx.is_dynamic_fee().then(|| tx.max_fee_per_gas());
        Self {
            value: tx.value(),
            gas_price: tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas()),
            gas_limit: tx.gas_limit(),
            max_fee_per_gas,
        }
    }
}

/// Counter-transaction built for an accepted observation. Single use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

impl OutgoingTransaction {
    /// Legacy transaction request, the `eth_signTransaction` parameter shape.
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest {
            from: Some(self.from),
            to: Some(TxKind::Call(self.to)),
            value: Some(self.value),
            gas: Some(self.gas),
            gas_price: Some(self.gas_price),
            nonce: Some(self.nonce),
            chain_id: Some(self.chain_id),
            ..Default::default()
        }
    }
}

/// Signed raw payload ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub raw: Bytes,
}

impl SignedTransaction {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = Bytes::from_str(raw.as_ref().trim()).map_err(|_| {
            UltronError::SigningError("signer returned a payload that is not hex".to_string())
        })?;
        if raw.is_empty() {
            return Err(UltronError::SigningError(
                "signer returned an empty payload".to_string(),
            ));
        }
        Ok(Self { raw })
    }
}
