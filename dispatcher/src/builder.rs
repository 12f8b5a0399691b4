use tracing::debug;
use ultron_core::{Address, FeatureVector, OutgoingTransaction, Result, UltronError};

/// Largest gas limit accepted for a single transaction.
pub const BLOCK_GAS_CAP: u64 = 30_000_000;

/// Builds the counter-transaction for an accepted observation.
///
/// The transaction is a self-transfer: `to` is the sending account, while
/// value, gas and gas price are copied from the observed transaction.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    from: Address,
    nonce: u64,
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(from: Address) -> Self {
        Self {
            from,
            nonce: 0,
            chain_id: 0,
        }
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn build(&self, features: &FeatureVector) -> Result<OutgoingTransaction> {
        if features.gas_limit == 0 {
            return Err(UltronError::InvalidTransaction(
                "gas limit is zero".to_string(),
            ));
        }

        if features.gas_limit > BLOCK_GAS_CAP {
            return Err(UltronError::InvalidTransaction(format!(
                "gas limit {} exceeds block cap {}",
                features.gas_limit, BLOCK_GAS_CAP
            )));
        }

        if self.chain_id == 0 {
            return Err(UltronError::InvalidTransaction(
                "chain id not set".to_string(),
            ));
        }

        let tx = OutgoingTransaction {
            from: self.from,
            to: self.from,
            value: features.value,
            gas: features.gas_limit,
            gas_price: features.gas_price,
            nonce: self.nonce,
            chain_id: self.chain_id,
        };

        debug!(
            nonce = tx.nonce,
            chain_id = tx.chain_id,
            gas = tx.gas,
            "Built outgoing transaction"
        );

        Ok(tx)
    }
}
