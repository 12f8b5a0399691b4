use serde::{Deserialize, Serialize};

use crate::types::{PendingTransaction, U256};

/// Width of the classifier input.
pub const FEATURE_COUNT: usize = 4;

/// Column order of [`FeatureVector::to_array`].
///
/// This order is part of the classifier contract. Reordering it invalidates
/// every stored sample and every fitted model.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["value", "gas_price", "gas_limit", "max_fee_per_gas"];

/// Fixed-order projection of a pending transaction.
///
/// Fields keep the exact integer amounts so an accepted vector can be turned
/// back into an outgoing transaction without float rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
}

impl FeatureVector {
    /// Convert to array for model inference
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            wei_to_f64(self.value),
            self.gas_price as f64,
            self.gas_limit as f64,
            self.max_fee_per_gas as f64,
        ]
    }

    pub fn feature_count() -> usize {
        FEATURE_COUNT
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Nearest `f64` to a 256-bit amount; never overflows to infinity.
fn wei_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

impl From<&PendingTransaction> for FeatureVector {
    fn from(tx: &PendingTransaction) -> Self {
        Self {
            value: tx.value,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            max_fee_per_gas: tx.max_fee_per_gas.unwrap_or(0),
        }
    }
}
