use ultron_core::Result;

use crate::classifier::{validate_row, Model};
use crate::model::BootstrapRule;

/// Fixed threshold model used until the first forest is trained
#[derive(Debug, Clone, Copy)]
pub struct ThresholdModel {
    min_value: f64,
    min_gas_price: f64,
}

impl ThresholdModel {
    pub fn new(rule: BootstrapRule) -> Self {
        Self {
            min_value: rule.min_value_wei as f64,
            min_gas_price: rule.min_gas_price_wei as f64,
        }
    }
}

impl From<BootstrapRule> for ThresholdModel {
    fn from(rule: BootstrapRule) -> Self {
        Self::new(rule)
    }
}

impl Model for ThresholdModel {
    fn predict(&self, row: &[f64]) -> Result<bool> {
        validate_row(row)?;
        Ok(row[0] >= self.min_value && row[1] >= self.min_gas_price)
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}
