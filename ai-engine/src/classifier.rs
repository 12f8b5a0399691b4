//! Model and trainer seams of the classifier gate

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use ultron_core::{FeatureVector, Result, UltronError, FEATURE_COUNT};

/// Feature vector paired with the label the gate gave it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub features: FeatureVector,
    pub label: bool,
}

/// Fitted binary classifier.
///
/// Implementations are immutable once built; the gate swaps whole models
/// instead of mutating one.
pub trait Model: Send + Sync {
    /// Classify one row laid out as [`FeatureVector::to_array`].
    fn predict(&self, row: &[f64]) -> Result<bool>;

    fn name(&self) -> &'static str;
}

/// Produces a fresh model from labeled samples
pub trait Trainer: Send + Sync {
    fn fit(&self, samples: &[Sample]) -> Result<Box<dyn Model>>;
}

/// Reject rows a model cannot score.
pub fn validate_row(row: &[f64]) -> Result<()> {
    if row.len() != FEATURE_COUNT {
        return Err(UltronError::InferenceError(format!(
            "expected {} features, got {}",
            FEATURE_COUNT,
            row.len()
        )));
    }
    if let Some(index) = row.iter().position(|v| !v.is_finite()) {
        return Err(UltronError::InferenceError(format!(
            "feature {} is not finite",
            index
        )));
    }
    Ok(())
}

/// Shuffle and split into (train, held-out).
///
/// The held-out side gets `ceil(len * test_fraction)` samples.
pub fn train_test_split(
    samples: &[Sample],
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<Sample>, Vec<Sample>) {
    let mut shuffled = samples.to_vec();
    shuffled.shuffle(rng);

    let test_len = ((shuffled.len() as f64) * test_fraction).ceil() as usize;
    let test_len = test_len.min(shuffled.len());
    let test = shuffled.split_off(shuffled.len() - test_len);

    (shuffled, test)
}

/// Fraction of `samples` the model labels correctly, in [0, 1].
pub fn accuracy(model: &dyn Model, samples: &[Sample]) -> Result<f64> {
    if samples.is_empty() {
        return Err(UltronError::TrainingError(
            "held-out split is empty".to_string(),
        ));
    }

    let mut correct = 0usize;
    for sample in samples {
        if model.predict(&sample.features.to_array())? == sample.label {
            correct += 1;
        }
    }

    Ok(correct as f64 / samples.len() as f64)
}
