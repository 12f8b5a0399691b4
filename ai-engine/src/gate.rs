//! Classifier Gate
//!
//! Owns the current model and the training buffer. Predictions read an
//! immutable model snapshot; a retrain builds a new model off the async
//! runtime and swaps the snapshot in one step.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use ultron_core::{FeatureVector, Result, UltronError};

use crate::classifier::{accuracy, train_test_split, Model, Sample, Trainer};
use crate::forest::RandomForestTrainer;
use crate::heuristic::ThresholdModel;
use crate::model::GateConfig;

/// Outcome of a retrain attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    ModelRetrained {
        /// Held-out accuracy in [0, 1]
        accuracy: f64,
        samples: usize,
        generation: u64,
    },
    RetrainFailed {
        reason: String,
        samples: usize,
    },
}

impl GateEvent {
    /// Human-readable line for the notification channel
    pub fn message(&self) -> String {
        match self {
            GateEvent::ModelRetrained { accuracy, .. } => {
                format!("🤖 Model retrained! Accuracy: {:.2}%", accuracy * 100.0)
            }
            GateEvent::RetrainFailed { reason, samples } => {
                format!("⚠️ Model retrain failed on {} samples: {}", samples, reason)
            }
        }
    }
}

pub struct ClassifierGate {
    config: GateConfig,
    trainer: Arc<dyn Trainer>,
    model: RwLock<Option<Arc<dyn Model>>>,
    buffer: Mutex<Vec<Sample>>,
    generation: AtomicU64,
    // Serializes retrains; predictions never take it
    retrain: tokio::sync::Mutex<()>,
}

impl ClassifierGate {
    /// Gate backed by the random forest trainer.
    ///
    /// Starts with the bootstrap rule as its model when one is configured,
    /// otherwise untrained.
    pub fn new(config: GateConfig) -> Self {
        let trainer = Arc::new(RandomForestTrainer::new(config.forest.clone()));
        Self::with_trainer(config, trainer)
    }

    pub fn with_trainer(config: GateConfig, trainer: Arc<dyn Trainer>) -> Self {
        let model = config
            .bootstrap
            .map(|rule| Arc::new(ThresholdModel::new(rule)) as Arc<dyn Model>);

        if model.is_some() {
            info!("🧭 Classifier gate starting with bootstrap threshold model");
        } else {
            info!("🧭 Classifier gate starting untrained (rejects until first retrain)");
        }

        Self {
            config,
            trainer,
            model: RwLock::new(model),
            buffer: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            retrain: tokio::sync::Mutex::new(()),
        }
    }

    /// Gate with an already fitted model in place
    pub fn with_model(
        config: GateConfig,
        trainer: Arc<dyn Trainer>,
        model: Arc<dyn Model>,
    ) -> Self {
        let gate = Self::with_trainer(config, trainer);
        *gate.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
        gate
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Accept or reject one candidate.
    ///
    /// Never fails: an untrained, erroring or panicking model yields `false`.
    /// Every call appends exactly one sample labeled with the returned value.
    pub fn predict(&self, features: &FeatureVector) -> bool {
        let label = match self.current_model() {
            None => false,
            Some(model) => {
                let row = features.to_array();
                match panic::catch_unwind(AssertUnwindSafe(|| model.predict(&row))) {
                    Ok(Ok(label)) => label,
                    Ok(Err(e)) => {
                        warn!(model = model.name(), error = %e, "Prediction failed, rejecting");
                        false
                    }
                    Err(_) => {
                        error!(model = model.name(), "Model panicked during prediction, rejecting");
                        false
                    }
                }
            }
        };

        self.lock_buffer().push(Sample {
            features: *features,
            label,
        });

        label
    }

    /// Retrain once the buffer holds at least `retrain_threshold` samples.
    ///
    /// Returns `None` below the threshold. On failure the previous model
    /// stays in place.
    pub async fn maybe_retrain(&self) -> Option<GateEvent> {
        let _guard = self.retrain.lock().await;

        let samples = self.samples();
        let count = samples.len();
        if count < self.config.retrain_threshold {
            debug!(
                buffered = count,
                threshold = self.config.retrain_threshold,
                "Retrain threshold not reached"
            );
            return None;
        }

        info!("🔁 Retraining classifier on {} samples", count);
        let start = Instant::now();

        let trainer = Arc::clone(&self.trainer);
        let test_fraction = self.config.test_fraction;
        let seed = self.config.seed;
        let fitted = tokio::task::spawn_blocking(move || {
            panic::catch_unwind(AssertUnwindSafe(|| {
                fit_and_score(trainer.as_ref(), &samples, test_fraction, seed)
            }))
        })
        .await;

        let outcome = match fitted {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UltronError::TrainingError("trainer panicked".to_string())),
            Err(e) => Err(UltronError::TrainingError(format!("training task failed: {}", e))),
        };

        match outcome {
            Ok((model, accuracy)) => {
                let name = model.name();
                *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

                info!(
                    model = name,
                    samples = count,
                    generation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "✅ Model retrained, accuracy {:.2}%",
                    accuracy * 100.0
                );

                Some(GateEvent::ModelRetrained {
                    accuracy,
                    samples: count,
                    generation,
                })
            }
            Err(e) => {
                warn!(samples = count, error = %e, "Retrain failed, keeping previous model");
                Some(GateEvent::RetrainFailed {
                    reason: e.to_string(),
                    samples: count,
                })
            }
        }
    }

    /// Drop every buffered sample. The current model is kept.
    pub fn reset(&self) {
        let mut buffer = self.lock_buffer();
        info!("Training buffer reset ({} samples discarded)", buffer.len());
        buffer.clear();
    }

    pub fn buffer_len(&self) -> usize {
        self.lock_buffer().len()
    }

    pub fn is_trained(&self) -> bool {
        self.current_model().is_some()
    }

    /// Number of successful retrains so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn model_name(&self) -> Option<&'static str> {
        self.current_model().map(|m| m.name())
    }

    /// Copy of the training buffer in insertion order
    pub fn samples(&self) -> Vec<Sample> {
        self.lock_buffer().clone()
    }

    fn current_model(&self) -> Option<Arc<dyn Model>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Split, fit on the training side and score on the held-out side.
fn fit_and_score(
    trainer: &dyn Trainer,
    samples: &[Sample],
    test_fraction: f64,
    seed: Option<u64>,
) -> Result<(Arc<dyn Model>, f64)> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (train, test) = train_test_split(samples, test_fraction, &mut rng);
    if train.is_empty() {
        return Err(UltronError::TrainingError(
            "training split is empty".to_string(),
        ));
    }

    let model: Arc<dyn Model> = Arc::from(trainer.fit(&train)?);
    let scored_on = if test.is_empty() { &train } else { &test };
    let accuracy = accuracy(model.as_ref(), scored_on)?;

    Ok((model, accuracy))
}
