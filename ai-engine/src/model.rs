use serde::{Deserialize, Serialize};

/// Number of samples that must be buffered before a retrain is attempted
pub const DEFAULT_RETRAIN_THRESHOLD: usize = 1000;

/// Share of the buffer held out for accuracy scoring
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub retrain_threshold: usize,
    pub test_fraction: f64,

    /// Fixed seed for the train/held-out shuffle and the forest.
    /// `None` draws fresh entropy on every retrain.
    pub seed: Option<u64>,

    pub forest: ForestConfig,

    /// Rule used as the model until the first successful retrain.
    /// Without it the gate starts untrained and rejects everything.
    pub bootstrap: Option<BootstrapRule>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: None,
            forest: ForestConfig::default(),
            bootstrap: None,
        }
    }
}

impl GateConfig {
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.retrain_threshold = threshold.max(1);
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.forest.seed = Some(seed);
        self
    }

    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    pub fn with_bootstrap(mut self, rule: BootstrapRule) -> Self {
        self.bootstrap = Some(rule);
        self
    }
}

/// Random forest hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` means `sqrt(feature_count)`.
    pub max_features: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 2,
            max_features: None,
            seed: None,
        }
    }
}

impl ForestConfig {
    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Threshold rule approving transactions above both floors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRule {
    pub min_value_wei: u64,
    pub min_gas_price_wei: u64,
}
