pub mod classifier;
pub mod forest; // 100-tree bagged CART
pub mod gate;
pub mod heuristic;
pub mod model;

pub use classifier::{accuracy, train_test_split, Model, Sample, Trainer};
pub use forest::{RandomForest, RandomForestTrainer};
pub use gate::{ClassifierGate, GateEvent};
pub use heuristic::ThresholdModel;
pub use model::{
    BootstrapRule, ForestConfig, GateConfig, DEFAULT_RETRAIN_THRESHOLD, DEFAULT_TEST_FRACTION,
};
