//! Random forest trainer
//!
//! Bagged CART trees split on Gini impurity, each split drawing a random
//! subset of the feature columns. Trees vote; ties reject.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use ultron_core::{Result, UltronError, FEATURE_COUNT};

use crate::classifier::{validate_row, Model, Sample, Trainer};
use crate::model::ForestConfig;

pub struct RandomForestTrainer {
    config: ForestConfig,
}

impl RandomForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    fn max_features(&self) -> usize {
        self.config
            .max_features
            .unwrap_or_else(|| (FEATURE_COUNT as f64).sqrt().round() as usize)
            .clamp(1, FEATURE_COUNT)
    }
}

impl Default for RandomForestTrainer {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl Trainer for RandomForestTrainer {
    fn fit(&self, samples: &[Sample]) -> Result<Box<dyn Model>> {
        if samples.is_empty() {
            return Err(UltronError::TrainingError(
                "cannot fit on an empty training split".to_string(),
            ));
        }

        let positives = samples.iter().filter(|s| s.label).count();
        if positives == 0 || positives == samples.len() {
            return Err(UltronError::TrainingError(format!(
                "training split contains a single class ({} samples, all {})",
                samples.len(),
                positives > 0
            )));
        }

        let mut flat = Vec::with_capacity(samples.len() * FEATURE_COUNT);
        for sample in samples {
            let row = sample.features.to_array();
            validate_row(&row).map_err(|e| UltronError::TrainingError(e.to_string()))?;
            flat.extend_from_slice(&row);
        }
        let x = Array2::from_shape_vec((samples.len(), FEATURE_COUNT), flat)
            .map_err(|e| UltronError::TrainingError(format!("design matrix: {}", e)))?;
        let y: Vec<bool> = samples.iter().map(|s| s.label).collect();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let builder = TreeBuilder {
            x: &x,
            y: &y,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
            max_features: self.max_features(),
        };

        let n = samples.len();
        let trees: Vec<Node> = (0..self.config.n_trees.max(1))
            .map(|_| {
                let mut bag: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                builder.build(&mut bag, 0, &mut rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            samples = n,
            positives,
            "Random forest fitted"
        );

        Ok(Box::new(RandomForest { trees }))
    }
}

/// Fitted forest
pub struct RandomForest {
    trees: Vec<Node>,
}

impl RandomForest {
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Model for RandomForest {
    fn predict(&self, row: &[f64]) -> Result<bool> {
        validate_row(row)?;
        let votes = self.trees.iter().filter(|tree| tree.predict(row)).count();
        Ok(votes * 2 > self.trees.len())
    }

    fn name(&self) -> &'static str {
        "random_forest"
    }
}

enum Node {
    Leaf {
        positive: bool,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> bool {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { positive } => return *positive,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [bool],
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> Node {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| self.y[i]).count();
        let leaf = Node::Leaf {
            positive: positives * 2 > n,
        };

        if positives == 0 || positives == n || depth >= self.max_depth || n < self.min_samples_split
        {
            return leaf;
        }

        let candidates = rand::seq::index::sample(rng, FEATURE_COUNT, self.max_features).into_vec();
        let Some((feature, threshold)) = self.best_split(indices, positives, &candidates) else {
            return leaf;
        };

        let mut mid = 0;
        for k in 0..n {
            if self.x[[indices[k], feature]] <= threshold {
                indices.swap(k, mid);
                mid += 1;
            }
        }
        if mid == 0 || mid == n {
            return leaf;
        }

        let (left, right) = indices.split_at_mut(mid);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(left, depth + 1, rng)),
            right: Box::new(self.build(right, depth + 1, rng)),
        }
    }

    /// Lowest weighted Gini split among `candidates`, if any improves on the parent.
    fn best_split(
        &self,
        indices: &[usize],
        positives: usize,
        candidates: &[usize],
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let mut best_impurity = gini(positives, n);
        let mut best = None;

        for &feature in candidates {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left_pos = 0usize;
            for k in 0..n - 1 {
                if self.y[order[k]] {
                    left_pos += 1;
                }

                let value = self.x[[order[k], feature]];
                let next = self.x[[order[k + 1], feature]];
                if value == next {
                    continue;
                }

                let left_n = k + 1;
                let right_n = n - left_n;
                let impurity = (left_n as f64 * gini(left_pos, left_n)
                    + right_n as f64 * gini(positives - left_pos, right_n))
                    / n as f64;

                if impurity + f64::EPSILON < best_impurity {
                    best_impurity = impurity;
                    let midpoint = value + (next - value) / 2.0;
                    let threshold = if midpoint < next { midpoint } else { value };
                    best = Some((feature, threshold));
                }
            }
        }

        best
    }
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}
