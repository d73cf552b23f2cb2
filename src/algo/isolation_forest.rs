//! Isolation Forest over one batch.
//!
//! Random axis-parallel splits isolate anomalous rows in few steps, so a
//! short average path length across the forest marks an outlier (Liu et al.,
//! ICDM 2008). Scores are normalized against the expected path length of an
//! unsuccessful binary search, `2^(-E[h] / c(sample_size))`.

use crate::algo::{top_fraction_cutoff, Contamination};
use crate::estimator::{EstimatorError, FitMode, OutlierEstimator, INLIER_LABEL, OUTLIER_LABEL};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Score above which a row counts as an outlier under
/// [`Contamination::Auto`]. 0.5 is the normalized score of an average row.
const AUTO_SCORE_CUTOFF: f64 = 0.5;

/// Subsample size per tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxSamples {
    /// `min(256, rows)`.
    Auto,
    /// Fixed count, capped at the number of rows.
    Count(usize),
}

#[derive(Debug, Clone)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    pub contamination: Contamination,
    /// Seed for reproducible forests. Random when absent.
    pub random_state: Option<u64>,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: MaxSamples::Auto,
            contamination: Contamination::Auto,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    split_dim: usize,
    split_value: f64,
    /// Rows that ended up in this subtree during building.
    size: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(size: usize) -> Self {
        Self {
            split_dim: 0,
            split_value: 0.0,
            size,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    rng: StdRng,
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        let seed = config.random_state.unwrap_or_else(rand::random);
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            trees: Vec::new(),
            sample_size: 0,
        }
    }

    fn build_tree(rows: &[Vec<f64>], height: usize, limit: usize, rng: &mut StdRng) -> Node {
        let size = rows.len();
        if size <= 1 || height >= limit {
            return Node::leaf(size);
        }

        let dims = rows[0].len();
        let split_dim = rng.random_range(0..dims);

        let mut min_val = rows[0][split_dim];
        let mut max_val = min_val;
        for row in rows {
            min_val = min_val.min(row[split_dim]);
            max_val = max_val.max(row[split_dim]);
        }
        if (max_val - min_val).abs() < 1e-12 {
            return Node::leaf(size);
        }

        let split_value = rng.random::<f64>() * (max_val - min_val) + min_val;

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for row in rows {
            if row[split_dim] < split_value {
                left_rows.push(row.clone());
            } else {
                right_rows.push(row.clone());
            }
        }
        if left_rows.is_empty() || right_rows.is_empty() {
            return Node::leaf(size);
        }

        Node {
            split_dim,
            split_value,
            size,
            left: Some(Box::new(Self::build_tree(&left_rows, height + 1, limit, rng))),
            right: Some(Box::new(Self::build_tree(&right_rows, height + 1, limit, rng))),
        }
    }

    fn path_length(node: &Node, row: &[f64], depth: f64) -> f64 {
        if node.is_leaf() {
            // A multi-row leaf continues as an average unbuilt subtree.
            return depth + average_path_length(node.size);
        }
        if row[node.split_dim] < node.split_value {
            match &node.left {
                Some(left) => Self::path_length(left, row, depth + 1.0),
                None => depth,
            }
        } else {
            match &node.right {
                Some(right) => Self::path_length(right, row, depth + 1.0),
                None => depth,
            }
        }
    }

    /// Normalized anomaly score per row, in (0, 1).
    fn scores(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>, EstimatorError> {
        if self.trees.is_empty() {
            return Err(EstimatorError::NotFitted);
        }
        let norm = average_path_length(self.sample_size);
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let row: Vec<f64> = row.to_vec();
                let mean_path = self
                    .trees
                    .iter()
                    .map(|t| Self::path_length(t, &row, 0.0))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                if norm > 0.0 {
                    2f64.powf(-mean_path / norm)
                } else {
                    1.0
                }
            })
            .collect())
    }
}

/// Expected path length of an unsuccessful search in a binary tree over `n`
/// rows.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + 0.577_215_664_9) - 2.0 * (n - 1.0) / n
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationForestConfig::default())
    }
}

impl OutlierEstimator for IsolationForest {
    fn name(&self) -> &str {
        "IsolationForest"
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::FitThenPredict
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), EstimatorError> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(EstimatorError::InvalidInput(
                "isolation forest needs a non-empty batch".to_string(),
            ));
        }

        self.sample_size = match self.config.max_samples {
            MaxSamples::Auto => n.min(256),
            MaxSamples::Count(c) => c.min(n).max(1),
        };
        let height_limit = (self.sample_size as f64).log2().ceil().max(1.0) as usize;

        self.trees.clear();
        for _ in 0..self.config.n_estimators {
            let picked = index::sample(&mut self.rng, n, self.sample_size);
            let rows: Vec<Vec<f64>> = picked.iter().map(|i| x.row(i).to_vec()).collect();
            self.trees
                .push(Self::build_tree(&rows, 0, height_limit, &mut self.rng));
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        let scores = self.scores(x)?;
        let cutoff = match self.config.contamination {
            Contamination::Auto => AUTO_SCORE_CUTOFF,
            Contamination::Fraction(f) => {
                if !(f > 0.0 && f <= 0.5) {
                    return Err(EstimatorError::InvalidInput(format!(
                        "contamination fraction {} is outside (0, 0.5]",
                        f
                    )));
                }
                top_fraction_cutoff(&scores, f)
            }
        };
        Ok(scores
            .iter()
            .map(|&s| match self.config.contamination {
                Contamination::Auto if s > cutoff => OUTLIER_LABEL,
                Contamination::Fraction(_) if s >= cutoff => OUTLIER_LABEL,
                _ => INLIER_LABEL,
            })
            .collect())
    }
}
