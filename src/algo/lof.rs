//! Local Outlier Factor over one batch.
//!
//! Classic k-nearest-neighbour density ratio (Breunig et al., SIGMOD 2000):
//! a row whose local reachability density is much lower than that of its
//! neighbours sits in a sparser region than they do and is flagged as an
//! outlier. The factor is recomputed from scratch on every batch; there is
//! no model to keep between calls, which is why this estimator only exposes
//! `fit_predict`.

use crate::algo::{top_fraction_cutoff, Contamination};
use crate::estimator::{EstimatorError, FitMode, OutlierEstimator, INLIER_LABEL, OUTLIER_LABEL};
use ndarray::ArrayView2;

/// Ratio above which a row counts as an outlier under
/// [`Contamination::Auto`]. A factor near 1 means the row is as dense as its
/// neighbours.
const AUTO_RATIO_CUTOFF: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct LofConfig {
    /// Neighbourhood size. Capped at `rows - 1` per batch.
    pub n_neighbors: usize,
    pub contamination: Contamination,
}

impl Default for LofConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 10,
            contamination: Contamination::Auto,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalOutlierFactor {
    config: LofConfig,
}

impl LocalOutlierFactor {
    pub fn new(config: LofConfig) -> Self {
        Self { config }
    }

    /// Outlier factor per row, higher = sparser than its neighbourhood.
    fn factors(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>, EstimatorError> {
        let n = x.nrows();
        if n < 2 {
            return Err(EstimatorError::InvalidInput(format!(
                "LOF needs at least 2 rows, got {}",
                n
            )));
        }
        let k = self.config.n_neighbors.min(n - 1).max(1);

        let mut dist = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = x
                    .row(i)
                    .iter()
                    .zip(x.row(j).iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                dist[i][j] = d;
                dist[j][i] = d;
            }
        }

        let mut neighbors = vec![Vec::with_capacity(k); n];
        let mut k_dist = vec![0.0f64; n];
        for i in 0..n {
            let mut order: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            order.sort_by(|&a, &b| {
                dist[i][a]
                    .partial_cmp(&dist[i][b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            order.truncate(k);
            k_dist[i] = dist[i][order[k - 1]];
            neighbors[i] = order;
        }

        let lrd: Vec<f64> = (0..n)
            .map(|i| {
                let mean_reach = neighbors[i]
                    .iter()
                    .map(|&j| k_dist[j].max(dist[i][j]))
                    .sum::<f64>()
                    / k as f64;
                1.0 / (mean_reach + 1e-10)
            })
            .collect();

        Ok((0..n)
            .map(|i| {
                let neighbor_lrd = neighbors[i].iter().map(|&j| lrd[j]).sum::<f64>() / k as f64;
                neighbor_lrd / lrd[i]
            })
            .collect())
    }

    fn labels(&self, factors: &[f64]) -> Result<Vec<i32>, EstimatorError> {
        let cutoff = match self.config.contamination {
            Contamination::Auto => AUTO_RATIO_CUTOFF,
            Contamination::Fraction(f) => {
                if !(f > 0.0 && f <= 0.5) {
                    return Err(EstimatorError::InvalidInput(format!(
                        "contamination fraction {} is outside (0, 0.5]",
                        f
                    )));
                }
                top_fraction_cutoff(factors, f)
            }
        };
        Ok(factors
            .iter()
            .map(|&lof| match self.config.contamination {
                Contamination::Auto if lof > cutoff => OUTLIER_LABEL,
                Contamination::Fraction(_) if lof >= cutoff => OUTLIER_LABEL,
                _ => INLIER_LABEL,
            })
            .collect())
    }
}

impl OutlierEstimator for LocalOutlierFactor {
    fn name(&self) -> &str {
        "LocalOutlierFactor"
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::FitPredict
    }

    fn fit(&mut self, _x: ArrayView2<'_, f64>) -> Result<(), EstimatorError> {
        Err(EstimatorError::Unsupported("fit"))
    }

    fn predict(&self, _x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        Err(EstimatorError::Unsupported("predict"))
    }

    fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        let factors = self.factors(x)?;
        self.labels(&factors)
    }
}
