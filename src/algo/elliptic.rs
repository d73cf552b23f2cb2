//! Elliptic envelope over one batch.
//!
//! Fits a Gaussian-shaped region to the batch: mean plus covariance, with one
//! trimming step that re-estimates both from the most central rows. Rows
//! whose squared Mahalanobis distance lands in the top `contamination` share
//! of the training distances are outliers.

use crate::algo::top_fraction_cutoff;
use crate::estimator::{EstimatorError, FitMode, OutlierEstimator, INLIER_LABEL, OUTLIER_LABEL};
use ndarray::ArrayView2;

#[derive(Debug, Clone)]
pub struct EllipticEnvelopeConfig {
    /// Share of training rows treated as outliers, in (0, 0.5].
    pub contamination: f64,
    /// Share of rows kept by the trimming step. `None` selects
    /// `(n + d + 1) / 2n`, the usual minimum-covariance-determinant choice.
    pub support_fraction: Option<f64>,
}

impl Default for EllipticEnvelopeConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            support_fraction: None,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedEnvelope {
    mean: Vec<f64>,
    inv_cov: Vec<Vec<f64>>,
    /// Squared-distance cutoff derived from the training batch.
    threshold: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EllipticEnvelope {
    config: EllipticEnvelopeConfig,
    model: Option<FittedEnvelope>,
}

impl EllipticEnvelope {
    pub fn new(config: EllipticEnvelopeConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    fn location_and_precision(
        rows: &[Vec<f64>],
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>), EstimatorError> {
        let n = rows.len();
        let d = rows[0].len();
        let nf = n as f64;

        let mut mean = vec![0.0f64; d];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= nf;
        }

        let mut cov = vec![vec![0.0f64; d]; d];
        for row in rows {
            for i in 0..d {
                for j in 0..d {
                    cov[i][j] += (row[i] - mean[i]) * (row[j] - mean[j]);
                }
            }
        }
        for ci in cov.iter_mut() {
            for v in ci.iter_mut() {
                *v /= nf - 1.0;
            }
        }

        // Degenerate batches get a ridge on the diagonal until the matrix
        // inverts.
        let trace = (0..d).map(|i| cov[i][i]).sum::<f64>().max(1e-12);
        let mut ridge = 0.0;
        for _ in 0..6 {
            let mut jittered = cov.clone();
            for (i, row) in jittered.iter_mut().enumerate() {
                row[i] += ridge;
            }
            if let Some(inv) = invert(&jittered) {
                return Ok((mean, inv));
            }
            ridge = if ridge == 0.0 {
                1e-6 * trace / d as f64
            } else {
                ridge * 100.0
            };
        }
        Err(EstimatorError::FitFailed(
            "covariance matrix is not invertible".to_string(),
        ))
    }

    fn distance_sq(mean: &[f64], inv_cov: &[Vec<f64>], row: &[f64]) -> f64 {
        let d = mean.len();
        let diff: Vec<f64> = (0..d).map(|i| row[i] - mean[i]).collect();
        let mut total = 0.0;
        for i in 0..d {
            for j in 0..d {
                total += diff[i] * inv_cov[i][j] * diff[j];
            }
        }
        total
    }
}

/// Gauss-Jordan inversion with partial pivoting. `None` when singular.
fn invert(m: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let d = m.len();
    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..d).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..d {
        let pivot_row = (col..d).max_by(|&a, &b| {
            aug[a][col]
                .abs()
                .partial_cmp(&aug[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if aug[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        let pivot_line = aug[col].clone();
        for (row, line) in aug.iter_mut().enumerate() {
            if row == col {
                continue;
            }
            let factor = line[col];
            if factor == 0.0 {
                continue;
            }
            for (v, p) in line.iter_mut().zip(pivot_line.iter()) {
                *v -= factor * p;
            }
        }
    }

    Some(aug.into_iter().map(|r| r[d..].to_vec()).collect())
}

impl OutlierEstimator for EllipticEnvelope {
    fn name(&self) -> &str {
        "EllipticEnvelope"
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::FitThenPredict
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), EstimatorError> {
        let n = x.nrows();
        let d = x.ncols();
        if n < 2 || d == 0 {
            return Err(EstimatorError::InvalidInput(format!(
                "elliptic envelope needs at least 2 rows, got {}",
                n
            )));
        }
        let contamination = self.config.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(EstimatorError::InvalidInput(format!(
                "contamination {} is outside (0, 0.5]",
                contamination
            )));
        }

        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let (mean, inv_cov) = Self::location_and_precision(&rows)?;
        let mut distances: Vec<f64> = rows
            .iter()
            .map(|r| Self::distance_sq(&mean, &inv_cov, r))
            .collect();

        // One trimming step: re-estimate from the most central rows so a
        // planted outlier does not inflate its own envelope.
        let lower = (d + 1).min(n);
        let keep = match self.config.support_fraction {
            Some(f) => ((f * n as f64).ceil() as usize).clamp(lower, n),
            None => ((n + d + 1) / 2).clamp(lower, n),
        };
        let (mean, inv_cov) = if keep < n {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                distances[a]
                    .partial_cmp(&distances[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let central: Vec<Vec<f64>> =
                order[..keep].iter().map(|&i| rows[i].clone()).collect();
            let (mean, inv_cov) = Self::location_and_precision(&central)?;
            distances = rows
                .iter()
                .map(|r| Self::distance_sq(&mean, &inv_cov, r))
                .collect();
            (mean, inv_cov)
        } else {
            (mean, inv_cov)
        };

        let threshold = top_fraction_cutoff(&distances, contamination);
        self.model = Some(FittedEnvelope {
            mean,
            inv_cov,
            threshold,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        let Some(model) = &self.model else {
            return Err(EstimatorError::NotFitted);
        };
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let row: Vec<f64> = row.to_vec();
                let d_sq = Self::distance_sq(&model.mean, &model.inv_cov, &row);
                if d_sq >= model.threshold {
                    OUTLIER_LABEL
                } else {
                    INLIER_LABEL
                }
            })
            .collect())
    }
}
