//! One-Class SVM over one batch.
//!
//! The nu-parameterized one-class formulation (Schölkopf et al., 2001):
//! separate the batch from the origin in feature space with maximal margin.
//! The dual is a small quadratic program over the kernel matrix, solved with
//! SMO-style pair updates. `nu` upper-bounds the fraction of training rows
//! falling outside the learned region.

use crate::estimator::{EstimatorError, FitMode, OutlierEstimator, INLIER_LABEL, OUTLIER_LABEL};
use ndarray::ArrayView2;

/// Alpha values closer than this to a box boundary count as being on it.
const ALPHA_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Rbf,
    Linear,
    Poly,
    Sigmoid,
}

/// Kernel coefficient for rbf, poly and sigmoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / (n_features * variance(batch))`.
    Scale,
    /// `1 / n_features`.
    Auto,
    /// Fixed positive value.
    Value(f64),
}

#[derive(Debug, Clone)]
pub struct OneClassSvmConfig {
    pub kernel: Kernel,
    /// Margin/outlier trade-off in (0, 1].
    pub nu: f64,
    /// Polynomial degree.
    pub degree: u32,
    pub gamma: Gamma,
    /// Independent term for poly and sigmoid kernels.
    pub coef0: f64,
    /// Solver stopping tolerance.
    pub tol: f64,
    /// Hard cap on SMO pair updates.
    pub max_iter: usize,
}

impl Default for OneClassSvmConfig {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            nu: 0.01,
            degree: 3,
            gamma: Gamma::Scale,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedSvm {
    /// Rows with non-zero dual coefficient.
    support: Vec<Vec<f64>>,
    alphas: Vec<f64>,
    rho: f64,
    gamma: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OneClassSvm {
    config: OneClassSvmConfig,
    model: Option<FittedSvm>,
}

impl OneClassSvm {
    pub fn new(config: OneClassSvmConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    fn kernel(&self, a: &[f64], b: &[f64], gamma: f64) -> f64 {
        let dot = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f64>();
        match self.config.kernel {
            Kernel::Linear => dot,
            Kernel::Rbf => {
                let dist_sq = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>();
                (-gamma * dist_sq).exp()
            }
            Kernel::Poly => (gamma * dot + self.config.coef0).powi(self.config.degree as i32),
            Kernel::Sigmoid => (gamma * dot + self.config.coef0).tanh(),
        }
    }

    fn resolve_gamma(&self, x: ArrayView2<'_, f64>) -> Result<f64, EstimatorError> {
        let d = x.ncols() as f64;
        Ok(match self.config.gamma {
            Gamma::Auto => 1.0 / d,
            Gamma::Scale => {
                let mean = x.iter().sum::<f64>() / (x.len() as f64);
                let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                    / (x.len() as f64);
                if var > 1e-12 { 1.0 / (d * var) } else { 1.0 }
            }
            Gamma::Value(g) => {
                if g <= 0.0 {
                    return Err(EstimatorError::InvalidInput(format!(
                        "gamma must be positive, got {}",
                        g
                    )));
                }
                g
            }
        })
    }
}

impl OutlierEstimator for OneClassSvm {
    fn name(&self) -> &str {
        "OneClassSVM"
    }

    fn fit_mode(&self) -> FitMode {
        FitMode::FitThenPredict
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), EstimatorError> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(EstimatorError::InvalidInput(
                "one-class SVM needs a non-empty batch".to_string(),
            ));
        }
        let nu = self.config.nu;
        if !(nu > 0.0 && nu <= 1.0) {
            return Err(EstimatorError::InvalidInput(format!(
                "nu {} is outside (0, 1]",
                nu
            )));
        }

        let gamma = self.resolve_gamma(x)?;
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();

        let mut k = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in i..n {
                let v = self.kernel(&rows[i], &rows[j], gamma);
                k[i][j] = v;
                k[j][i] = v;
            }
        }

        // Box constraint: 0 <= alpha_i <= 1/(nu n), sum alpha = 1.
        let c = 1.0 / (nu * n as f64);
        let mut alphas = vec![0.0f64; n];
        let mut remaining = 1.0;
        for a in alphas.iter_mut() {
            *a = c.min(remaining);
            remaining -= *a;
            if remaining <= 0.0 {
                break;
            }
        }

        // Gradient of the dual objective is K alpha.
        let mut grad: Vec<f64> = (0..n)
            .map(|i| (0..n).map(|j| k[i][j] * alphas[j]).sum())
            .collect();

        for _ in 0..self.config.max_iter {
            let mut up: Option<usize> = None;
            let mut low: Option<usize> = None;
            for i in 0..n {
                if alphas[i] < c - ALPHA_EPS && up.is_none_or(|u| grad[i] < grad[u]) {
                    up = Some(i);
                }
                if alphas[i] > ALPHA_EPS && low.is_none_or(|l| grad[i] > grad[l]) {
                    low = Some(i);
                }
            }
            let (Some(i), Some(j)) = (up, low) else { break };
            if grad[j] - grad[i] < self.config.tol {
                break;
            }

            let eta = (k[i][i] + k[j][j] - 2.0 * k[i][j]).max(1e-12);
            let delta = ((grad[j] - grad[i]) / eta)
                .min(c - alphas[i])
                .min(alphas[j]);
            if delta <= 0.0 {
                break;
            }

            alphas[i] += delta;
            alphas[j] -= delta;
            for t in 0..n {
                grad[t] += delta * (k[t][i] - k[t][j]);
            }
        }

        // Offset from the free support vectors, falling back to the KKT
        // midpoint when every alpha sits on a box boundary.
        let free: Vec<usize> = (0..n)
            .filter(|&i| alphas[i] > ALPHA_EPS && alphas[i] < c - ALPHA_EPS)
            .collect();
        let rho = if !free.is_empty() {
            free.iter().map(|&i| grad[i]).sum::<f64>() / free.len() as f64
        } else {
            let upper = (0..n)
                .filter(|&i| alphas[i] < c - ALPHA_EPS)
                .map(|i| grad[i])
                .fold(f64::INFINITY, f64::min);
            let lower = (0..n)
                .filter(|&i| alphas[i] > ALPHA_EPS)
                .map(|i| grad[i])
                .fold(f64::NEG_INFINITY, f64::max);
            match (upper.is_finite(), lower.is_finite()) {
                (true, true) => (upper + lower) / 2.0,
                (true, false) => upper,
                _ => lower,
            }
        };

        let mut support = Vec::new();
        let mut support_alphas = Vec::new();
        for i in 0..n {
            if alphas[i] > ALPHA_EPS {
                support.push(rows[i].clone());
                support_alphas.push(alphas[i]);
            }
        }

        self.model = Some(FittedSvm {
            support,
            alphas: support_alphas,
            rho,
            gamma,
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
                let decision = model
                    .support
                    .iter()
                    .zip(model.alphas.iter())
                    .map(|(sv, &a)| a * self.kernel(sv, &row, model.gamma))
                    .sum::<f64>()
                    - model.rho;
                if decision < 0.0 { OUTLIER_LABEL } else { INLIER_LABEL }
            })
            .collect())
    }
}
