//! Native batch outlier estimators.

pub mod elliptic;
pub mod isolation_forest;
pub mod lof;
pub mod one_class_svm;

// Re-exports for convenience
pub use elliptic::{EllipticEnvelope, EllipticEnvelopeConfig};
pub use isolation_forest::{IsolationForest, IsolationForestConfig, MaxSamples};
pub use lof::{LocalOutlierFactor, LofConfig};
pub use one_class_svm::{Gamma, Kernel, OneClassSvm, OneClassSvmConfig};

/// Expected share of outliers in a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contamination {
    /// Algorithm-specific default cutoff.
    Auto,
    /// Fixed share in (0, 0.5].
    Fraction(f64),
}

/// Smallest score still inside the top `fraction` share of `scores`
/// (higher score = more anomalous). Returns infinity when the share rounds
/// down to zero rows, so nothing qualifies.
pub(crate) fn top_fraction_cutoff(scores: &[f64], fraction: f64) -> f64 {
    let n = scores.len();
    let count = ((fraction * n as f64).ceil() as usize).min(n);
    if count == 0 {
        return f64::INFINITY;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    sorted[count - 1]
}
