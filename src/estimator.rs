//! Batch outlier estimator capability consumed by the windowed detector.
//!
//! Estimators follow the fit/predict convention for outlier detection: every
//! row of a batch gets a label, and a label of exactly `-1` marks the row as
//! an outlier. Any other value is normal.

use ndarray::ArrayView2;
use std::fmt;

/// Label an estimator assigns to an outlier row. Exactly `-1`, never merely
/// "negative".
pub const OUTLIER_LABEL: i32 = -1;

/// Label an estimator assigns to a normal row.
pub const INLIER_LABEL: i32 = 1;

/// How an estimator is driven during a detection pass. Queried once when a
/// detector is constructed, never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// `fit` over the batch, then `predict` over the same batch.
    FitThenPredict,
    /// Single combined `fit_predict`; the separate pair is unsupported.
    FitPredict,
}

/// Failure raised by an estimator during a detection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// The batch cannot be fitted (degenerate data, solver failure).
    FitFailed(String),
    /// The batch shape does not meet the estimator's requirements.
    InvalidInput(String),
    /// `predict` was called before a successful `fit`.
    NotFitted,
    /// The called method is not part of this estimator's capability.
    Unsupported(&'static str),
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FitFailed(e) => write!(f, "fit failed: {}", e),
            Self::InvalidInput(e) => write!(f, "invalid input: {}", e),
            Self::NotFitted => write!(f, "predict called before fit"),
            Self::Unsupported(method) => {
                write!(f, "method '{}' is outside this estimator's capability", method)
            }
        }
    }
}

impl std::error::Error for EstimatorError {}

/// A batch outlier estimator.
///
/// Implementations expose either the separate `fit`/`predict` pair
/// ([`FitMode::FitThenPredict`]) or only the combined `fit_predict`
/// ([`FitMode::FitPredict`]); `fit_mode` states which, and the unsupported
/// methods return [`EstimatorError::Unsupported`].
pub trait OutlierEstimator {
    /// Estimator name, used on raised events and in logs.
    fn name(&self) -> &str;

    /// Fit capability, stable for the estimator's lifetime.
    fn fit_mode(&self) -> FitMode;

    /// Fit the model to the batch.
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), EstimatorError>;

    /// Label every row of the batch.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError>;

    /// Combined fit and label over one batch.
    fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        self.fit(x)?;
        self.predict(x)
    }
}

impl<T: OutlierEstimator + ?Sized> OutlierEstimator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fit_mode(&self) -> FitMode {
        (**self).fit_mode()
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<(), EstimatorError> {
        (**self).fit(x)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        (**self).predict(x)
    }

    fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<i32>, EstimatorError> {
        (**self).fit_predict(x)
    }
}
