//! Windowed batch anomaly detection over data streams.
//!
//! A weir is a low barrier built across a stream; this one catches outliers.
//! The crate adapts batch-mode outlier estimators to streaming use: incoming
//! instances are collected in a bounded window (non-overlapping blocks or a
//! sliding window), and every ready window is handed to the estimator in one
//! fit/predict pass. Rows labelled `-1` are raised as anomaly events through
//! a caller-owned sink.
//!
//! The estimators in [`algo`] follow the classic outlier-detection lineup:
//! Local Outlier Factor, Isolation Forest, One-Class SVM and Elliptic
//! Envelope. Anything implementing [`OutlierEstimator`] plugs into the same
//! detector.

pub mod algo;
pub mod detector;
pub mod estimator;
pub mod event;
pub mod stream;
pub mod window;

pub use detector::{ConfigError, DetectorConfig, DetectorError, WindowedDetector};
pub use estimator::{EstimatorError, FitMode, OutlierEstimator, INLIER_LABEL, OUTLIER_LABEL};
pub use event::{AnomalyEvent, EventSink};
pub use stream::StreamInstance;
pub use window::{InstanceWindow, WindowError, WindowState};
