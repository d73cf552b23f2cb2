//! Windowed batch detection task.
//!
//! A [`WindowedDetector`] buffers incoming stream instances in an
//! [`InstanceWindow`], runs the wrapped estimator over every ready window in
//! one fit/predict pass, and raises an anomaly event for every flagged row.
//! In sliding mode a physical instance is reported at most once across its
//! whole residency in the window.

use crate::estimator::{EstimatorError, FitMode, OutlierEstimator, OUTLIER_LABEL};
use crate::event::{AnomalyEvent, EventSink};
use crate::stream::StreamInstance;
use crate::window::{InstanceWindow, WindowError, WindowState};
use std::fmt;
use tracing::debug;

/// Construction-time options for a windowed detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Number of instances buffered as the basis for one detection pass.
    pub window_capacity: usize,
    /// Detection step rate in `[1, window_capacity]`. Equal to the capacity
    /// selects block mode; anything smaller selects sliding mode.
    pub detection_step_rate: usize,
    /// Passed through on every raised event; downstream consumers may merge
    /// the flagged rows of one pass into a group anomaly.
    pub group_events: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_capacity: 20,
            detection_step_rate: 1,
            group_events: true,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.detection_step_rate < 1 || self.detection_step_rate > self.window_capacity {
            return Err(ConfigError::StepRateOutOfRange {
                step_rate: self.detection_step_rate,
                capacity: self.window_capacity,
            });
        }
        Ok(())
    }
}

/// Rejected detector configuration. Fatal: no detector is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroCapacity,
    StepRateOutOfRange { step_rate: usize, capacity: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "window capacity must be greater than 0"),
            Self::StepRateOutOfRange { step_rate, capacity } => write!(
                f,
                "detection step rate {} is outside [1, {}]",
                step_rate, capacity
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure surfacing out of [`WindowedDetector::process`]. Never recovered
/// internally; the calling pipeline decides whether to skip the instance or
/// halt the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// The window rejected the instance.
    Shape(WindowError),
    /// The wrapped estimator failed during the detection pass. The instance
    /// is still recorded in the window.
    Estimator(EstimatorError),
    /// The estimator returned a label vector of the wrong length.
    LabelCount { expected: usize, got: usize },
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(e) => write!(f, "{}", e),
            Self::Estimator(e) => write!(f, "estimator failure: {}", e),
            Self::LabelCount { expected, got } => {
                write!(f, "estimator returned {} labels for {} rows", got, expected)
            }
        }
    }
}

impl std::error::Error for DetectorError {}

impl From<WindowError> for DetectorError {
    fn from(e: WindowError) -> Self {
        Self::Shape(e)
    }
}

impl From<EstimatorError> for DetectorError {
    fn from(e: EstimatorError) -> Self {
        Self::Estimator(e)
    }
}

/// Streaming anomaly detection task wrapping one batch estimator.
#[derive(Debug)]
pub struct WindowedDetector<E> {
    estimator: E,
    window: InstanceWindow,
    /// Capability of the estimator, queried once at construction.
    fit_mode: FitMode,
    group_events: bool,
    next_event_id: u64,
    passes: u64,
}

impl<E: OutlierEstimator> WindowedDetector<E> {
    pub fn new(estimator: E, config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let fit_mode = estimator.fit_mode();
        Ok(Self {
            estimator,
            window: InstanceWindow::new(config.window_capacity, config.detection_step_rate),
            fit_mode,
            group_events: config.group_events,
            next_event_id: 0,
            passes: 0,
        })
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Number of completed detection passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Admit one newly arrived instance, in arrival order.
    ///
    /// Raises zero or more events into `sink` when the window is due for a
    /// detection pass. Estimator failures propagate uncaught; the instance
    /// stays recorded in the window either way.
    pub fn process<S: EventSink>(
        &mut self,
        instance: &StreamInstance,
        sink: &mut S,
    ) -> Result<(), DetectorError> {
        if self.window.push(instance)? != WindowState::Ready {
            return Ok(());
        }
        self.detect(sink)
    }

    fn detect<S: EventSink>(&mut self, sink: &mut S) -> Result<(), DetectorError> {
        let Some(matrix) = self.window.matrix() else {
            return Ok(()); // the buffer is always allocated once the window is ready
        };
        let rows = matrix.nrows();

        let labels = match self.fit_mode {
            FitMode::FitThenPredict => {
                self.estimator.fit(matrix)?;
                self.estimator.predict(matrix)?
            }
            FitMode::FitPredict => self.estimator.fit_predict(matrix)?,
        };
        if labels.len() != rows {
            return Err(DetectorError::LabelCount {
                expected: rows,
                got: labels.len(),
            });
        }

        self.passes += 1;
        debug!(
            pass = self.passes,
            rows,
            estimator = self.estimator.name(),
            outliers = labels.iter().filter(|&&l| l == OUTLIER_LABEL).count(),
            "detection pass"
        );

        for (row, &label) in labels.iter().enumerate() {
            if label != OUTLIER_LABEL {
                continue;
            }
            let flagged = if self.window.block_mode() {
                self.window.instance_at(row).cloned()
            } else {
                // Sliding windows overlap; taking the ref guarantees one
                // event per physical instance.
                self.window.take_instance(row)
            };
            let Some(flagged) = flagged else { continue };

            self.next_event_id += 1;
            sink.raise(AnomalyEvent {
                id: self.next_event_id,
                tstamp: flagged.tstamp,
                detector: self.estimator.name().to_string(),
                group: self.group_events,
                instances: vec![flagged],
            });
        }
        Ok(())
    }
}
