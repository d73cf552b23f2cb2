//! Stream instances entering a detector.
//!
//! The enclosing pipeline hands a detector one instance at a time, in arrival
//! order. An instance carries the unique id and timestamp assigned upstream
//! plus the numeric feature vector extracted from the raw event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation arriving on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInstance {
    /// Unique id assigned by the upstream pipeline.
    pub id: u64,
    /// Arrival timestamp.
    pub tstamp: DateTime<Utc>,
    /// One value per declared feature dimension.
    pub features: Vec<f64>,
}

impl StreamInstance {
    pub fn new(id: u64, tstamp: DateTime<Utc>, features: Vec<f64>) -> Self {
        Self {
            id,
            tstamp,
            features,
        }
    }

    /// Number of feature dimensions.
    pub fn width(&self) -> usize {
        self.features.len()
    }
}
