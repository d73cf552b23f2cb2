//! Anomaly events and the sink they are raised through.
//!
//! A detector never talks to a transport directly. It raises events into an
//! [`EventSink`] owned by the caller; the sink decides whether they land in a
//! local collector, a channel feeding another thread, or something else
//! entirely.

use crate::stream::StreamInstance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An anomaly raised by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Sequential id, unique per raising detector.
    pub id: u64,
    /// Timestamp of the flagged instance.
    pub tstamp: DateTime<Utc>,
    /// Name of the raising detector.
    pub detector: String,
    /// Whether downstream consumers may merge the flagged rows of one
    /// detection pass into a group anomaly. Pure passthrough from the
    /// detector configuration.
    pub group: bool,
    /// Originating instance(s).
    pub instances: Vec<StreamInstance>,
}

impl AnomalyEvent {
    /// Compact wire form for downstream transports.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "t": self.tstamp.timestamp_millis(),
            "detector": self.detector,
            "group": self.group,
            "instances": self.instances.iter().map(|i| i.id).collect::<Vec<_>>(),
        })
    }
}

/// Where raised events go. The transport behind the sink is owned by the
/// caller, not by the detector.
pub trait EventSink {
    fn raise(&mut self, event: AnomalyEvent);
}

/// Collects events in memory. The sink of choice in tests.
impl EventSink for Vec<AnomalyEvent> {
    fn raise(&mut self, event: AnomalyEvent) {
        self.push(event);
    }
}

/// Hands events to a channel feeding another thread. A full or disconnected
/// channel drops the event instead of stalling the detection path.
impl EventSink for crossbeam_channel::Sender<AnomalyEvent> {
    fn raise(&mut self, event: AnomalyEvent) {
        if let Err(e) = self.try_send(event) {
            warn!(error = %e, "anomaly event dropped");
        }
    }
}
