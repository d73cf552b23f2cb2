//! End-to-end behavior of the windowed detector: trigger cadence, duplicate
//! suppression, sentinel handling and failure propagation.

use chrono::{TimeZone, Utc};
use ndarray::ArrayView2;
use weir::algo::{Contamination, LocalOutlierFactor, LofConfig};
use weir::{
    AnomalyEvent, ConfigError, DetectorConfig, DetectorError, EstimatorError, FitMode,
    OutlierEstimator, StreamInstance, WindowedDetector, INLIER_LABEL, OUTLIER_LABEL,
};

fn inst(id: u64, value: f64) -> StreamInstance {
    StreamInstance::new(
        id,
        Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
        vec![value],
    )
}

fn config(capacity: usize, step_rate: usize) -> DetectorConfig {
    DetectorConfig {
        window_capacity: capacity,
        detection_step_rate: step_rate,
        ..Default::default()
    }
}

/// Flags any row whose first value exceeds the limit.
struct ThresholdStub {
    limit: f64,
}

impl OutlierEstimator for ThresholdStub {
    fn name(&self) -> &str {
        "ThresholdStub"
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
        Ok(x.rows()
            .into_iter()
            .map(|r| if r[0] > self.limit { OUTLIER_LABEL } else { INLIER_LABEL })
            .collect())
    }
}

/// Flags a fixed row index on every pass, everything else is normal.
struct RowStub {
    row: usize,
}

impl OutlierEstimator for RowStub {
    fn name(&self) -> &str {
        "RowStub"
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
        Ok((0..x.nrows())
            .map(|i| if i == self.row { OUTLIER_LABEL } else { INLIER_LABEL })
            .collect())
    }
}

/// Returns a fixed label for every row.
#[derive(Debug)]
struct ConstStub {
    label: i32,
}

impl OutlierEstimator for ConstStub {
    fn name(&self) -> &str {
        "ConstStub"
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
        Ok(vec![self.label; x.nrows()])
    }
}

/// The first worked scenario: capacity 5, block mode, one spike at the 5th
/// instance. Exactly two passes, one event, referencing the spike.
#[test]
fn test_block_mode_scenario() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut det =
        WindowedDetector::new(ThresholdStub { limit: 50.0 }, config(5, 5)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    let values = [1.0, 2.0, 3.0, 4.0, 100.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    for (i, &v) in values.iter().enumerate() {
        det.process(&inst(i as u64 + 1, v), &mut events).unwrap();
    }

    assert_eq!(det.passes(), 2);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, 1);
    assert_eq!(events[0].instances.len(), 1);
    assert_eq!(events[0].instances[0].id, 5);
    assert_eq!(events[0].tstamp, events[0].instances[0].tstamp);
    assert_eq!(events[0].detector, "ThresholdStub");
}

/// The second worked scenario: capacity 4, sliding, row 0 flagged on every
/// pass. Each pass reports the instance currently sitting in row 0; the
/// content changes between passes, so each report is a fresh instance.
#[test]
fn test_sliding_scenario_reports_shifting_row() {
    let mut det = WindowedDetector::new(RowStub { row: 0 }, config(4, 1)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    for id in 1..=6 {
        det.process(&inst(id, 1.0), &mut events).unwrap();
    }

    assert_eq!(det.passes(), 3);
    let reported: Vec<u64> = events.iter().map(|e| e.instances[0].id).collect();
    assert_eq!(reported, vec![1, 2, 3]);
}

/// P1: block mode fires exactly k times for k*C instances, never in between.
#[test]
fn test_block_mode_cadence() {
    let mut det = WindowedDetector::new(ConstStub { label: 1 }, config(4, 4)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    for id in 1..=12 {
        det.process(&inst(id, 1.0), &mut events).unwrap();
        assert_eq!(det.passes(), id / 4);
    }
    assert!(events.is_empty());
}

/// P2: sliding mode first fires at the C-th instance, then every S-th.
#[test]
fn test_sliding_mode_cadence() {
    let mut det = WindowedDetector::new(ConstStub { label: 1 }, config(5, 2)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    let mut expected = 0;
    for id in 1..=11 {
        det.process(&inst(id, 1.0), &mut events).unwrap();
        if id == 5 || (id > 5 && (id - 5) % 2 == 0) {
            expected += 1;
        }
        assert_eq!(det.passes(), expected, "after instance {}", id);
    }
    assert_eq!(det.passes(), 4); // instances 5, 7, 9, 11
}

/// P3: a partially filled window never triggers a pass, in either mode.
#[test]
fn test_no_early_detection() {
    for step_rate in [5, 1] {
        let mut det =
            WindowedDetector::new(ConstStub { label: -1 }, config(5, step_rate)).unwrap();
        let mut events: Vec<AnomalyEvent> = Vec::new();

        for id in 1..=4 {
            det.process(&inst(id, 1.0), &mut events).unwrap();
        }
        assert_eq!(det.passes(), 0);
        assert!(events.is_empty());
    }
}

/// P4: a physical instance is reported at most once while it stays resident
/// in a sliding window, even when every pass flags every row.
#[test]
fn test_sliding_mode_never_reports_an_instance_twice() {
    let mut det = WindowedDetector::new(ConstStub { label: -1 }, config(4, 1)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    for id in 1..=4 {
        det.process(&inst(id, 1.0), &mut events).unwrap();
    }
    assert_eq!(events.len(), 4);

    // One more instance: rows 0..2 were already reported, only the newcomer
    // raises.
    det.process(&inst(5, 1.0), &mut events).unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[4].instances[0].id, 5);

    let mut reported: Vec<u64> = events.iter().map(|e| e.instances[0].id).collect();
    reported.dedup();
    assert_eq!(reported.len(), events.len());
}

/// P5: only the exact label -1 raises; 0 and other values are normal.
#[test]
fn test_only_minus_one_is_an_outlier_label() {
    for label in [0, 1, 2, -2] {
        let mut det = WindowedDetector::new(ConstStub { label }, config(3, 3)).unwrap();
        let mut events: Vec<AnomalyEvent> = Vec::new();

        for id in 1..=3 {
            det.process(&inst(id, 1.0), &mut events).unwrap();
        }
        assert_eq!(det.passes(), 1);
        assert!(events.is_empty(), "label {} must not raise", label);
    }
}

/// P6: invalid step rates are rejected at construction.
#[test]
fn test_invalid_configurations_are_rejected() {
    let err = WindowedDetector::new(ConstStub { label: 1 }, config(20, 0)).unwrap_err();
    assert_eq!(err, ConfigError::StepRateOutOfRange { step_rate: 0, capacity: 20 });

    let err = WindowedDetector::new(ConstStub { label: 1 }, config(20, 21)).unwrap_err();
    assert_eq!(err, ConfigError::StepRateOutOfRange { step_rate: 21, capacity: 20 });

    let err = WindowedDetector::new(ConstStub { label: 1 }, config(0, 1)).unwrap_err();
    assert_eq!(err, ConfigError::ZeroCapacity);
}

#[test]
fn test_width_mismatch_fails_and_stream_continues() {
    let mut det = WindowedDetector::new(ConstStub { label: 1 }, config(3, 3)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    det.process(&inst(1, 1.0), &mut events).unwrap();

    let wide = StreamInstance::new(
        2,
        Utc.timestamp_opt(1_700_000_002, 0).unwrap(),
        vec![1.0, 2.0],
    );
    let err = det.process(&wide, &mut events).unwrap_err();
    assert!(matches!(err, DetectorError::Shape(_)));

    // The mismatched instance was not admitted; the stream keeps flowing.
    det.process(&inst(3, 1.0), &mut events).unwrap();
    det.process(&inst(4, 1.0), &mut events).unwrap();
    assert_eq!(det.passes(), 1);
}

#[test]
fn test_group_flag_is_passed_through() {
    for group in [true, false] {
        let cfg = DetectorConfig {
            window_capacity: 2,
            detection_step_rate: 2,
            group_events: group,
        };
        let mut det = WindowedDetector::new(ConstStub { label: -1 }, cfg).unwrap();
        let mut events: Vec<AnomalyEvent> = Vec::new();

        det.process(&inst(1, 1.0), &mut events).unwrap();
        det.process(&inst(2, 1.0), &mut events).unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.group == group));
    }
}

/// Events flow through a channel sink unchanged.
#[test]
fn test_channel_sink_delivery() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut det =
        WindowedDetector::new(ThresholdStub { limit: 50.0 }, config(5, 5)).unwrap();

    let mut sink = tx;
    let values = [1.0, 2.0, 3.0, 4.0, 100.0];
    for (i, &v) in values.iter().enumerate() {
        det.process(&inst(i as u64 + 1, v), &mut sink).unwrap();
    }
    drop(sink);

    let delivered: Vec<AnomalyEvent> = rx.iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].instances[0].id, 5);
}

/// A real estimator end to end: LOF spots a spike in a block window.
#[test]
fn test_lof_detects_spike_in_block_window() {
    let lof = LocalOutlierFactor::new(LofConfig {
        n_neighbors: 3,
        contamination: Contamination::Auto,
    });
    let mut det = WindowedDetector::new(lof, config(11, 11)).unwrap();
    let mut events: Vec<AnomalyEvent> = Vec::new();

    for id in 1..=10 {
        det.process(&inst(id, id as f64), &mut events).unwrap();
    }
    assert!(events.is_empty());

    det.process(&inst(11, 1000.0), &mut events).unwrap();
    assert_eq!(det.passes(), 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].instances[0].id, 11);
    assert_eq!(events[0].detector, "LocalOutlierFactor");
}
