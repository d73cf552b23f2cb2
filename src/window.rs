//! Bounded instance window with block and sliding fill policies.
//!
//! The window owns a fixed-capacity matrix of feature vectors and a parallel
//! buffer of originating instances. Its policy, fixed at construction,
//! decides per incoming instance whether a detection pass is due:
//!
//! - **block mode** (`step_rate == capacity`): the buffer is an in-place ring;
//!   a pass is due exactly when the write position wraps to 0, i.e. once per
//!   complete, non-overlapping overwrite.
//! - **sliding mode** (`step_rate < capacity`): the buffer keeps the most
//!   recent `capacity` rows; a pass is due at first fill and every
//!   `step_rate`-th instance thereafter.
//!
//! No pass is ever due on a partially filled buffer.

use crate::stream::StreamInstance;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::fmt;

/// Outcome of admitting one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Buffer updated; not yet time for a detection pass.
    Buffering,
    /// Buffer updated and a detection pass is due now.
    Ready,
}

/// Rejected window update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Feature vector width differs from the width fixed by the first
    /// instance.
    WidthMismatch { expected: usize, got: usize },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WidthMismatch { expected, got } => {
                write!(f, "feature vector has width {}, window is {} wide", got, expected)
            }
        }
    }
}

impl std::error::Error for WindowError {}

/// Fixed-capacity window over the most recent stream instances.
#[derive(Debug)]
pub struct InstanceWindow {
    capacity: usize,
    step_rate: usize,
    block_mode: bool,
    /// Allocated on the first instance; num_features never changes afterwards.
    buffer: Option<Array2<f64>>,
    /// Parallel to the buffer rows. `None` in sliding mode marks a row whose
    /// instance was already reported.
    refs: Vec<Option<StreamInstance>>,
    write_pos: usize,
    full: bool,
    step_counter: usize,
}

impl InstanceWindow {
    /// Caller guarantees `capacity > 0` and `1 <= step_rate <= capacity`
    /// (validated by the detector configuration).
    pub fn new(capacity: usize, step_rate: usize) -> Self {
        debug_assert!(capacity > 0);
        debug_assert!(step_rate >= 1 && step_rate <= capacity);
        Self {
            capacity,
            step_rate,
            block_mode: step_rate == capacity,
            buffer: None,
            refs: vec![None; capacity],
            write_pos: 0,
            full: false,
            step_counter: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_mode(&self) -> bool {
        self.block_mode
    }

    /// True once every slot has been written at least once.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Admit one instance and report whether a detection pass is due.
    pub fn push(&mut self, instance: &StreamInstance) -> Result<WindowState, WindowError> {
        let width = instance.width();
        let buffer = self
            .buffer
            .get_or_insert_with(|| Array2::zeros((self.capacity, width)));
        if buffer.ncols() != width {
            return Err(WindowError::WidthMismatch {
                expected: buffer.ncols(),
                got: width,
            });
        }

        if !self.block_mode && self.full {
            // Sliding, buffer full: in-place shift left, new entry on the
            // right, oldest row ages out.
            for row in 1..self.capacity {
                for col in 0..width {
                    buffer[[row - 1, col]] = buffer[[row, col]];
                }
            }
            buffer
                .row_mut(self.capacity - 1)
                .assign(&ArrayView1::from(instance.features.as_slice()));
            self.refs.rotate_left(1);
            self.refs[self.capacity - 1] = Some(instance.clone());

            self.step_counter = (self.step_counter + 1) % self.step_rate;
            if self.step_counter != 0 {
                return Ok(WindowState::Buffering);
            }
            return Ok(WindowState::Ready);
        }

        // Ring write: block mode always, sliding mode until first fill.
        buffer
            .row_mut(self.write_pos)
            .assign(&ArrayView1::from(instance.features.as_slice()));
        self.refs[self.write_pos] = Some(instance.clone());
        self.write_pos = (self.write_pos + 1) % self.capacity;

        if self.write_pos != 0 {
            return Ok(WindowState::Buffering);
        }
        self.full = true;
        Ok(WindowState::Ready)
    }

    /// Matrix view over the buffered rows. `None` until the first instance
    /// has allocated the buffer.
    pub fn matrix(&self) -> Option<ArrayView2<'_, f64>> {
        self.buffer.as_ref().map(|b| b.view())
    }

    /// Instance stored at `row`, unless already taken.
    pub fn instance_at(&self, row: usize) -> Option<&StreamInstance> {
        self.refs.get(row).and_then(|r| r.as_ref())
    }

    /// Remove and return the instance stored at `row`, marking the row as
    /// reported.
    pub fn take_instance(&mut self, row: usize) -> Option<StreamInstance> {
        self.refs.get_mut(row).and_then(|r| r.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn inst(id: u64, value: f64) -> StreamInstance {
        StreamInstance::new(
            id,
            Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            vec![value],
        )
    }

    #[test]
    fn test_block_mode_fires_once_per_full_overwrite() {
        let mut w = InstanceWindow::new(3, 3);
        assert!(w.block_mode());

        for round in 0..2 {
            let base = round * 3;
            assert_eq!(w.push(&inst(base + 1, 1.0)).unwrap(), WindowState::Buffering);
            assert_eq!(w.push(&inst(base + 2, 2.0)).unwrap(), WindowState::Buffering);
            assert_eq!(w.push(&inst(base + 3, 3.0)).unwrap(), WindowState::Ready);
        }
    }

    #[test]
    fn test_sliding_first_fill_then_step_rate() {
        let mut w = InstanceWindow::new(4, 2);
        assert!(!w.block_mode());

        assert_eq!(w.push(&inst(1, 1.0)).unwrap(), WindowState::Buffering);
        assert_eq!(w.push(&inst(2, 2.0)).unwrap(), WindowState::Buffering);
        assert_eq!(w.push(&inst(3, 3.0)).unwrap(), WindowState::Buffering);
        // First fill.
        assert_eq!(w.push(&inst(4, 4.0)).unwrap(), WindowState::Ready);
        // Every 2nd instance afterwards.
        assert_eq!(w.push(&inst(5, 5.0)).unwrap(), WindowState::Buffering);
        assert_eq!(w.push(&inst(6, 6.0)).unwrap(), WindowState::Ready);
        assert_eq!(w.push(&inst(7, 7.0)).unwrap(), WindowState::Buffering);
        assert_eq!(w.push(&inst(8, 8.0)).unwrap(), WindowState::Ready);
    }

    #[test]
    fn test_sliding_shift_ages_out_oldest_row() {
        let mut w = InstanceWindow::new(3, 1);
        for id in 1..=3 {
            w.push(&inst(id, id as f64)).unwrap();
        }
        w.push(&inst(4, 4.0)).unwrap();

        let m = w.matrix().unwrap();
        assert_eq!(m[[0, 0]], 2.0);
        assert_eq!(m[[1, 0]], 3.0);
        assert_eq!(m[[2, 0]], 4.0);
        assert_eq!(w.instance_at(0).unwrap().id, 2);
        assert_eq!(w.instance_at(2).unwrap().id, 4);
    }

    #[test]
    fn test_take_instance_marks_row_reported() {
        let mut w = InstanceWindow::new(2, 1);
        w.push(&inst(1, 1.0)).unwrap();
        w.push(&inst(2, 2.0)).unwrap();

        assert_eq!(w.take_instance(0).unwrap().id, 1);
        assert!(w.instance_at(0).is_none());
        assert!(w.take_instance(0).is_none());
        // The other row is untouched.
        assert_eq!(w.instance_at(1).unwrap().id, 2);
    }

    #[test]
    fn test_taken_row_travels_with_the_shift() {
        let mut w = InstanceWindow::new(3, 1);
        for id in 1..=3 {
            w.push(&inst(id, id as f64)).unwrap();
        }
        // Report the middle row, then slide once: the hole moves to index 0.
        assert_eq!(w.take_instance(1).unwrap().id, 2);
        w.push(&inst(4, 4.0)).unwrap();

        assert!(w.instance_at(0).is_none());
        assert_eq!(w.instance_at(1).unwrap().id, 3);
        assert_eq!(w.instance_at(2).unwrap().id, 4);
    }

    #[test]
    fn test_width_mismatch_rejected_without_mutation() {
        let mut w = InstanceWindow::new(3, 3);
        w.push(&inst(1, 1.0)).unwrap();

        let bad = StreamInstance::new(
            2,
            Utc.timestamp_opt(1_700_000_002, 0).unwrap(),
            vec![1.0, 2.0],
        );
        let err = w.push(&bad).unwrap_err();
        assert_eq!(err, WindowError::WidthMismatch { expected: 1, got: 2 });

        // The rejected instance left no trace.
        assert!(w.instance_at(1).is_none());
        assert_eq!(w.push(&inst(3, 3.0)).unwrap(), WindowState::Buffering);
    }
}
