//! Axis-aligned N-dimensional bounding boxes.
//!
//! An [`NdRange`] describes the extent of a table's tuples. Engines that can
//! bound their matches use these ranges to work out where a partner row could
//! possibly lie, which lets the matcher drop rows that cannot match anything
//! before they are binned.
//!
//! Infinite bounds mean "unbounded on that side".

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct NdRange {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl NdRange {
    /// Create a range from explicit bounds.
    ///
    /// Both vectors must have the same length, no bound may be `NaN`, and
    /// every min must not exceed its max.
    pub fn new(mins: Vec<f64>, maxs: Vec<f64>) -> Result<Self, EngineError> {
        if mins.len() != maxs.len() {
            return Err(EngineError::DimensionMismatch {
                left: mins.len(),
                right: maxs.len(),
            });
        }
        for (axis, (lo, hi)) in mins.iter().zip(&maxs).enumerate() {
            if lo.is_nan() || hi.is_nan() {
                return Err(EngineError::InvalidRange(format!("axis {axis} has a NaN bound")));
            }
            if lo > hi {
                return Err(EngineError::InvalidRange(format!(
                    "axis {axis}: min {lo} exceeds max {hi}"
                )));
            }
        }
        Ok(Self { mins, maxs })
    }

    /// A range with no bounds on any of `ndim` axes.
    pub fn unbounded(ndim: usize) -> Self {
        Self {
            mins: vec![f64::NEG_INFINITY; ndim],
            maxs: vec![f64::INFINITY; ndim],
        }
    }

    /// Smallest range containing every finite point yielded by `points`.
    ///
    /// Returns `None` when no usable point was seen.
    pub fn from_points<'a, I>(ndim: usize, points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut acc = RangeAccumulator::new(ndim);
        for p in points {
            acc.add(p);
        }
        acc.finish()
    }

    pub fn dimensionality(&self) -> usize {
        self.mins.len()
    }

    pub fn mins(&self) -> &[f64] {
        &self.mins
    }

    pub fn maxs(&self) -> &[f64] {
        &self.maxs
    }

    /// Whether every axis has finite bounds on both sides.
    pub fn is_bounded(&self) -> bool {
        self.mins.iter().chain(&self.maxs).all(|v| v.is_finite())
    }

    /// Whether `point` lies inside the range (bounds inclusive).
    ///
    /// A point with the wrong dimensionality or a `NaN` value is outside.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.mins.len()
            && point
                .iter()
                .zip(self.mins.iter().zip(&self.maxs))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }

    /// Smallest range containing both inputs.
    pub fn union(a: &NdRange, b: &NdRange) -> Result<NdRange, EngineError> {
        check_same_dims(a, b)?;
        Ok(NdRange {
            mins: a.mins.iter().zip(&b.mins).map(|(x, y)| x.min(*y)).collect(),
            maxs: a.maxs.iter().zip(&b.maxs).map(|(x, y)| x.max(*y)).collect(),
        })
    }

    /// Overlap of both inputs, or `None` when they are disjoint on any axis.
    pub fn intersection(a: &NdRange, b: &NdRange) -> Result<Option<NdRange>, EngineError> {
        check_same_dims(a, b)?;
        let mins: Vec<f64> = a.mins.iter().zip(&b.mins).map(|(x, y)| x.max(*y)).collect();
        let maxs: Vec<f64> = a.maxs.iter().zip(&b.maxs).map(|(x, y)| x.min(*y)).collect();
        if mins.iter().zip(&maxs).any(|(lo, hi)| lo > hi) {
            return Ok(None);
        }
        Ok(Some(NdRange { mins, maxs }))
    }

    /// Widen the listed `axes` by `margin` on both sides.
    ///
    /// Axes that are not listed become unbounded: the result only constrains
    /// the dimensions the margin is known for. Out-of-range axis indices are
    /// ignored.
    pub fn extended(&self, margin: f64, axes: &[usize]) -> NdRange {
        let ndim = self.dimensionality();
        let mut out = NdRange::unbounded(ndim);
        let margin = if margin.is_nan() { f64::INFINITY } else { margin.abs() };
        for &axis in axes.iter().filter(|&&a| a < ndim) {
            out.mins[axis] = self.mins[axis] - margin;
            out.maxs[axis] = self.maxs[axis] + margin;
        }
        out
    }

    /// Replace the bounds of one axis, clamping to `[lo, hi]`.
    pub fn clamped(mut self, axis: usize, lo: f64, hi: f64) -> NdRange {
        if axis < self.mins.len() {
            self.mins[axis] = self.mins[axis].max(lo);
            self.maxs[axis] = self.maxs[axis].min(hi);
        }
        self
    }
}

fn check_same_dims(a: &NdRange, b: &NdRange) -> Result<(), EngineError> {
    if a.dimensionality() == b.dimensionality() {
        Ok(())
    } else {
        Err(EngineError::DimensionMismatch {
            left: a.dimensionality(),
            right: b.dimensionality(),
        })
    }
}

/// Streaming builder for the range of a set of tuples.
///
/// Points with the wrong arity or any non-finite value are ignored, matching
/// the way the matcher skips unusable rows.
#[derive(Debug, Clone)]
pub struct RangeAccumulator {
    mins: Vec<f64>,
    maxs: Vec<f64>,
    count: usize,
}

impl RangeAccumulator {
    pub fn new(ndim: usize) -> Self {
        Self {
            mins: vec![f64::INFINITY; ndim],
            maxs: vec![f64::NEG_INFINITY; ndim],
            count: 0,
        }
    }

    pub fn add(&mut self, point: &[f64]) {
        if point.len() != self.mins.len() || !point.iter().all(|v| v.is_finite()) {
            return;
        }
        for (axis, &v) in point.iter().enumerate() {
            self.mins[axis] = self.mins[axis].min(v);
            self.maxs[axis] = self.maxs[axis].max(v);
        }
        self.count += 1;
    }

    /// Fold another accumulator into this one.
    pub fn merge(mut self, other: RangeAccumulator) -> Self {
        if other.count == 0 || other.mins.len() != self.mins.len() {
            return self;
        }
        for axis in 0..self.mins.len() {
            self.mins[axis] = self.mins[axis].min(other.mins[axis]);
            self.maxs[axis] = self.maxs[axis].max(other.maxs[axis]);
        }
        self.count += other.count;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> Option<NdRange> {
        if self.count == 0 {
            return None;
        }
        Some(NdRange {
            mins: self.mins,
            maxs: self.maxs,
        })
    }
}
