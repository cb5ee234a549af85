//! Cartesian matching with a per-row error radius.
//!
//! Tuples are `ndim` coordinates followed by one error value. Two rows match
//! when the distance between them is no more than the sum of their errors.

use crate::error::{check_positive, BinError, EngineError};
use crate::grid::{radius_bins, BinKey};
use crate::match_engine::{squared_distance_within, MatchEngine, NO_MATCH};
use crate::range::NdRange;
use crate::tuple::TupleField;

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorCartesianEngine {
    ndim: usize,
    scale: f64,
    bin_factor: f64,
    name: String,
}

impl ErrorCartesianEngine {
    /// `scale` is a typical error value; it only sets the grid cell size.
    pub fn new(ndim: usize, scale: f64) -> Result<Self, EngineError> {
        if ndim == 0 {
            return Err(EngineError::InvalidConfig(
                "ndim must be >= 1 (got 0)".into(),
            ));
        }
        check_positive("scale", scale)?;
        Ok(Self {
            ndim,
            scale,
            bin_factor: 1.0,
            name: format!("{ndim}-d Cartesian with errors"),
        })
    }

    pub fn with_bin_factor(mut self, bin_factor: f64) -> Result<Self, EngineError> {
        check_positive("bin_factor", bin_factor)?;
        self.bin_factor = bin_factor;
        Ok(self)
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl MatchEngine for ErrorCartesianEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_infos(&self) -> Vec<TupleField> {
        let mut fields: Vec<TupleField> = (0..self.ndim).map(TupleField::coordinate).collect();
        fields.push(TupleField::error());
        fields
    }

    fn arity(&self) -> usize {
        self.ndim + 1
    }

    fn is_usable(&self, tuple: &[f64]) -> bool {
        tuple.len() == self.ndim + 1
            && tuple[..self.ndim].iter().all(|v| v.is_finite())
            && tuple[self.ndim].is_finite()
            && tuple[self.ndim] >= 0.0
    }

    fn bins(&self, tuple: &[f64]) -> Result<Vec<BinKey>, BinError> {
        if tuple.len() != self.ndim + 1 {
            return Err(BinError::Arity {
                expected: self.ndim + 1,
                actual: tuple.len(),
            });
        }
        let error = tuple[self.ndim];
        radius_bins(&tuple[..self.ndim], error, self.bin_factor * self.scale)
    }

    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        let n = self.ndim;
        if a.len() != n + 1 || b.len() != n + 1 {
            return NO_MATCH;
        }
        let err = a[n] + b[n];
        let err2 = err * err;
        match squared_distance_within(a, b, n, err2) {
            Some(dist2) if err2 > 0.0 => (dist2 / err2).sqrt(),
            Some(_) => 0.0,
            None => NO_MATCH,
        }
    }

    fn score_scale(&self) -> f64 {
        1.0
    }

    fn can_bound_match(&self) -> bool {
        true
    }

    /// Extends `ranges[index]` by twice the largest error seen in any range.
    fn match_bounds(&self, ranges: &[NdRange], index: usize) -> Option<NdRange> {
        let range = ranges.get(index)?;
        let mut max_error = 0.0_f64;
        for r in ranges {
            if r.dimensionality() != self.ndim + 1 {
                return None;
            }
            max_error = max_error.max(r.maxs()[self.ndim]);
        }
        if !max_error.is_finite() {
            return None;
        }
        let axes: Vec<usize> = (0..self.ndim).collect();
        Some(range.extended(2.0 * max_error, &axes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ErrorCartesianEngine {
        ErrorCartesianEngine::new(2, 1.0).unwrap()
    }

    #[test]
    fn errors_add_up() {
        let e = engine();
        let s = e.score(&[0.0, 0.0, 0.6], &[1.0, 0.0, 0.6]);
        assert!(s >= 0.0 && s <= 1.0);
        assert!((s - 1.0 / 1.2).abs() < 1e-12);
        assert_eq!(e.score(&[0.0, 0.0, 0.3], &[1.0, 0.0, 0.3]), NO_MATCH);
    }

    #[test]
    fn zero_errors_match_only_coincident_points() {
        let e = engine();
        assert_eq!(e.score(&[2.0, 2.0, 0.0], &[2.0, 2.0, 0.0]), 0.0);
        assert_eq!(e.score(&[2.0, 2.0, 0.0], &[2.0, 2.1, 0.0]), NO_MATCH);
    }

    #[test]
    fn exact_error_sum_is_a_match() {
        let e = engine();
        assert_eq!(e.score(&[0.0, 0.0, 2.0], &[3.0, 4.0, 3.0]), 1.0);
    }

    #[test]
    fn missing_error_is_unusable() {
        let e = engine();
        assert!(e.is_usable(&[0.0, 0.0, 0.0]));
        assert!(!e.is_usable(&[0.0, 0.0, f64::NAN]));
        assert!(!e.is_usable(&[0.0, 0.0, -1.0]));
        assert!(!e.is_usable(&[0.0, 0.0]));
        assert_eq!(e.tuple_infos().len(), 3);
    }

    #[test]
    fn matching_pairs_share_a_bin() {
        let e = ErrorCartesianEngine::new(2, 0.5).unwrap();
        let a = [0.0, 0.0, 0.6];
        let b = [1.19, 0.0, 0.6];
        assert!(e.score(&a, &b) >= 0.0);
        let ba = e.bins(&a).unwrap();
        let bb = e.bins(&b).unwrap();
        assert!(ba.iter().any(|k| bb.contains(k)));
    }

    #[test]
    fn large_error_on_fine_grid_is_too_many_bins() {
        let e = ErrorCartesianEngine::new(2, 0.001).unwrap();
        assert!(matches!(
            e.bins(&[0.0, 0.0, 10.0]),
            Err(BinError::TooManyBins { .. })
        ));
    }

    #[test]
    fn bounds_use_largest_error_everywhere() {
        let e = engine();
        let a = NdRange::new(vec![0.0, 0.0, 0.1], vec![1.0, 1.0, 0.2]).unwrap();
        let b = NdRange::new(vec![5.0, 5.0, 0.0], vec![6.0, 6.0, 0.5]).unwrap();
        let bounds = e.match_bounds(&[a, b], 0).unwrap();
        assert_eq!(bounds.mins()[0], -1.0);
        assert_eq!(bounds.maxs()[1], 2.0);
        // the error axis itself is left open
        assert_eq!(bounds.maxs()[2], f64::INFINITY);
    }

    #[test]
    fn bounds_need_matching_dimensionality() {
        let e = engine();
        let r = NdRange::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(e.match_bounds(&[r], 0).is_none());
    }
}
