//! Fixed-radius matching in N-dimensional Cartesian space.

use crate::error::{check_positive, BinError, EngineError};
use crate::grid::{radius_bins, BinKey};
use crate::match_engine::{squared_distance_within, MatchEngine, NO_MATCH};
use crate::range::NdRange;
use crate::tuple::TupleField;

/// Two points match when their Euclidean distance is at most `scale`.
///
/// Scores are `distance / scale`, so every match scores in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianEngine {
    ndim: usize,
    scale: f64,
    bin_factor: f64,
    name: String,
}

impl CartesianEngine {
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
            name: format!("{ndim}-d Cartesian"),
        })
    }

    /// Set the ratio of grid cell size to match radius.
    ///
    /// Larger factors mean fewer bins per row and more candidates per bin.
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

    pub fn bin_factor(&self) -> f64 {
        self.bin_factor
    }

    fn cell_size(&self) -> f64 {
        self.bin_factor * self.scale
    }
}

impl MatchEngine for CartesianEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_infos(&self) -> Vec<TupleField> {
        (0..self.ndim).map(TupleField::coordinate).collect()
    }

    fn arity(&self) -> usize {
        self.ndim
    }

    fn is_usable(&self, tuple: &[f64]) -> bool {
        tuple.len() == self.ndim && tuple.iter().all(|v| v.is_finite())
    }

    fn bins(&self, tuple: &[f64]) -> Result<Vec<BinKey>, BinError> {
        if tuple.len() != self.ndim {
            return Err(BinError::Arity {
                expected: self.ndim,
                actual: tuple.len(),
            });
        }
        radius_bins(tuple, self.scale * 0.5, self.cell_size())
    }

    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        if a.len() != self.ndim || b.len() != self.ndim {
            return NO_MATCH;
        }
        match squared_distance_within(a, b, self.ndim, self.scale * self.scale) {
            Some(dist2) => dist2.sqrt() / self.scale,
            None => NO_MATCH,
        }
    }

    fn score_scale(&self) -> f64 {
        1.0
    }

    fn can_bound_match(&self) -> bool {
        true
    }

    fn match_bounds(&self, ranges: &[NdRange], index: usize) -> Option<NdRange> {
        let range = ranges.get(index)?;
        if range.dimensionality() != self.ndim {
            return None;
        }
        let axes: Vec<usize> = (0..self.ndim).collect();
        Some(range.extended(self.scale, &axes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shares_bin(e: &CartesianEngine, a: &[f64], b: &[f64]) -> bool {
        let ba = e.bins(a).unwrap();
        let bb = e.bins(b).unwrap();
        ba.iter().any(|k| bb.contains(k))
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(CartesianEngine::new(0, 1.0).is_err());
        assert!(CartesianEngine::new(2, 0.0).is_err());
        assert!(CartesianEngine::new(2, f64::NAN).is_err());
        assert!(CartesianEngine::new(2, 1.0).unwrap().with_bin_factor(-1.0).is_err());
    }

    #[test]
    fn scores_distance_over_scale() {
        let e = CartesianEngine::new(2, 1.0).unwrap();
        assert_eq!(e.score(&[0.0, 0.0], &[0.5, 0.0]), 0.5);
        assert_eq!(e.score(&[0.0, 0.0], &[5.0, 5.0]), NO_MATCH);
        assert_eq!(e.score(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn boundary_distance_matches() {
        let e = CartesianEngine::new(2, 5.0).unwrap();
        assert_eq!(e.score(&[0.0, 0.0], &[3.0, 4.0]), 1.0);
        assert!(shares_bin(&e, &[0.0, 0.0], &[3.0, 4.0]));
    }

    #[test]
    fn score_is_symmetric() {
        let e = CartesianEngine::new(3, 2.0).unwrap();
        let a = [0.1, -0.4, 1.2];
        let b = [0.9, 0.3, 0.7];
        assert_eq!(e.score(&a, &b), e.score(&b, &a));
    }

    #[test]
    fn matching_pairs_share_a_bin() {
        for bin_factor in [0.3, 1.0, 2.5] {
            let e = CartesianEngine::new(2, 1.0).unwrap().with_bin_factor(bin_factor).unwrap();
            let pts = [[0.0, 0.0], [0.99, 0.0], [-0.5, 0.5], [0.7, -0.7], [2.3, 2.3]];
            for a in &pts {
                for b in &pts {
                    if e.score(a, b) >= 0.0 {
                        assert!(shares_bin(&e, a, b), "{a:?} {b:?} bf={bin_factor}");
                    }
                }
            }
        }
    }

    #[test]
    fn wrong_arity_is_no_match_and_bin_error() {
        let e = CartesianEngine::new(2, 1.0).unwrap();
        assert_eq!(e.score(&[0.0], &[0.0, 0.0]), NO_MATCH);
        assert_eq!(
            e.bins(&[0.0]),
            Err(BinError::Arity {
                expected: 2,
                actual: 1
            })
        );
        assert!(!e.is_usable(&[0.0]));
    }

    #[test]
    fn bounds_extend_by_scale() {
        let e = CartesianEngine::new(2, 0.5).unwrap();
        let r = NdRange::new(vec![0.0, 0.0], vec![1.0, 2.0]).unwrap();
        let b = e.match_bounds(&[r], 0).unwrap();
        assert_eq!(b.mins(), &[-0.5, -0.5]);
        assert_eq!(b.maxs(), &[1.5, 2.5]);
        assert!(e.match_bounds(&[], 0).is_none());
    }
}
