//! The [`MatchEngine`] contract.
//!
//! An engine is a stateless policy object. For a row tuple it produces the
//! set of bins the row falls in; for a pair of tuples it produces a score.
//! The matcher never looks inside tuples itself, so any notion of "same
//! object" can be plugged in as long as it honours the binning contract:
//! if `score(a, b) >= 0` then `bins(a)` and `bins(b)` share at least one key.

use crate::error::BinError;
use crate::grid::BinKey;
use crate::range::NdRange;
use crate::tuple::{self, TupleField};

/// Score returned for a pair that does not match.
pub const NO_MATCH: f64 = -1.0;

/// Pluggable match criterion.
///
/// Implementations must be pure: the same inputs always give the same bins
/// and the same score, from any thread.
pub trait MatchEngine: Send + Sync {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Shape of the tuples this engine consumes.
    fn tuple_infos(&self) -> Vec<TupleField>;

    /// Number of values per tuple.
    fn arity(&self) -> usize {
        self.tuple_infos().len()
    }

    /// Whether `tuple` can take part in matching at all.
    ///
    /// Unusable rows are skipped, never fatal.
    fn is_usable(&self, tuple: &[f64]) -> bool {
        tuple::is_usable(&self.tuple_infos(), tuple)
    }

    /// Keys of every bin the tuple falls in.
    ///
    /// Two tuples that can match must share a key. Extra shared keys only
    /// cost extra `score` calls.
    fn bins(&self, tuple: &[f64]) -> Result<Vec<BinKey>, BinError>;

    /// Score a pair of tuples: [`NO_MATCH`] when they do not match,
    /// otherwise a non-negative value where lower is better.
    ///
    /// Must be symmetric in its arguments.
    fn score(&self, a: &[f64], b: &[f64]) -> f64;

    /// Typical magnitude of a matching score, for normalisation.
    fn score_scale(&self) -> f64;

    /// Whether [`match_bounds`](Self::match_bounds) can ever return a range.
    fn can_bound_match(&self) -> bool {
        false
    }

    /// Region in which a partner of some row of `ranges[index]` could lie,
    /// given the ranges of every table being matched.
    ///
    /// `None` means the engine cannot bound its matches.
    fn match_bounds(&self, ranges: &[NdRange], index: usize) -> Option<NdRange> {
        let _ = (ranges, index);
        None
    }
}

/// Whether a score returned by [`MatchEngine::score`] means "match".
#[inline]
pub fn is_match(score: f64) -> bool {
    score >= 0.0
}

/// Scale a raw score by the engine's score scale.
pub fn normalized_score(engine: &dyn MatchEngine, score: f64) -> f64 {
    let scale = engine.score_scale();
    if is_match(score) && scale > 0.0 {
        score / scale
    } else {
        score
    }
}

/// Squared Euclidean distance between the first `ndim` values of both
/// tuples, or `None` as soon as it exceeds `limit2`.
///
/// A `NaN` anywhere also yields `None`.
#[inline]
pub(crate) fn squared_distance_within(a: &[f64], b: &[f64], ndim: usize, limit2: f64) -> Option<f64> {
    let mut dist2 = 0.0;
    for i in 0..ndim {
        let d = a[i] - b[i];
        dist2 += d * d;
        if !(dist2 <= limit2) {
            return None;
        }
    }
    Some(dist2)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exact;

    impl MatchEngine for Exact {
        fn name(&self) -> &str {
            "exact"
        }

        fn tuple_infos(&self) -> Vec<TupleField> {
            vec![TupleField::coordinate(0)]
        }

        fn bins(&self, tuple: &[f64]) -> Result<Vec<BinKey>, BinError> {
            Ok(vec![BinKey(tuple[0].to_bits())])
        }

        fn score(&self, a: &[f64], b: &[f64]) -> f64 {
            if a == b {
                0.0
            } else {
                NO_MATCH
            }
        }

        fn score_scale(&self) -> f64 {
            2.0
        }
    }

    #[test]
    fn defaults_come_from_tuple_shape() {
        let e = Exact;
        assert_eq!(e.arity(), 1);
        assert!(e.is_usable(&[1.0]));
        assert!(!e.is_usable(&[f64::NAN]));
        assert!(!e.can_bound_match());
        assert!(e.match_bounds(&[NdRange::unbounded(1)], 0).is_none());
    }

    #[test]
    fn engine_is_object_safe() {
        let e: Box<dyn MatchEngine> = Box::new(Exact);
        assert_eq!(e.name(), "exact");
        assert_eq!(e.score(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn normalisation_leaves_no_match_alone() {
        assert_eq!(normalized_score(&Exact, 1.0), 0.5);
        assert_eq!(normalized_score(&Exact, NO_MATCH), NO_MATCH);
    }

    #[test]
    fn squared_distance_exits_early() {
        assert_eq!(squared_distance_within(&[0.0, 0.0], &[3.0, 4.0], 2, 25.0), Some(25.0));
        assert_eq!(squared_distance_within(&[0.0, 0.0], &[3.0, 4.0], 2, 24.9), None);
        assert_eq!(squared_distance_within(&[f64::NAN], &[0.0], 1, 1.0), None);
    }
}
