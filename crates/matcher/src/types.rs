use std::fmt;

use engine::EngineError;
use index::{IndexError, RowRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two rows accepted as a match, with the engine score.
///
/// Always stored with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub a: RowRef,
    pub b: RowRef,
    pub score: f64,
}

impl ScoredPair {
    pub fn new(x: RowRef, y: RowRef, score: f64) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self { a, b, score }
    }

    /// The member belonging to `table`, if any.
    pub fn member_in(&self, table: usize) -> Option<RowRef> {
        if self.a.table == table {
            Some(self.a)
        } else if self.b.table == table {
            Some(self.b)
        } else {
            None
        }
    }

    /// Total order by score, then by rows.
    pub(crate) fn cmp_by_score(&self, other: &ScoredPair) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.a.cmp(&other.a))
            .then(self.b.cmp(&other.b))
    }
}

pub(crate) fn sort_pairs(pairs: &mut [ScoredPair]) {
    pairs.sort_by(|x, y| x.a.cmp(&y.a).then(x.b.cmp(&y.b)));
}

/// A group of rows considered to describe the same object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLink {
    refs: Vec<RowRef>,
    /// Best (lowest) accepted pair score inside the link; `None` for a
    /// single-row link.
    pub score: Option<f64>,
}

impl RowLink {
    /// Members are sorted and deduplicated.
    pub fn new(mut refs: Vec<RowRef>, score: Option<f64>) -> Self {
        refs.sort_unstable();
        refs.dedup();
        Self { refs, score }
    }

    pub fn single(r: RowRef) -> Self {
        Self {
            refs: vec![r],
            score: None,
        }
    }

    pub fn refs(&self) -> &[RowRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Smallest member.
    pub fn first(&self) -> Option<RowRef> {
        self.refs.first().copied()
    }

    pub fn contains(&self, r: RowRef) -> bool {
        self.refs.binary_search(&r).is_ok()
    }

    /// Number of members from `table`.
    pub fn count_in(&self, table: usize) -> usize {
        self.refs.iter().filter(|r| r.table == table).count()
    }
}

/// Ordered collection of links.
///
/// Links are ordered by their members, so ascending by smallest member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSet {
    links: Vec<RowLink>,
}

impl LinkSet {
    pub fn new(mut links: Vec<RowLink>) -> Self {
        links.retain(|l| !l.is_empty());
        links.sort_by(|x, y| x.refs.cmp(&y.refs));
        Self { links }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowLink> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn into_links(self) -> Vec<RowLink> {
        self.links
    }

    /// Whether no row appears in more than one link.
    pub fn partition_ok(&self) -> bool {
        let mut all: Vec<RowRef> = self.links.iter().flat_map(|l| l.refs.iter().copied()).collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        all.len() == n
    }

    /// Every row of `table` appearing in some link, sorted.
    pub fn row_refs_in(&self, table: usize) -> Vec<RowRef> {
        let mut out: Vec<RowRef> = self
            .links
            .iter()
            .flat_map(|l| l.refs.iter().copied())
            .filter(|r| r.table == table)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl<'a> IntoIterator for &'a LinkSet {
    type Item = &'a RowLink;
    type IntoIter = std::slice::Iter<'a, RowLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.iter()
    }
}

/// Counters for one matching run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub rows_total: usize,
    pub rows_binned: usize,
    pub rows_skipped: usize,
    pub rows_out_of_bounds: usize,
    pub bins: usize,
    pub candidates_scored: u64,
    pub pairs_accepted: usize,
    pub links: usize,
    pub elapsed_micros: u64,
}

impl MatchStats {
    pub(crate) fn absorb_binning(&mut self, b: &index::BinningStats) {
        self.rows_total += b.rows_total;
        self.rows_binned += b.rows_binned;
        self.rows_skipped += b.rows_skipped;
        self.rows_out_of_bounds += b.rows_out_of_bounds;
        self.bins += b.bins;
    }
}

/// Everything a completed run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub links: LinkSet,
    /// Accepted pairs after mode filtering, sorted by `(a, b)`.
    pub pairs: Vec<ScoredPair>,
    pub stats: MatchStats,
}

/// Tuning knobs for [`RowMatcher`](crate::RowMatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Rows per unit of parallel work, for both binning and scanning.
    pub chunk_size: usize,
    /// Capacity, in batches, of the queue between scan workers and the
    /// link builder.
    pub channel_capacity: usize,
    /// Use the rayon pool; `false` runs every phase on the calling thread.
    pub parallel: bool,
    /// Minimum progress step, in percent, between two logged progress events.
    pub progress_step_percent: u8,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            channel_capacity: 64,
            parallel: true,
            progress_step_percent: 5,
        }
    }
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress_step_percent(mut self, step: u8) -> Self {
        self.progress_step_percent = step;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.chunk_size == 0 {
            return Err(MatchError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(MatchError::InvalidConfig(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        if self.progress_step_percent == 0 || self.progress_step_percent > 100 {
            return Err(MatchError::InvalidConfig(format!(
                "progress_step_percent must be in 1..=100 (got {})",
                self.progress_step_percent
            )));
        }
        Ok(())
    }

    pub(crate) fn index_config(&self) -> index::IndexConfig {
        index::IndexConfig::new()
            .with_chunk_size(self.chunk_size)
            .with_parallel(self.parallel)
    }
}

/// Where a [`RowMatcher`](crate::RowMatcher) is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherState {
    Idle,
    Binning,
    CandidateScan,
    LinkBuild,
    Done,
    Cancelled,
}

impl fmt::Display for MatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatcherState::Idle => "idle",
            MatcherState::Binning => "binning",
            MatcherState::CandidateScan => "candidate_scan",
            MatcherState::LinkBuild => "link_build",
            MatcherState::Done => "done",
            MatcherState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MatchError {
    /// Invalid configuration or arguments; reported before any work starts.
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    /// The run needs more memory or bins than allowed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("matcher has already run; call reset() to run again")]
    AlreadyRun,
    #[error("unknown match mode: {0}")]
    UnknownMode(String),
    /// A scan worker panicked or its queue broke.
    #[error("worker failure: {0}")]
    Worker(String),
}

impl MatchError {
    /// Route binning errors: too many bins is a resource problem, the rest
    /// stay index errors.
    pub(crate) fn from_index(err: IndexError) -> Self {
        if err.is_resource_exhausted() {
            MatchError::ResourceExhausted(err.to_string())
        } else {
            MatchError::Index(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(t: usize, i: usize) -> RowRef {
        RowRef::new(t, i)
    }

    #[test]
    fn pair_is_normalised() {
        let p = ScoredPair::new(r(1, 0), r(0, 3), 0.2);
        assert_eq!(p.a, r(0, 3));
        assert_eq!(p.b, r(1, 0));
        assert_eq!(p.member_in(1), Some(r(1, 0)));
        assert_eq!(p.member_in(2), None);
    }

    #[test]
    fn link_members_sorted_and_distinct() {
        let l = RowLink::new(vec![r(0, 5), r(0, 1), r(0, 5)], Some(0.1));
        assert_eq!(l.refs(), &[r(0, 1), r(0, 5)]);
        assert_eq!(l.first(), Some(r(0, 1)));
        assert!(l.contains(r(0, 5)));
        assert!(!l.contains(r(1, 5)));
    }

    #[test]
    fn link_set_orders_by_smallest_member() {
        let set = LinkSet::new(vec![
            RowLink::new(vec![r(0, 4), r(0, 9)], None),
            RowLink::new(vec![r(0, 2), r(0, 7)], None),
            RowLink::single(r(0, 3)),
        ]);
        let firsts: Vec<RowRef> = set.iter().filter_map(RowLink::first).collect();
        assert_eq!(firsts, vec![r(0, 2), r(0, 3), r(0, 4)]);
        assert!(set.partition_ok());
        assert_eq!(set.row_refs_in(0).len(), 5);
    }

    #[test]
    fn overlapping_links_break_partition() {
        let set = LinkSet::new(vec![
            RowLink::new(vec![r(0, 0), r(1, 0)], None),
            RowLink::new(vec![r(0, 0), r(1, 1)], None),
        ]);
        assert!(!set.partition_ok());
    }

    #[test]
    fn config_validation() {
        assert!(MatcherConfig::default().validate().is_ok());
        let err = MatcherConfig::new().with_chunk_size(0).validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
        let err = MatcherConfig::new().with_channel_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
        let err = MatcherConfig::new()
            .with_progress_step_percent(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidConfig(_)));
    }

    #[test]
    fn config_serde_fills_defaults() {
        let cfg: MatcherConfig = serde_json::from_str(r#"{"parallel":false}"#).unwrap();
        assert!(!cfg.parallel);
        assert_eq!(cfg.chunk_size, 4096);
    }

    #[test]
    fn too_many_bins_becomes_resource_exhausted() {
        let err = MatchError::from_index(IndexError::TooManyBins {
            table: 0,
            row: 1,
            cells: 1 << 20,
            limit: 65_536,
        });
        assert!(matches!(err, MatchError::ResourceExhausted(_)));
        let err = MatchError::from_index(IndexError::InvalidTable("x".into()));
        assert!(matches!(err, MatchError::Index(_)));
    }
}
