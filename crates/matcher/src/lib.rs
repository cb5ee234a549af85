//! # xmatch Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` runs a cross-match over one or more tables. It sits on top of
//! the engine layer (`engine`), which decides what a match is, and the index
//! layer (`index`), which turns rows into bins and bins into candidates.
//!
//! A run goes through three phases:
//! 1. **Binning**: every usable row of the indexed tables is placed into the
//!    bins its engine reports, in parallel chunks.
//! 2. **Candidate scan**: every scanned row looks up the rows sharing one of
//!    its bins and asks the engine for a score. Workers stream accepted pairs
//!    through a bounded queue to the calling thread.
//! 3. **Link build**: pairs are merged into links with union-find, then the
//!    requested match mode picks which links or pairs to keep.
//!
//! ## Core Types
//!
//! - [`RowMatcher`]: the orchestrator; one run per instance until
//!   [`RowMatcher::reset`].
//! - [`MatcherConfig`]: chunk size, queue capacity and parallelism.
//! - [`LinkBuilder`]: union-find over [`ScoredPair`]s.
//! - [`PairMode`] / [`GroupMode`]: post-processing of two-table and
//!   multi-table matches.
//! - [`ProgressSink`] / [`CancelToken`]: progress reporting and cooperative
//!   cancellation; a cancelled run returns [`Outcome::Cancelled`].
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use engine::{CartesianEngine, MatchEngine};
//! use index::{TupleSource, VecTable};
//! use matcher::{MatcherConfig, RowMatcher};
//!
//! let engine: Arc<dyn MatchEngine> = Arc::new(CartesianEngine::new(2, 1.0).unwrap());
//! let table: Arc<dyn TupleSource> = Arc::new(VecTable::from(vec![
//!     [0.0, 0.0],
//!     [0.5, 0.0],
//!     [5.0, 5.0],
//! ]));
//!
//! let matcher = RowMatcher::new(engine, vec![table], MatcherConfig::default()).unwrap();
//! let result = matcher
//!     .find_internal_matches(0, false)
//!     .unwrap()
//!     .into_completed()
//!     .unwrap();
//! assert_eq!(result.links.len(), 1);
//! ```
//!
//! ## Observability
//!
//! Runs emit `tracing` spans (`matcher.run`) and events (`match_success`,
//! `match_cancelled`, `match_failure`). Install a [`MatchMetrics`]
//! implementation via [`set_match_metrics`] to record per-run latency and
//! counters.

mod links;
pub mod metrics;
mod mode;
mod progress;
mod row_matcher;
mod types;

pub use crate::links::LinkBuilder;
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::mode::{
    apply_group_mode, apply_internal_mode, apply_pair_mode, pairs_to_links, GroupMode,
    InternalMode, PairMode,
};
pub use crate::progress::{CancelToken, NoProgress, Outcome, Phase, ProgressSink, TracingProgress};
pub use crate::row_matcher::RowMatcher;
pub use crate::types::{
    LinkSet, MatchError, MatchResult, MatchStats, MatcherConfig, MatcherState, RowLink, ScoredPair,
};
