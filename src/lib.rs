//! Workspace umbrella crate for xmatch, a spatial row cross-matcher.
//!
//! This crate stitches the engine, index and matcher layers together so
//! callers can describe a run in one [`XmatchConfig`] and execute it against
//! a list of tables with a single entry point, [`run_match`].

pub mod config;

pub use config::{ConfigLoadError, RunConfig, XmatchConfig};
pub use engine::{
    CartesianEngine, EngineConfig, EngineError, ErrorCartesianEngine, MatchEngine, NdRange,
    SkyEngine, Tuple, NO_MATCH,
};
pub use index::{ColumnTable, RowRef, TupleSource, VecTable};
pub use matcher::{
    set_match_metrics, CancelToken, GroupMode, InternalMode, LinkSet, MatchError, MatchMetrics,
    MatchResult, MatchStats, MatcherConfig, MatcherState, Outcome, PairMode, Phase, ProgressSink,
    RowLink, RowMatcher, ScoredPair, TracingProgress,
};

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn, Level};

/// Errors that can occur while running a configured match.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("engine setup failed: {0}")]
    Engine(#[from] EngineError),

    #[error("matching failed: {0}")]
    Match(#[from] MatchError),

    #[error("run needs {needed} tables but {available} were given")]
    TableCount { needed: usize, available: usize },
}

/// Run the match described by `config` over `tables`.
///
/// Progress is logged through `tracing` at the configured step.
pub fn run_match(
    config: &XmatchConfig,
    tables: Vec<Arc<dyn TupleSource>>,
) -> Result<Outcome<MatchResult>, PipelineError> {
    run_match_with_cancel(config, tables, CancelToken::new())
}

/// [`run_match`] with a caller-held cancellation token.
pub fn run_match_with_cancel(
    config: &XmatchConfig,
    tables: Vec<Arc<dyn TupleSource>>,
    cancel: CancelToken,
) -> Result<Outcome<MatchResult>, PipelineError> {
    let needed = config.run.tables_needed();
    if tables.len() < needed {
        return Err(PipelineError::TableCount {
            needed,
            available: tables.len(),
        });
    }

    let start = Instant::now();
    let span = tracing::span!(
        Level::INFO,
        "xmatch.pipeline",
        engine = config.engine.kind(),
        mode = config.run.kind(),
        name = config.name.as_deref().unwrap_or("")
    );
    let _guard = span.enter();

    let engine = config.engine.build()?;
    let progress = Arc::new(TracingProgress::new(config.matcher.progress_step_percent));
    let matcher = RowMatcher::new(engine, tables, config.matcher.clone())?
        .with_progress(progress)
        .with_cancel(cancel);

    let outcome = match &config.run {
        RunConfig::Internal {
            table,
            include_singles,
            internal_mode,
        } => {
            let mode = match internal_mode {
                InternalMode::Groups if *include_singles => InternalMode::Identify,
                mode => *mode,
            };
            matcher.find_internal_matches_with(*table, mode)
        }
        RunConfig::Pair { a, b, pair_mode } => matcher.find_pair_matches(*a, *b, *pair_mode),
        RunConfig::Group { tables, group_mode } => {
            matcher.find_group_matches(tables, *group_mode)
        }
        RunConfig::MultiPairwise {
            reference,
            others,
            best_only,
        } => matcher.find_multi_pairwise_matches(*reference, others, *best_only),
    };

    let elapsed_micros = start.elapsed().as_micros() as u64;
    match outcome {
        Ok(outcome) => {
            info!(
                cancelled = outcome.is_cancelled(),
                elapsed_micros, "pipeline_done"
            );
            Ok(outcome)
        }
        Err(err) => {
            warn!(error = %err, elapsed_micros, "pipeline_failure");
            Err(err.into())
        }
    }
}

/// Synthetic catalogue for demos and benchmarks.
///
/// Produces `clusters` groups of `per_cluster` points in `ndim` dimensions.
/// Cluster centres are spread over `[0, extent)` on every axis and members
/// jitter by at most `jitter` per axis around their centre. The output only
/// depends on `seed`.
pub fn synthetic_catalogue(
    name: &str,
    ndim: usize,
    clusters: usize,
    per_cluster: usize,
    extent: f64,
    jitter: f64,
    seed: u64,
) -> VecTable {
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        // splitmix64
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    };

    let mut rows = Vec::with_capacity(clusters * per_cluster);
    for _ in 0..clusters {
        let centre: Vec<f64> = (0..ndim).map(|_| next() * extent).collect();
        for _ in 0..per_cluster {
            rows.push(
                centre
                    .iter()
                    .map(|c| c + (next() * 2.0 - 1.0) * jitter)
                    .collect(),
            );
        }
    }
    VecTable::new(name, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(t: VecTable) -> Arc<dyn TupleSource> {
        Arc::new(t)
    }

    #[test]
    fn synthetic_catalogue_is_seeded() {
        let a = synthetic_catalogue("a", 2, 10, 3, 100.0, 0.1, 42);
        let b = synthetic_catalogue("b", 2, 10, 3, 100.0, 0.1, 42);
        let c = synthetic_catalogue("c", 2, 10, 3, 100.0, 0.1, 43);
        assert_eq!(a.rows(), b.rows());
        assert_ne!(a.rows(), c.rows());
        assert_eq!(a.row_count(), 30);
        assert!(a.rows().iter().all(|r| r.len() == 2));
    }

    #[test]
    fn run_match_internal_default() {
        let table = shared(VecTable::from(vec![[0.0, 0.0], [0.5, 0.0], [5.0, 5.0]]));
        let outcome = run_match(&XmatchConfig::default(), vec![table]).unwrap();
        let result = outcome.into_completed().unwrap();
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.stats.pairs_accepted, 1);
    }

    #[test]
    fn run_match_checks_table_count() {
        let config = XmatchConfig {
            run: RunConfig::Pair {
                a: 0,
                b: 1,
                pair_mode: PairMode::Best,
            },
            ..XmatchConfig::default()
        };
        let table = shared(VecTable::from(vec![[0.0, 0.0]]));
        let err = run_match(&config, vec![table]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TableCount {
                needed: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn run_match_reports_bad_engine() {
        let config = XmatchConfig {
            engine: EngineConfig::cartesian(0, 1.0),
            ..XmatchConfig::default()
        };
        let table = shared(VecTable::from(vec![[0.0, 0.0]]));
        let err = run_match(&config, vec![table]).unwrap_err();
        assert!(matches!(err, PipelineError::Engine(_)));
    }

    #[test]
    fn run_match_honours_cancellation() {
        let table = shared(synthetic_catalogue("t", 2, 50, 2, 100.0, 0.2, 1));
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = run_match_with_cancel(&XmatchConfig::default(), vec![table], cancel).unwrap();
        assert!(outcome.is_cancelled());
    }
}
