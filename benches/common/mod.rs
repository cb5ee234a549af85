//! Common utilities for xmatch benchmarks
//!
//! Shared helpers for generating catalogues and building matchers.

#![allow(dead_code)]

use std::sync::Arc;

use engine::{CartesianEngine, MatchEngine, SkyEngine};
use index::{TupleSource, VecTable};
use matcher::{MatcherConfig, RowMatcher};
use xmatch::synthetic_catalogue;

/// Clustered 2-D catalogue: `clusters` groups of three rows each.
pub fn plane_catalogue(clusters: usize, seed: u64) -> Arc<dyn TupleSource> {
    Arc::new(synthetic_catalogue(
        "bench-plane",
        2,
        clusters,
        3,
        (clusters as f64).sqrt() * 10.0,
        0.2,
        seed,
    ))
}

/// Sky catalogue with pairs of sources about an arcsecond apart.
pub fn sky_catalogue(clusters: usize, seed: u64) -> Arc<dyn TupleSource> {
    let base = synthetic_catalogue("bench-sky", 2, clusters, 2, 160.0, 0.5 / 3600.0, seed);
    let rows = base.rows().iter().map(|r| vec![r[0], r[1] - 80.0]).collect();
    Arc::new(VecTable::new("bench-sky", rows))
}

pub fn plane_engine() -> Arc<dyn MatchEngine> {
    Arc::new(CartesianEngine::new(2, 1.0).expect("valid engine"))
}

pub fn sky_engine() -> Arc<dyn MatchEngine> {
    Arc::new(SkyEngine::from_arcsec(2.0).expect("valid engine"))
}

pub fn matcher(
    engine: Arc<dyn MatchEngine>,
    tables: Vec<Arc<dyn TupleSource>>,
    config: MatcherConfig,
) -> RowMatcher {
    RowMatcher::new(engine, tables, config).expect("valid matcher")
}
