//! Demo binary: match a synthetic catalogue and print a JSON summary.
//!
//! ```text
//! xmatch [config.yaml] [clusters]
//! ```
//!
//! Without a config file the default internal match runs. Logging follows
//! `RUST_LOG` (default `info`); set `XMATCH_LOG_FORMAT=json` for JSON lines.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use xmatch::{
    run_match, synthetic_catalogue, EngineConfig, Outcome, TupleSource, VecTable, XmatchConfig,
};

const DEFAULT_CLUSTERS: usize = 10_000;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if env::var("XMATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A differently seeded sample per table, with clusters tight enough to
/// match at the engine's scale.
fn demo_table(engine: &EngineConfig, index: usize, clusters: usize) -> Arc<dyn TupleSource> {
    let name = format!("synthetic-{index}");
    let seed = 0x5EED + index as u64;
    let table = match *engine {
        EngineConfig::Cartesian { ndim, scale, .. } => {
            synthetic_catalogue(&name, ndim, clusters, 2, 1_000.0 * scale, 0.3 * scale, seed)
        }
        EngineConfig::ErrorCartesian { ndim, scale, .. } => {
            let base = synthetic_catalogue(&name, ndim, clusters, 2, 1_000.0 * scale, 0.3 * scale, seed);
            let rows = base
                .rows()
                .iter()
                .map(|r| {
                    let mut row = r.clone();
                    row.push(0.5 * scale);
                    row
                })
                .collect();
            VecTable::new(name, rows)
        }
        EngineConfig::Sky {
            max_separation_arcsec,
            ..
        } => {
            let deg = max_separation_arcsec / 3600.0;
            let base = synthetic_catalogue(&name, 2, clusters, 2, 160.0, 0.3 * deg, seed);
            // shift latitude into (-80, 80)
            let rows = base.rows().iter().map(|r| vec![r[0], r[1] - 80.0]).collect();
            VecTable::new(name, rows)
        }
    };
    Arc::new(table)
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => XmatchConfig::from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => XmatchConfig::default(),
    };
    let clusters = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid cluster count {n:?}"))?,
        None => DEFAULT_CLUSTERS,
    };

    let tables: Vec<Arc<dyn TupleSource>> = (0..config.run.tables_needed())
        .map(|i| demo_table(&config.engine, i, clusters))
        .collect();

    let result = match run_match(&config, tables)? {
        Outcome::Completed(result) => result,
        Outcome::Cancelled => bail!("match was cancelled"),
    };

    let summary = json!({
        "name": config.name,
        "engine": config.engine.kind(),
        "mode": config.run.kind(),
        "links": result.links.len(),
        "pairs": result.pairs.len(),
        "stats": result.stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
