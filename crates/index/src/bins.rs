//! Bin index construction.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use engine::{BinKey, MatchEngine, NdRange, Tuple};
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};

use crate::source::TupleSource;
use crate::{IndexConfig, IndexError, RowRef};

/// One table to be binned.
#[derive(Clone, Copy)]
pub struct BinInput<'a> {
    /// Position of the table in the caller's table list; becomes
    /// [`RowRef::table`].
    pub table: usize,
    pub source: &'a dyn TupleSource,
    /// Rows outside this range cannot match anything and are not binned.
    pub bounds: Option<&'a NdRange>,
}

/// What happens to a row when it is offered to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Usable,
    /// Missing or invalid values.
    Unusable,
    /// Usable, but outside the match bounds.
    OutOfBounds,
}

impl<'a> BinInput<'a> {
    pub fn new(table: usize, source: &'a dyn TupleSource) -> Self {
        Self {
            table,
            source,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: Option<&'a NdRange>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn admit(&self, engine: &dyn MatchEngine, tuple: &[f64]) -> Admission {
        if !engine.is_usable(tuple) {
            return Admission::Unusable;
        }
        match self.bounds {
            Some(b) if !b.contains(tuple) => Admission::OutOfBounds,
            _ => Admission::Usable,
        }
    }
}

/// Counters gathered while binning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinningStats {
    pub rows_total: usize,
    pub rows_binned: usize,
    /// Rows with missing or invalid values.
    pub rows_skipped: usize,
    pub rows_out_of_bounds: usize,
    /// Distinct bins.
    pub bins: usize,
    /// Row entries over all bins.
    pub entries: usize,
}

impl BinningStats {
    fn merge(mut self, other: BinningStats) -> Self {
        self.rows_total += other.rows_total;
        self.rows_binned += other.rows_binned;
        self.rows_skipped += other.rows_skipped;
        self.rows_out_of_bounds += other.rows_out_of_bounds;
        self
    }
}

/// Map from bin key to the sorted, distinct rows in that bin.
#[derive(Debug, Clone, Default)]
pub struct BinIndex {
    pub(crate) bins: HashMap<BinKey, Vec<RowRef>>,
    stats: BinningStats,
}

#[derive(Default)]
struct Partial {
    bins: HashMap<BinKey, Vec<RowRef>>,
    stats: BinningStats,
}

impl Partial {
    fn merge(self, other: Partial) -> Partial {
        let (mut big, small) = if self.bins.len() >= other.bins.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (key, refs) in small.bins {
            big.bins.entry(key).or_default().extend(refs);
        }
        big.stats = big.stats.merge(small.stats);
        big
    }
}

#[derive(Clone, Copy)]
struct Chunk {
    input: usize,
    start: usize,
    end: usize,
}

impl BinIndex {
    /// Bin every row of every input.
    ///
    /// `observer(done, total)` is called after each chunk with the number of
    /// rows processed so far. Returning `ControlFlow::Break` stops the build;
    /// chunks already running finish, the rest are skipped, and the result
    /// is `Ok(None)`.
    pub fn build<F>(
        engine: &dyn MatchEngine,
        inputs: &[BinInput<'_>],
        cfg: &IndexConfig,
        observer: &F,
    ) -> Result<Option<BinIndex>, IndexError>
    where
        F: Fn(usize, usize) -> ControlFlow<()> + Sync,
    {
        cfg.validate()?;
        let start = Instant::now();
        let total: usize = inputs.iter().map(|i| i.source.row_count()).sum();
        let span = tracing::span!(
            Level::DEBUG,
            "index.build",
            engine = engine.name(),
            tables = inputs.len(),
            rows = total
        );
        let _guard = span.enter();

        let chunks: Vec<Chunk> = inputs
            .iter()
            .enumerate()
            .flat_map(|(input, bin_input)| {
                let rows = bin_input.source.row_count();
                (0..rows).step_by(cfg.chunk_size).map(move |start| Chunk {
                    input,
                    start,
                    end: (start + cfg.chunk_size).min(rows),
                })
            })
            .collect();

        let done = AtomicUsize::new(0);
        let stopped = AtomicBool::new(false);
        let run_chunk = |chunk: &Chunk| -> Result<Partial, IndexError> {
            if stopped.load(Ordering::Relaxed) {
                return Ok(Partial::default());
            }
            let partial = bin_chunk(engine, &inputs[chunk.input], chunk.start, chunk.end)?;
            let so_far = done.fetch_add(chunk.end - chunk.start, Ordering::Relaxed)
                + (chunk.end - chunk.start);
            if observer(so_far, total).is_break() {
                stopped.store(true, Ordering::Relaxed);
            }
            Ok(partial)
        };

        let merged = if cfg.parallel {
            chunks
                .par_iter()
                .map(run_chunk)
                .try_reduce(Partial::default, |a, b| Ok(a.merge(b)))?
        } else {
            chunks
                .iter()
                .map(run_chunk)
                .try_fold(Partial::default(), |acc, p| p.map(|p| acc.merge(p)))?
        };

        if stopped.load(Ordering::Relaxed) {
            debug!(rows_done = done.load(Ordering::Relaxed), "index_build_stopped");
            return Ok(None);
        }

        let Partial {
            mut bins,
            mut stats,
        } = merged;
        let mut entries = 0;
        for refs in bins.values_mut() {
            refs.sort_unstable();
            refs.dedup();
            entries += refs.len();
        }
        stats.bins = bins.len();
        stats.entries = entries;

        info!(
            bins = stats.bins,
            entries = stats.entries,
            rows_binned = stats.rows_binned,
            rows_skipped = stats.rows_skipped,
            rows_out_of_bounds = stats.rows_out_of_bounds,
            elapsed_micros = start.elapsed().as_micros() as u64,
            "index_built"
        );
        Ok(Some(BinIndex { bins, stats }))
    }

    pub fn stats(&self) -> &BinningStats {
        &self.stats
    }

    /// Number of distinct bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Rows in one bin, sorted.
    pub fn bin(&self, key: &BinKey) -> Option<&[RowRef]> {
        self.bins.get(key).map(Vec::as_slice)
    }

    /// Size of the fullest bin; a rough indicator of a badly chosen scale.
    pub fn max_occupancy(&self) -> usize {
        self.bins.values().map(Vec::len).max().unwrap_or(0)
    }
}

fn bin_chunk(
    engine: &dyn MatchEngine,
    input: &BinInput<'_>,
    start: usize,
    end: usize,
) -> Result<Partial, IndexError> {
    let mut partial = Partial::default();
    partial.stats.rows_total = end - start;
    let mut tuple = Tuple::with_capacity(engine.arity());
    for row in start..end {
        input.source.read_tuple(row, &mut tuple);
        match input.admit(engine, &tuple) {
            Admission::Usable => {}
            Admission::Unusable => {
                partial.stats.rows_skipped += 1;
                continue;
            }
            Admission::OutOfBounds => {
                partial.stats.rows_out_of_bounds += 1;
                continue;
            }
        }
        let keys = engine
            .bins(&tuple)
            .map_err(|e| IndexError::from_bin(input.table, row, e))?;
        let r = RowRef::new(input.table, row);
        for key in keys {
            partial.bins.entry(key).or_default().push(r);
        }
        partial.stats.rows_binned += 1;
    }
    Ok(partial)
}
