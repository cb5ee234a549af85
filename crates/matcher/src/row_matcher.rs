use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use engine::{check_width, is_match, MatchEngine, NdRange, Tuple};
use hashbrown::HashSet;
use index::{tuple_range, BinIndex, BinInput, CandidateFilter, IndexError, RowRef, TupleSource};
use rayon::prelude::*;
use tracing::{debug, info, warn, Level};

use crate::links::LinkBuilder;
use crate::metrics::metrics_recorder;
use crate::mode::{
    apply_group_mode, apply_internal_mode, apply_pair_mode, pairs_to_links, GroupMode, InternalMode,
    PairMode,
};
use crate::progress::{CancelToken, NoProgress, Outcome, Phase, ProgressSink};
use crate::types::{
    sort_pairs, LinkSet, MatchError, MatchResult, MatchStats, MatcherConfig, MatcherState,
    ScoredPair,
};


/// Drives binning, candidate scan and link building over a set of tables.
///
/// A matcher performs a single run. Further `find_*` calls fail with
/// [`MatchError::AlreadyRun`] until [`reset`](Self::reset) is called.
pub struct RowMatcher {
    engine: Arc<dyn MatchEngine>,
    tables: Vec<Arc<dyn TupleSource>>,
    config: MatcherConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    state: Mutex<MatcherState>,
}

#[derive(Clone, Copy)]
enum ScanFilter {
    /// Table matched against itself.
    Internal,
    /// Scanned rows look up partners in one indexed table.
    Against(usize),
    /// Every table indexed; partners must come from another table.
    CrossTable,
}

impl ScanFilter {
    fn for_row(self, me: RowRef) -> CandidateFilter {
        match self {
            ScanFilter::Internal => CandidateFilter::After(me),
            ScanFilter::Against(t) => CandidateFilter::InTable(t),
            ScanFilter::CrossTable => CandidateFilter::OtherTableAfter(me),
        }
    }
}

#[derive(Clone, Copy)]
struct ScanChunk {
    table: usize,
    start: usize,
    end: usize,
}

struct ScanPlan {
    chunks: Vec<ScanChunk>,
    bounds: Option<NdRange>,
    filter: ScanFilter,
    /// Scanned rows were not binned, so the scan accounts for them.
    count_rows: bool,
}

impl ScanPlan {
    fn rows(&self) -> usize {
        self.chunks.iter().map(|c| c.end - c.start).sum()
    }
}

#[derive(Default)]
struct ScanBatch {
    rows: usize,
    skipped: usize,
    out_of_bounds: usize,
    candidates: u64,
    pairs: Vec<ScoredPair>,
}

enum ScanStop {
    Cancelled,
    Failed(MatchError),
    Disconnected,
}

enum PairBounds {
    Unbounded,
    Bounded(NdRange),
    /// No row of one table can match any row of the other.
    Disjoint,
}

impl RowMatcher {
    /// Validate the configuration and wrap the tables.
    pub fn new(
        engine: Arc<dyn MatchEngine>,
        tables: Vec<Arc<dyn TupleSource>>,
        config: MatcherConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        if tables.is_empty() {
            return Err(MatchError::InvalidConfig(
                "at least one table is required".into(),
            ));
        }
        Ok(Self {
            engine,
            tables,
            config,
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
            state: Mutex::new(MatcherState::Idle),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn MatchEngine {
        self.engine.as_ref()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn state(&self) -> MatcherState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Allow another run. Also clears the cancel flag.
    pub fn reset(&self) {
        self.cancel.clear();
        self.set_state(MatcherState::Idle);
    }

    /// Match one table against itself.
    ///
    /// With `include_singles`, every usable row that ended up in no group is
    /// returned as a one-row link.
    pub fn find_internal_matches(
        &self,
        table: usize,
        include_singles: bool,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        let mode = if include_singles {
            InternalMode::Identify
        } else {
            InternalMode::Groups
        };
        self.find_internal_matches_with(table, mode)
    }

    /// Match one table against itself and reshape the groups with `mode`.
    pub fn find_internal_matches_with(
        &self,
        table: usize,
        mode: InternalMode,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        self.check_table(table)?;
        self.check_shape(&[table])?;
        self.begin()?;
        let span = tracing::span!(
            Level::INFO,
            "matcher.run",
            mode = "internal",
            tables = 1,
            engine = self.engine.name(),
            internal_mode = %mode
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.run_internal(table, mode);
        self.conclude("internal", start, res)
    }

    /// Match two different tables and keep pairs according to `mode`.
    pub fn find_pair_matches(
        &self,
        a: usize,
        b: usize,
        mode: PairMode,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        self.check_table(a)?;
        self.check_table(b)?;
        if a == b {
            return Err(MatchError::InvalidConfig(format!(
                "pair match needs two distinct tables (got {a} twice)"
            )));
        }
        self.check_shape(&[a, b])?;
        self.begin()?;
        let span = tracing::span!(
            Level::INFO,
            "matcher.run",
            mode = "pair",
            tables = 2,
            engine = self.engine.name(),
            pair_mode = %mode
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.run_pair(a, b, mode);
        self.conclude("pair", start, res)
    }

    /// Match any number of tables at once; rows from different tables link,
    /// and groups are the connected components of those links.
    pub fn find_group_matches(
        &self,
        tables: &[usize],
        mode: GroupMode,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        if tables.len() < 2 {
            return Err(MatchError::InvalidConfig(format!(
                "group match needs at least two tables (got {})",
                tables.len()
            )));
        }
        self.check_distinct(tables)?;
        self.check_shape(tables)?;
        self.begin()?;
        let span = tracing::span!(
            Level::INFO,
            "matcher.run",
            mode = "group",
            tables = tables.len(),
            engine = self.engine.name(),
            group_mode = %mode
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.run_group(tables, mode);
        self.conclude("group", start, res)
    }

    /// Match `reference` against each of `others` separately and join the
    /// results on the reference rows.
    ///
    /// With `best_only`, each pairwise match keeps a one-to-one best subset,
    /// so every link holds at most one row per table.
    pub fn find_multi_pairwise_matches(
        &self,
        reference: usize,
        others: &[usize],
        best_only: bool,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        if others.is_empty() {
            return Err(MatchError::InvalidConfig(
                "multi-pairwise match needs at least one other table".into(),
            ));
        }
        let mut all = Vec::with_capacity(others.len() + 1);
        all.push(reference);
        all.extend_from_slice(others);
        self.check_distinct(&all)?;
        self.check_shape(&all)?;
        self.begin()?;
        let span = tracing::span!(
            Level::INFO,
            "matcher.run",
            mode = "multi_pairwise",
            tables = all.len(),
            engine = self.engine.name(),
            best_only
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.run_multi_pairwise(reference, others, best_only);
        self.conclude("multi_pairwise", start, res)
    }

    fn run_internal(&self, table: usize, mode: InternalMode) -> Result<Outcome<MatchResult>, MatchError> {
        let mut stats = MatchStats::default();
        let inputs = [BinInput::new(table, self.tables[table].as_ref())];
        let Some(index) = self.bin_phase(&inputs, &mut stats)? else {
            return Ok(Outcome::Cancelled);
        };

        let plan = ScanPlan {
            chunks: self.chunks(&[table]),
            bounds: None,
            filter: ScanFilter::Internal,
            count_rows: false,
        };
        let mut builder = LinkBuilder::new();
        let mut pairs = Vec::new();
        if self
            .scan_phase(&index, &plan, Some(&mut builder), &mut pairs, &mut stats)?
            .is_cancelled()
        {
            return Ok(Outcome::Cancelled);
        }

        self.set_state(MatcherState::LinkBuild);
        let mut links = builder.finish();
        if mode != InternalMode::Groups {
            let singles = self.unlinked_rows(table, &links);
            links = apply_internal_mode(links, &singles, mode);
        }
        if mode.keeps_groups() {
            sort_pairs(&mut pairs);
        } else {
            pairs.clear();
        }
        self.progress.report(Phase::LinkBuild, 1, 1);
        Ok(Outcome::Completed(MatchResult {
            links,
            pairs,
            stats,
        }))
    }

    fn run_pair(&self, a: usize, b: usize, mode: PairMode) -> Result<Outcome<MatchResult>, MatchError> {
        let mut stats = MatchStats::default();
        let pairs = match self.scan_pair(a, b, &mut stats)? {
            Outcome::Completed(pairs) => pairs,
            Outcome::Cancelled => return Ok(Outcome::Cancelled),
        };

        self.set_state(MatcherState::LinkBuild);
        let pairs = apply_pair_mode(pairs, mode, a);
        let links = pairs_to_links(&pairs);
        self.progress.report(Phase::LinkBuild, 1, 1);
        Ok(Outcome::Completed(MatchResult {
            links,
            pairs,
            stats,
        }))
    }

    fn run_group(&self, tables: &[usize], mode: GroupMode) -> Result<Outcome<MatchResult>, MatchError> {
        let mut stats = MatchStats::default();
        let inputs: Vec<BinInput<'_>> = tables
            .iter()
            .map(|&t| BinInput::new(t, self.tables[t].as_ref()))
            .collect();
        let Some(index) = self.bin_phase(&inputs, &mut stats)? else {
            return Ok(Outcome::Cancelled);
        };

        let plan = ScanPlan {
            chunks: self.chunks(tables),
            bounds: None,
            filter: ScanFilter::CrossTable,
            count_rows: false,
        };
        let mut builder = LinkBuilder::new();
        let mut pairs = Vec::new();
        if self
            .scan_phase(&index, &plan, Some(&mut builder), &mut pairs, &mut stats)?
            .is_cancelled()
        {
            return Ok(Outcome::Cancelled);
        }

        self.set_state(MatcherState::LinkBuild);
        let links = apply_group_mode(builder.finish(), tables, mode);
        if mode != GroupMode::All {
            let kept: HashSet<RowRef> = links.iter().flat_map(|l| l.refs().iter().copied()).collect();
            pairs.retain(|p| kept.contains(&p.a));
        }
        sort_pairs(&mut pairs);
        self.progress.report(Phase::LinkBuild, 1, 1);
        Ok(Outcome::Completed(MatchResult {
            links,
            pairs,
            stats,
        }))
    }

    fn run_multi_pairwise(
        &self,
        reference: usize,
        others: &[usize],
        best_only: bool,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        let mut stats = MatchStats::default();
        let mut kept = Vec::new();
        for &other in others {
            let pairs = match self.scan_pair(reference, other, &mut stats)? {
                Outcome::Completed(pairs) => pairs,
                Outcome::Cancelled => return Ok(Outcome::Cancelled),
            };
            let mode = if best_only { PairMode::Best } else { PairMode::All };
            let pairs = apply_pair_mode(pairs, mode, reference);
            debug!(other, pairs = pairs.len(), "pairwise_leg_done");
            kept.extend(pairs);
        }

        self.set_state(MatcherState::LinkBuild);
        let mut builder = LinkBuilder::with_capacity(kept.len());
        builder.extend(&kept);
        let links = builder.finish();
        sort_pairs(&mut kept);
        self.progress.report(Phase::LinkBuild, 1, 1);
        Ok(Outcome::Completed(MatchResult {
            links,
            pairs: kept,
            stats,
        }))
    }

    /// Raw accepted pairs between two tables, using match bounds to skip rows
    /// that cannot match. The smaller table is indexed, the other scanned.
    fn scan_pair(
        &self,
        a: usize,
        b: usize,
        stats: &mut MatchStats,
    ) -> Result<Outcome<Vec<ScoredPair>>, MatchError> {
        let bounds = match self.pair_bounds(a, b)? {
            PairBounds::Unbounded => None,
            PairBounds::Bounded(r) => Some(r),
            PairBounds::Disjoint => {
                let rows = self.tables[a].row_count() + self.tables[b].row_count();
                stats.rows_total += rows;
                stats.rows_out_of_bounds += rows;
                debug!(a, b, "tables_cannot_overlap");
                return Ok(Outcome::Completed(Vec::new()));
            }
        };

        let (indexed, scanned) = if self.tables[a].row_count() <= self.tables[b].row_count() {
            (a, b)
        } else {
            (b, a)
        };
        let inputs = [BinInput::new(indexed, self.tables[indexed].as_ref()).with_bounds(bounds.as_ref())];
        let Some(index) = self.bin_phase(&inputs, stats)? else {
            return Ok(Outcome::Cancelled);
        };

        let plan = ScanPlan {
            chunks: self.chunks(&[scanned]),
            bounds,
            filter: ScanFilter::Against(indexed),
            count_rows: true,
        };
        let mut pairs = Vec::new();
        Ok(self
            .scan_phase(&index, &plan, None, &mut pairs, stats)?
            .map(|()| pairs))
    }

    fn pair_bounds(&self, a: usize, b: usize) -> Result<PairBounds, MatchError> {
        if !self.engine.can_bound_match() {
            return Ok(PairBounds::Unbounded);
        }
        let engine = self.engine.as_ref();
        let range_of = |t: usize| {
            tuple_range(
                engine,
                self.tables[t].as_ref(),
                self.config.chunk_size,
                self.config.parallel,
            )
        };
        let (Some(ra), Some(rb)) = (range_of(a), range_of(b)) else {
            return Ok(PairBounds::Disjoint);
        };
        let ranges = [ra, rb];
        let bounds = match (engine.match_bounds(&ranges, 0), engine.match_bounds(&ranges, 1)) {
            (Some(x), Some(y)) => match NdRange::intersection(&x, &y)? {
                Some(r) => PairBounds::Bounded(r),
                None => PairBounds::Disjoint,
            },
            (Some(r), None) | (None, Some(r)) => PairBounds::Bounded(r),
            (None, None) => PairBounds::Unbounded,
        };
        Ok(bounds)
    }

    fn bin_phase(
        &self,
        inputs: &[BinInput<'_>],
        stats: &mut MatchStats,
    ) -> Result<Option<BinIndex>, MatchError> {
        self.set_state(MatcherState::Binning);
        let progress = &self.progress;
        let cancel = &self.cancel;
        let observer = |done: usize, total: usize| {
            progress.report(Phase::Binning, done, total);
            if cancel.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let built = BinIndex::build(
            self.engine.as_ref(),
            inputs,
            &self.config.index_config(),
            &observer,
        )
        .map_err(MatchError::from_index)?;

        match built {
            Some(index) if !self.cancel.is_cancelled() => {
                let s = index.stats();
                if s.rows_skipped > 0 {
                    warn!(rows_skipped = s.rows_skipped, "unusable_rows_skipped");
                }
                debug!(
                    bins = s.bins,
                    entries = s.entries,
                    max_occupancy = index.max_occupancy(),
                    "binning_done"
                );
                stats.absorb_binning(s);
                Ok(Some(index))
            }
            _ => Ok(None),
        }
    }

    fn scan_phase(
        &self,
        index: &BinIndex,
        plan: &ScanPlan,
        mut builder: Option<&mut LinkBuilder>,
        pairs: &mut Vec<ScoredPair>,
        stats: &mut MatchStats,
    ) -> Result<Outcome<()>, MatchError> {
        self.set_state(MatcherState::CandidateScan);
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let total = plan.rows();
        if plan.count_rows {
            stats.rows_total += total;
        }
        let mut done = 0;
        let mut consume = |batch: ScanBatch| {
            done += batch.rows;
            stats.candidates_scored += batch.candidates;
            stats.pairs_accepted += batch.pairs.len();
            if plan.count_rows {
                stats.rows_skipped += batch.skipped;
                stats.rows_out_of_bounds += batch.out_of_bounds;
            }
            if let Some(builder) = builder.as_deref_mut() {
                builder.extend(&batch.pairs);
            }
            pairs.extend(batch.pairs);
            self.progress.report(Phase::CandidateScan, done, total);
        };

        let outcome = if self.config.parallel {
            self.scan_parallel(index, plan, &mut consume)?
        } else {
            let engine = self.engine.as_ref();
            for chunk in &plan.chunks {
                if self.cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }
                consume(scan_chunk(engine, &self.tables, index, plan, *chunk)?);
            }
            Outcome::Completed(())
        };
        debug!(
            candidates = stats.candidates_scored,
            pairs = stats.pairs_accepted,
            "candidate_scan_done"
        );
        Ok(outcome)
    }

    /// Workers scan chunks on the rayon pool and push batches through a
    /// bounded queue; the calling thread consumes them in arrival order.
    ///
    /// A caller that is itself a rayon worker must not block on the queue,
    /// since the chunks it waits for may be queued behind it on the same
    /// pool. Such callers collect the batches on their own pool instead.
    fn scan_parallel(
        &self,
        index: &BinIndex,
        plan: &ScanPlan,
        consume: &mut dyn FnMut(ScanBatch),
    ) -> Result<Outcome<()>, MatchError> {
        let stopped = if rayon::current_thread_index().is_some() {
            self.scan_collected(index, plan, consume)
        } else {
            self.scan_streamed(index, plan, consume)?
        };
        match stopped {
            Ok(()) => Ok(Outcome::Completed(())),
            Err(ScanStop::Cancelled) => Ok(Outcome::Cancelled),
            Err(ScanStop::Failed(err)) => Err(err),
            Err(ScanStop::Disconnected) => Err(MatchError::Worker(
                "result queue closed before the scan finished".into(),
            )),
        }
    }

    fn scan_streamed(
        &self,
        index: &BinIndex,
        plan: &ScanPlan,
        consume: &mut dyn FnMut(ScanBatch),
    ) -> Result<Result<(), ScanStop>, MatchError> {
        let (tx, rx) = crossbeam_channel::bounded::<ScanBatch>(self.config.channel_capacity);
        let engine = self.engine.as_ref();
        let tables = self.tables.as_slice();
        let cancel = &self.cancel;

        let joined = std::thread::scope(|s| {
            let producer = s.spawn(move || {
                plan.chunks.par_iter().try_for_each_with(tx, |tx, chunk| {
                    if cancel.is_cancelled() {
                        return Err(ScanStop::Cancelled);
                    }
                    let batch =
                        scan_chunk(engine, tables, index, plan, *chunk).map_err(ScanStop::Failed)?;
                    tx.send(batch).map_err(|_| ScanStop::Disconnected)
                })
            });
            for batch in rx.iter() {
                consume(batch);
            }
            producer.join()
        });
        joined.map_err(|_| MatchError::Worker("scan worker panicked".into()))
    }

    /// Scan on the current pool and hand the batches over in chunk order.
    fn scan_collected(
        &self,
        index: &BinIndex,
        plan: &ScanPlan,
        consume: &mut dyn FnMut(ScanBatch),
    ) -> Result<(), ScanStop> {
        let engine = self.engine.as_ref();
        let tables = self.tables.as_slice();
        let cancel = &self.cancel;
        let batches = plan
            .chunks
            .par_iter()
            .map(|chunk| {
                if cancel.is_cancelled() {
                    return Err(ScanStop::Cancelled);
                }
                scan_chunk(engine, tables, index, plan, *chunk).map_err(ScanStop::Failed)
            })
            .collect::<Result<Vec<_>, _>>()?;
        for batch in batches {
            if cancel.is_cancelled() {
                return Err(ScanStop::Cancelled);
            }
            consume(batch);
        }
        Ok(())
    }

    /// Usable rows of `table` that are in no link.
    fn unlinked_rows(&self, table: usize, links: &LinkSet) -> Vec<RowRef> {
        let linked: HashSet<RowRef> = links.row_refs_in(table).into_iter().collect();
        let source = self.tables[table].as_ref();
        let mut tuple = Tuple::with_capacity(self.engine.arity());
        let mut singles = Vec::new();
        for row in 0..source.row_count() {
            let r = RowRef::new(table, row);
            if linked.contains(&r) {
                continue;
            }
            source.read_tuple(row, &mut tuple);
            if self.engine.is_usable(&tuple) {
                singles.push(r);
            }
        }
        singles
    }

    fn chunks(&self, tables: &[usize]) -> Vec<ScanChunk> {
        let size = self.config.chunk_size;
        tables
            .iter()
            .flat_map(|&table| {
                let rows = self.tables[table].row_count();
                (0..rows).step_by(size).map(move |start| ScanChunk {
                    table,
                    start,
                    end: (start + size).min(rows),
                })
            })
            .collect()
    }

    fn check_table(&self, table: usize) -> Result<(), MatchError> {
        if table < self.tables.len() {
            Ok(())
        } else {
            Err(MatchError::InvalidConfig(format!(
                "table index {table} out of range ({} tables)",
                self.tables.len()
            )))
        }
    }

    fn check_distinct(&self, tables: &[usize]) -> Result<(), MatchError> {
        let mut seen = HashSet::with_capacity(tables.len());
        for &t in tables {
            self.check_table(t)?;
            if !seen.insert(t) {
                return Err(MatchError::InvalidConfig(format!(
                    "table {t} listed more than once"
                )));
            }
        }
        Ok(())
    }

    /// Tables reporting a tuple width must match the engine's tuple shape.
    fn check_shape(&self, tables: &[usize]) -> Result<(), MatchError> {
        let fields = self.engine.tuple_infos();
        for &t in tables {
            if let Some(width) = self.tables[t].arity() {
                check_width(&fields, width).inspect_err(|err| {
                    warn!(table = t, name = self.tables[t].name(), error = %err, "table_shape_mismatch");
                })?;
            }
        }
        Ok(())
    }

    fn set_state(&self, state: MatcherState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn begin(&self) -> Result<(), MatchError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != MatcherState::Idle {
            return Err(MatchError::AlreadyRun);
        }
        *state = MatcherState::Binning;
        Ok(())
    }

    fn conclude(
        &self,
        kind: &'static str,
        start: Instant,
        res: Result<Outcome<MatchResult>, MatchError>,
    ) -> Result<Outcome<MatchResult>, MatchError> {
        let elapsed = start.elapsed();
        let elapsed_micros = elapsed.as_micros() as u64;
        match res {
            Ok(Outcome::Completed(mut result)) => {
                result.stats.elapsed_micros = elapsed_micros;
                result.stats.links = result.links.len();
                self.set_state(MatcherState::Done);
                info!(
                    kind,
                    links = result.stats.links,
                    pairs = result.pairs.len(),
                    candidates = result.stats.candidates_scored,
                    rows_binned = result.stats.rows_binned,
                    rows_skipped = result.stats.rows_skipped,
                    elapsed_micros,
                    "match_success"
                );
                if let Some(recorder) = metrics_recorder() {
                    recorder.record_run(kind, elapsed, &result.stats);
                }
                Ok(Outcome::Completed(result))
            }
            Ok(Outcome::Cancelled) => {
                self.set_state(MatcherState::Cancelled);
                warn!(kind, elapsed_micros, "match_cancelled");
                Ok(Outcome::Cancelled)
            }
            Err(err) => {
                self.set_state(MatcherState::Done);
                warn!(kind, error = %err, elapsed_micros, "match_failure");
                Err(err)
            }
        }
    }
}

/// Score every candidate of every row in one chunk.
fn scan_chunk(
    engine: &dyn MatchEngine,
    tables: &[Arc<dyn TupleSource>],
    index: &BinIndex,
    plan: &ScanPlan,
    chunk: ScanChunk,
) -> Result<ScanBatch, MatchError> {
    let source = tables[chunk.table].as_ref();
    let mut batch = ScanBatch {
        rows: chunk.end - chunk.start,
        ..ScanBatch::default()
    };
    let mut tuple = Tuple::with_capacity(engine.arity());
    let mut other = Tuple::with_capacity(engine.arity());
    let mut candidates = Vec::new();

    for row in chunk.start..chunk.end {
        source.read_tuple(row, &mut tuple);
        if !engine.is_usable(&tuple) {
            batch.skipped += 1;
            continue;
        }
        if let Some(bounds) = &plan.bounds {
            if !bounds.contains(&tuple) {
                batch.out_of_bounds += 1;
                continue;
            }
        }
        let keys = engine
            .bins(&tuple)
            .map_err(|e| MatchError::from_index(IndexError::from_bin(chunk.table, row, e)))?;
        let me = RowRef::new(chunk.table, row);
        index.candidates(&keys, plan.filter.for_row(me), &mut candidates);
        for &c in &candidates {
            tables[c.table].read_tuple(c.row, &mut other);
            batch.candidates += 1;
            let score = engine.score(&tuple, &other);
            if is_match(score) {
                batch.pairs.push(ScoredPair::new(me, c, score));
            }
        }
    }
    Ok(batch)
}
