//! Row sources: where tuples come from.
//!
//! The matcher never owns table storage. It reads tuples on demand through
//! [`TupleSource`], which is implemented here for two in-memory layouts and
//! can be implemented by any caller-side table reader.

use engine::{MatchEngine, NdRange, RangeAccumulator, Tuple};
use rayon::prelude::*;

use crate::IndexError;

/// Random-access reader of row tuples.
///
/// Implementations must be safe to read from many threads at once.
pub trait TupleSource: Send + Sync {
    /// Number of rows in the table.
    fn row_count(&self) -> usize;

    /// Overwrite `out` with the tuple of `row`.
    ///
    /// Missing values are written as `NaN`. A row index past the end leaves
    /// `out` empty, which every engine treats as unusable.
    fn read_tuple(&self, row: usize, out: &mut Tuple);

    /// Width of the tuples this table produces, if known without reading
    /// every row. Matchers reject a table whose width does not fit the
    /// engine before any work starts.
    fn arity(&self) -> Option<usize> {
        None
    }

    /// Label used in logs.
    fn name(&self) -> &str {
        "table"
    }
}

/// Row-major table held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecTable {
    name: String,
    rows: Vec<Tuple>,
}

impl VecTable {
    pub fn new(name: impl Into<String>, rows: Vec<Tuple>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn push(&mut self, tuple: Tuple) {
        self.rows.push(tuple);
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }
}

impl<const N: usize> From<Vec<[f64; N]>> for VecTable {
    fn from(rows: Vec<[f64; N]>) -> Self {
        VecTable::new("table", rows.into_iter().map(|r| r.to_vec()).collect())
    }
}

impl TupleSource for VecTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn read_tuple(&self, row: usize, out: &mut Tuple) {
        out.clear();
        if let Some(values) = self.rows.get(row) {
            out.extend_from_slice(values);
        }
    }

    /// Widest row; narrower rows are ragged and get skipped.
    fn arity(&self) -> Option<usize> {
        self.rows.iter().map(Vec::len).max()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Column-major table with a column mapping.
///
/// The mapping picks which columns make up the tuple and in which order,
/// for example `[ra, dec]` or `[x, y, err]` out of a wider table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTable {
    name: String,
    columns: Vec<Vec<f64>>,
    mapping: Vec<usize>,
    len: usize,
}

impl ColumnTable {
    /// Build from equal-length columns; the initial mapping uses every column
    /// in order.
    pub fn new(name: impl Into<String>, columns: Vec<Vec<f64>>) -> Result<Self, IndexError> {
        let name = name.into();
        let len = columns.first().map_or(0, Vec::len);
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != len) {
            return Err(IndexError::InvalidTable(format!(
                "{name}: column {i} has {} rows, expected {len}",
                col.len()
            )));
        }
        let mapping = (0..columns.len()).collect();
        Ok(Self {
            name,
            columns,
            mapping,
            len,
        })
    }

    /// Select the columns that form the tuple.
    pub fn with_mapping(mut self, mapping: Vec<usize>) -> Result<Self, IndexError> {
        if let Some(&bad) = mapping.iter().find(|&&c| c >= self.columns.len()) {
            return Err(IndexError::InvalidTable(format!(
                "{}: column {bad} does not exist ({} columns)",
                self.name,
                self.columns.len()
            )));
        }
        self.mapping = mapping;
        Ok(self)
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }
}

impl TupleSource for ColumnTable {
    fn row_count(&self) -> usize {
        self.len
    }

    fn read_tuple(&self, row: usize, out: &mut Tuple) {
        out.clear();
        if row >= self.len {
            return;
        }
        out.extend(self.mapping.iter().map(|&c| self.columns[c][row]));
    }

    fn arity(&self) -> Option<usize> {
        Some(self.mapping.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Bounding range of every tuple in `source` the engine considers usable.
///
/// Returns `None` for a table with no usable rows.
pub fn tuple_range(
    engine: &dyn MatchEngine,
    source: &dyn TupleSource,
    chunk_size: usize,
    parallel: bool,
) -> Option<NdRange> {
    let arity = engine.arity();
    let rows = source.row_count();
    let chunk_size = chunk_size.max(1);
    let fold_chunk = |start: usize| {
        let mut acc = RangeAccumulator::new(arity);
        let mut tuple = Tuple::with_capacity(arity);
        for row in start..(start + chunk_size).min(rows) {
            source.read_tuple(row, &mut tuple);
            if engine.is_usable(&tuple) {
                acc.add(&tuple);
            }
        }
        acc
    };

    let acc = if parallel {
        (0..rows)
            .into_par_iter()
            .step_by(chunk_size)
            .map(fold_chunk)
            .reduce(|| RangeAccumulator::new(arity), RangeAccumulator::merge)
    } else {
        (0..rows)
            .step_by(chunk_size)
            .map(fold_chunk)
            .fold(RangeAccumulator::new(arity), RangeAccumulator::merge)
    };
    acc.finish()
}
