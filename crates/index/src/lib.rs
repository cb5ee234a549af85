//! # xmatch index
//!
//! Turns one or more tables into a [`BinIndex`]: a multi-map from engine
//! [`BinKey`](engine::BinKey)s to the rows that fall in each bin. The index
//! is the candidate generator of the matcher; instead of comparing every
//! pair of rows, a row is only compared with the rows it shares a bin with.
//!
//! ## Building
//!
//! Rows are cut into chunks of [`IndexConfig::chunk_size`]. With
//! `parallel = true` every chunk is binned on the rayon pool into its own
//! partial map and partial maps are merged pairwise. Each bin's row list is
//! then sorted and deduplicated, so the finished index does not depend on
//! how the work was scheduled.
//!
//! ```
//! use std::ops::ControlFlow;
//! use engine::CartesianEngine;
//! use index::{BinIndex, BinInput, CandidateFilter, IndexConfig, RowRef, VecTable};
//!
//! let engine = CartesianEngine::new(2, 1.0).unwrap();
//! let table = VecTable::from(vec![[0.0, 0.0], [0.5, 0.0], [5.0, 5.0]]);
//! let inputs = [BinInput::new(0, &table)];
//! let index = BinIndex::build(&engine, &inputs, &IndexConfig::default(), &|_, _| {
//!     ControlFlow::Continue(())
//! })
//! .unwrap()
//! .unwrap();
//!
//! let mut out = Vec::new();
//! let first = RowRef::new(0, 0);
//! let keys = engine::MatchEngine::bins(&engine, &[0.0, 0.0]).unwrap();
//! index.candidates(&keys, CandidateFilter::After(first), &mut out);
//! assert_eq!(out, vec![RowRef::new(0, 1)]);
//! ```

mod bins;
mod query;
mod source;

use std::fmt;

use engine::{BinError, EngineError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::bins::{Admission, BinIndex, BinInput, BinningStats};
pub use crate::query::CandidateFilter;
pub use crate::source::{tuple_range, ColumnTable, TupleSource, VecTable};

/// Identity of one row among all input tables.
///
/// Ordered by table, then row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowRef {
    pub table: usize,
    pub row: usize,
}

impl RowRef {
    pub const fn new(table: usize, row: usize) -> Self {
        Self { table, row }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.row)
    }
}

/// Tuning knobs for building an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Rows per unit of parallel work.
    pub chunk_size: usize,
    /// Bin chunks on the rayon pool instead of the calling thread.
    pub parallel: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            parallel: true,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.chunk_size == 0 {
            return Err(IndexError::InvalidConfig(
                "chunk_size must be >= 1 (got 0)".into(),
            ));
        }
        Ok(())
    }
}

/// Errors raised while building or querying an index.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum IndexError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A single row needs more bins than the engine allows.
    #[error("row {row} of table {table} covers {cells} bins (limit {limit}); match scale too fine for the data")]
    TooManyBins {
        table: usize,
        row: usize,
        cells: u128,
        limit: usize,
    },

    /// The engine refused to bin a row it had declared usable.
    #[error("row {row} of table {table} could not be binned: {source}")]
    Bin {
        table: usize,
        row: usize,
        #[source]
        source: BinError,
    },

    #[error("invalid table: {0}")]
    InvalidTable(String),

    #[error("invalid index config: {0}")]
    InvalidConfig(String),
}

impl IndexError {
    /// Attach the row identity to an engine binning failure.
    pub fn from_bin(table: usize, row: usize, err: BinError) -> Self {
        match err {
            BinError::TooManyBins { cells, limit } => IndexError::TooManyBins {
                table,
                row,
                cells,
                limit,
            },
            source => IndexError::Bin { table, row, source },
        }
    }

    /// Whether the error means the run needs more resources than allowed,
    /// as opposed to bad input.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, IndexError::TooManyBins { .. })
    }
}
