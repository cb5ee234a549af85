//! # xmatch match engines
//!
//! A match engine decides when two rows describe the same object. This crate
//! defines the [`MatchEngine`] contract used by the index and matcher crates,
//! the tuple and bounding-box model it works over, and the concrete engines:
//!
//! - [`CartesianEngine`]: fixed isotropic radius in N dimensions.
//! - [`ErrorCartesianEngine`]: per-row error radius in N dimensions.
//! - [`SkyEngine`]: great-circle separation on the sphere.
//!
//! ## Binning contract
//!
//! Every engine maps a tuple to a set of [`BinKey`]s. If two tuples can
//! match, their key sets intersect. The matcher relies on this to compare
//! only rows sharing a bin instead of every pair of rows.
//!
//! ```
//! use engine::{CartesianEngine, MatchEngine, NO_MATCH};
//!
//! let engine = CartesianEngine::new(2, 1.0).unwrap();
//! assert_eq!(engine.score(&[0.0, 0.0], &[0.5, 0.0]), 0.5);
//! assert_eq!(engine.score(&[0.0, 0.0], &[5.0, 5.0]), NO_MATCH);
//! ```

mod cartesian;
pub mod config;
mod error;
mod error_cartesian;
pub mod grid;
mod match_engine;
mod range;
mod sky;
pub mod tuple;

pub use crate::cartesian::CartesianEngine;
pub use crate::config::EngineConfig;
pub use crate::error::{BinError, EngineError};
pub use crate::error_cartesian::ErrorCartesianEngine;
pub use crate::grid::{cell_index, radius_bins, BinKey, MAX_BINS_PER_TUPLE};
pub use crate::match_engine::{is_match, normalized_score, MatchEngine, NO_MATCH};
pub use crate::range::{NdRange, RangeAccumulator};
pub use crate::sky::SkyEngine;
pub use crate::tuple::{check_arity, check_width, is_usable, FieldKind, Tuple, TupleField};
