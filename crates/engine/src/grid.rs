//! Grid-cell arithmetic shared by the concrete engines.
//!
//! Space is cut into axis-aligned cubic cells of a fixed size. A tuple is
//! binned into every cell touched by the box `coords ± radius`; two tuples
//! whose boxes intersect are then guaranteed to share at least one cell.
//! Cell coordinates are folded into a single [`BinKey`] with xxh3, so keys
//! are cheap to store and compare regardless of dimensionality.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::error::BinError;

/// Upper bound on the number of cells a single tuple may occupy.
pub const MAX_BINS_PER_TUPLE: usize = 65_536;

/// Seed for bin key hashing. Changing it changes every key but not results.
const BIN_KEY_SEED: u64 = 0x786d_6174_6368_0001;

/// Relative widening applied to radii so values sitting exactly on a cell
/// boundary are binned on both sides despite rounding.
const RADIUS_SLACK: f64 = 1.0 + 1e-9;

/// Opaque key of one grid cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BinKey(pub u64);

/// Index of the cell containing `x` along one axis.
///
/// Values far outside the `i64` range saturate, which can only merge
/// distant cells and never separates neighbours.
#[inline]
pub fn cell_index(x: f64, cell_size: f64) -> i64 {
    (x / cell_size).floor() as i64
}

/// Hash a full cell coordinate into a key.
pub fn cell_key(cell: &[i64]) -> BinKey {
    let mut buf = Vec::with_capacity(cell.len() * 8);
    for c in cell {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    BinKey(xxh3_64_with_seed(&buf, BIN_KEY_SEED))
}

/// Keys of every cell intersecting the box `coords ± radius`.
///
/// The returned keys are sorted and distinct. Non-finite input yields
/// [`BinError::NonFinite`]; a box spanning more than
/// [`MAX_BINS_PER_TUPLE`] cells yields [`BinError::TooManyBins`].
pub fn radius_bins(coords: &[f64], radius: f64, cell_size: f64) -> Result<Vec<BinKey>, BinError> {
    if !radius.is_finite() || radius < 0.0 || !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(BinError::NonFinite);
    }
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(BinError::NonFinite);
    }
    let r = radius * RADIUS_SLACK;

    let mut lo = Vec::with_capacity(coords.len());
    let mut hi = Vec::with_capacity(coords.len());
    let mut cells: u128 = 1;
    for &x in coords {
        let a = cell_index(x - r, cell_size);
        let b = cell_index(x + r, cell_size);
        let span = (b as i128 - a as i128 + 1) as u128;
        cells = cells.saturating_mul(span);
        if cells > MAX_BINS_PER_TUPLE as u128 {
            return Err(BinError::TooManyBins {
                cells,
                limit: MAX_BINS_PER_TUPLE,
            });
        }
        lo.push(a);
        hi.push(b);
    }

    let mut keys = Vec::with_capacity(cells as usize);
    let mut cursor = lo.clone();
    loop {
        keys.push(cell_key(&cursor));
        // odometer step
        let mut axis = 0;
        loop {
            if axis == cursor.len() {
                keys.sort_unstable();
                keys.dedup();
                return Ok(keys);
            }
            if cursor[axis] < hi[axis] {
                cursor[axis] += 1;
                break;
            }
            cursor[axis] = lo[axis];
            axis += 1;
        }
    }
}
