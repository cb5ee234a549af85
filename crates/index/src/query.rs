//! Candidate lookup against a built [`BinIndex`].

use engine::BinKey;

use crate::bins::BinIndex;
use crate::RowRef;

/// Which rows sharing a bin count as candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFilter {
    /// Every row.
    Any,
    /// Rows sorting strictly after the given one. Used when a table is
    /// matched against itself, so each unordered pair is proposed once and
    /// a row is never paired with itself.
    After(RowRef),
    /// Rows of one table only.
    InTable(usize),
    /// Rows of any other table sorting after the given one.
    OtherTableAfter(RowRef),
}

impl CandidateFilter {
    #[inline]
    pub fn accepts(&self, r: RowRef) -> bool {
        match *self {
            CandidateFilter::Any => true,
            CandidateFilter::After(me) => r > me,
            CandidateFilter::InTable(t) => r.table == t,
            CandidateFilter::OtherTableAfter(me) => r.table != me.table && r > me,
        }
    }
}

impl BinIndex {
    /// Collect the rows sharing any of `keys` into `out`, filtered, sorted
    /// and without duplicates. `out` is cleared first so a buffer can be
    /// reused across rows.
    pub fn candidates(&self, keys: &[BinKey], filter: CandidateFilter, out: &mut Vec<RowRef>) {
        out.clear();
        for key in keys {
            if let Some(refs) = self.bins.get(key) {
                out.extend(refs.iter().copied().filter(|&r| filter.accepts(r)));
            }
        }
        if keys.len() > 1 {
            out.sort_unstable();
            out.dedup();
        }
    }
}
