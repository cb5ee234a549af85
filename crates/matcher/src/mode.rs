//! Match modes: which of the raw matches to keep.
//!
//! Modes run after link building and never influence candidate search.

use std::fmt;
use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use index::RowRef;
use serde::{Deserialize, Serialize};

use crate::links::LinkBuilder;
use crate::types::{sort_pairs, LinkSet, MatchError, RowLink, ScoredPair};

/// Selection applied to the pairs of a two-table match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairMode {
    /// Every accepted pair.
    All,
    /// A one-to-one subset, chosen greedily from the best score upwards.
    #[default]
    Best,
    /// The best pair for each row of the first table.
    Best1,
    /// The best pair for each row of the second table.
    Best2,
}

impl fmt::Display for PairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PairMode::All => "all",
            PairMode::Best => "best",
            PairMode::Best1 => "best1",
            PairMode::Best2 => "best2",
        })
    }
}

impl FromStr for PairMode {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PairMode::All),
            "best" => Ok(PairMode::Best),
            "best1" => Ok(PairMode::Best1),
            "best2" => Ok(PairMode::Best2),
            _ => Err(MatchError::UnknownMode(s.to_string())),
        }
    }
}

/// Selection applied to the links of a multi-table match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    #[default]
    All,
    /// Only links with exactly one row from every input table.
    OneAndOne,
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupMode::All => "all",
            GroupMode::OneAndOne => "one_and_one",
        })
    }
}

impl FromStr for GroupMode {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(GroupMode::All),
            "one_and_one" | "1and1" | "one-and-one" => Ok(GroupMode::OneAndOne),
            _ => Err(MatchError::UnknownMode(s.to_string())),
        }
    }
}

/// What an internal (single-table) match returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalMode {
    /// Groups of two or more rows.
    #[default]
    Groups,
    /// Groups, plus a one-row link for every usable row outside any group.
    Identify,
    /// Only the usable rows outside any group, one link each.
    DropGrouped,
    /// One link per row: the first row of every group and every usable row
    /// outside a group.
    KeepFirst,
}

impl InternalMode {
    /// Whether links of two or more rows survive this mode.
    pub fn keeps_groups(self) -> bool {
        matches!(self, InternalMode::Groups | InternalMode::Identify)
    }
}

impl fmt::Display for InternalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InternalMode::Groups => "groups",
            InternalMode::Identify => "identify",
            InternalMode::DropGrouped => "drop_grouped",
            InternalMode::KeepFirst => "keep_first",
        })
    }
}

impl FromStr for InternalMode {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groups" => Ok(InternalMode::Groups),
            "identify" => Ok(InternalMode::Identify),
            "drop_grouped" | "eliminate0" => Ok(InternalMode::DropGrouped),
            "keep_first" | "eliminate1" => Ok(InternalMode::KeepFirst),
            _ => Err(MatchError::UnknownMode(s.to_string())),
        }
    }
}

/// Filter the pairs of a match between `first_table` and one other table.
///
/// The result is sorted by `(a, b)`. Score ties are broken by row order, so
/// the output depends only on the input set.
pub fn apply_pair_mode(mut pairs: Vec<ScoredPair>, mode: PairMode, first_table: usize) -> Vec<ScoredPair> {
    let mut kept = match mode {
        PairMode::All => pairs,
        PairMode::Best => {
            pairs.sort_by(ScoredPair::cmp_by_score);
            let mut used: HashSet<RowRef> = HashSet::with_capacity(pairs.len() * 2);
            pairs
                .into_iter()
                .filter(|p| {
                    if used.contains(&p.a) || used.contains(&p.b) {
                        return false;
                    }
                    used.insert(p.a);
                    used.insert(p.b);
                    true
                })
                .collect()
        }
        PairMode::Best1 => best_per_row(pairs, |p| p.member_in(first_table)),
        PairMode::Best2 => best_per_row(pairs, |p| {
            if p.a.table != first_table {
                Some(p.a)
            } else if p.b.table != first_table {
                Some(p.b)
            } else {
                None
            }
        }),
    };
    sort_pairs(&mut kept);
    kept
}

fn best_per_row<F>(pairs: Vec<ScoredPair>, key: F) -> Vec<ScoredPair>
where
    F: Fn(&ScoredPair) -> Option<RowRef>,
{
    let mut best: HashMap<RowRef, ScoredPair> = HashMap::new();
    for p in pairs {
        let Some(k) = key(&p) else { continue };
        best.entry(k)
            .and_modify(|cur| {
                if p.cmp_by_score(cur).is_lt() {
                    *cur = p;
                }
            })
            .or_insert(p);
    }
    best.into_values().collect()
}

/// Filter the links of a match over `tables`.
pub fn apply_group_mode(links: LinkSet, tables: &[usize], mode: GroupMode) -> LinkSet {
    match mode {
        GroupMode::All => links,
        GroupMode::OneAndOne => LinkSet::new(
            links
                .into_links()
                .into_iter()
                .filter(|l| l.len() == tables.len() && tables.iter().all(|&t| l.count_in(t) == 1))
                .collect(),
        ),
    }
}

/// Reshape the links of an internal match. `singles` are the usable rows
/// that ended up in no link.
pub fn apply_internal_mode(links: LinkSet, singles: &[RowRef], mode: InternalMode) -> LinkSet {
    let lone = singles.iter().map(|&r| RowLink::single(r));
    match mode {
        InternalMode::Groups => links,
        InternalMode::Identify => {
            let mut all = links.into_links();
            all.extend(lone);
            LinkSet::new(all)
        }
        InternalMode::DropGrouped => LinkSet::new(lone.collect()),
        InternalMode::KeepFirst => LinkSet::new(
            links
                .iter()
                .filter_map(RowLink::first)
                .map(RowLink::single)
                .chain(lone)
                .collect(),
        ),
    }
}

/// Group kept pairs into links. Pairs sharing a row end up in one link, so
/// the result is a partition even when a mode keeps several pairs per row.
pub fn pairs_to_links(pairs: &[ScoredPair]) -> LinkSet {
    let mut builder = LinkBuilder::with_capacity(pairs.len() * 2);
    builder.extend(pairs);
    builder.finish()
}
