//! Client-side filtering and sorting of market lists.
//!
//! Everything here is pure: inputs are borrowed, outputs are new vectors.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::MarketEntry;

/// Numeric field a market list can be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "market_cap_rank")]
    Rank,
    #[serde(rename = "price_change_percentage_24h")]
    PercentChange24h,
    #[serde(rename = "total_volume")]
    Volume24h,
}

impl SortField {
    pub const ALL: [SortField; 3] = [Self::Rank, Self::PercentChange24h, Self::Volume24h];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rank => "market_cap_rank",
            Self::PercentChange24h => "price_change_percentage_24h",
            Self::Volume24h => "total_volume",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rank => "Market Cap Rank",
            Self::PercentChange24h => "24h Change",
            Self::Volume24h => "Volume",
        }
    }

    /// Raw field value; `None` when upstream did not report it.
    pub fn value_of(self, entry: &MarketEntry) -> Option<f64> {
        match self {
            Self::Rank => entry.market_cap_rank.map(f64::from),
            Self::PercentChange24h => entry.price_change_percentage_24h,
            Self::Volume24h => entry.total_volume,
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market_cap_rank" | "rank" => Ok(Self::Rank),
            "price_change_percentage_24h" | "change" | "change_24h" => Ok(Self::PercentChange24h),
            "total_volume" | "volume" | "volume_24h" => Ok(Self::Volume24h),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Sort key with missing or non-finite values coerced to 0.
///
/// The coercion is for ordering only; entries keep their original value.
pub fn sort_key_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Ascending comparison of two entries on `field`.
pub fn compare_by(field: SortField, a: &MarketEntry, b: &MarketEntry) -> Ordering {
    let ka = sort_key_or_zero(field.value_of(a));
    let kb = sort_key_or_zero(field.value_of(b));
    ka.total_cmp(&kb)
}

/// Case-insensitive substring match on name or symbol.
pub fn matches_query(entry: &MarketEntry, needle_lower: &str) -> bool {
    entry.name.to_lowercase().contains(needle_lower)
        || entry.symbol.to_lowercase().contains(needle_lower)
}

/// Entries whose name or symbol contains `query`. An empty query keeps all.
pub fn filter_entries(entries: &[MarketEntry], query: &str) -> Vec<MarketEntry> {
    if query.is_empty() {
        return entries.to_vec();
    }
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|e| matches_query(e, &needle))
        .cloned()
        .collect()
}

/// Stable sort by `spec`; ties keep their input order in both directions.
pub fn sort_entries(entries: &[MarketEntry], spec: SortSpec) -> Vec<MarketEntry> {
    let mut out = entries.to_vec();
    match spec.direction {
        SortDirection::Ascending => out.sort_by(|a, b| compare_by(spec.field, a, b)),
        SortDirection::Descending => out.sort_by(|a, b| compare_by(spec.field, b, a)),
    }
    out
}

/// Filter then sort.
pub fn apply(entries: &[MarketEntry], query: &str, spec: SortSpec) -> Vec<MarketEntry> {
    sort_entries(&filter_entries(entries, query), spec)
}
