// 📊 Snapshot Aggregator
// Sums streams per artist for US and Global over a current and a previous
// period, then joins the four result sets into one row per artist.

use crate::error::{CompareError, CompareResult};
use crate::lookback::Lookback;
use crate::period::{resolve_pair, GranularityMode, Period, WeekPolicy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// REGION
// ============================================================================

/// The two regions every comparison covers. Other regions in the store are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    Global,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Us, Region::Global];

    /// Name exactly as stored in the `regions` table
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Global => "Global",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artist name → summed count for one region and one period.
/// Artists without rows are absent, never present with zero.
pub type RegionCount = BTreeMap<String, i64>;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Read side of the stream store as seen by the aggregator
pub trait StreamStore {
    /// Sum counts per artist for `region` over the inclusive `period`
    fn sum_by_artist(&self, region: Region, period: &Period) -> CompareResult<RegionCount>;

    /// Earliest and latest dates holding any stream row, if the store knows them
    fn date_span(&self) -> CompareResult<Option<Period>> {
        Ok(None)
    }
}

// ============================================================================
// COMPARISON ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub artist: String,
    pub us_current: Option<i64>,
    pub us_previous: Option<i64>,
    pub us_pct: Option<f64>,
    pub global_current: Option<i64>,
    pub global_previous: Option<i64>,
    pub global_pct: Option<f64>,
}

/// Percentage change from `then` to `now`, rounded to two decimals.
///
/// `None` when either side is missing or the baseline is zero.
pub fn pct_change(now: Option<i64>, then: Option<i64>) -> Option<f64> {
    match (now, then) {
        (Some(now), Some(then)) if then != 0 => {
            let pct = (now - then) as f64 / then as f64 * 100.0;
            Some((pct * 100.0).round() / 100.0)
        }
        _ => None,
    }
}

/// The four lookups a comparison is built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotCounts {
    pub us_current: RegionCount,
    pub us_previous: RegionCount,
    pub global_current: RegionCount,
    pub global_previous: RegionCount,
}

impl SnapshotCounts {
    /// Run all four store reads. The first failure aborts the lot.
    pub fn fetch<S: StreamStore + ?Sized>(
        store: &S,
        current: &Period,
        previous: &Period,
    ) -> CompareResult<Self> {
        Ok(SnapshotCounts {
            us_current: store.sum_by_artist(Region::Us, current)?,
            us_previous: store.sum_by_artist(Region::Us, previous)?,
            global_current: store.sum_by_artist(Region::Global, current)?,
            global_previous: store.sum_by_artist(Region::Global, previous)?,
        })
    }

    /// Every artist present in at least one of the four maps, sorted by name
    pub fn artists(&self) -> BTreeSet<&str> {
        [
            &self.us_current,
            &self.us_previous,
            &self.global_current,
            &self.global_previous,
        ]
        .into_iter()
        .flat_map(|counts| counts.keys().map(String::as_str))
        .collect()
    }
}

/// Outer-join the four maps into one row per artist, sorted by artist name
pub fn merge_counts(counts: &SnapshotCounts) -> Vec<ComparisonRow> {
    counts
        .artists()
        .into_iter()
        .map(|artist| {
            let us_current = counts.us_current.get(artist).copied();
            let us_previous = counts.us_previous.get(artist).copied();
            let global_current = counts.global_current.get(artist).copied();
            let global_previous = counts.global_previous.get(artist).copied();

            ComparisonRow {
                artist: artist.to_string(),
                us_current,
                us_previous,
                us_pct: pct_change(us_current, us_previous),
                global_current,
                global_previous,
                global_pct: pct_change(global_current, global_previous),
            }
        })
        .collect()
}

/// Build the comparison table for two already-resolved periods
pub fn build_comparison<S: StreamStore + ?Sized>(
    store: &S,
    current: &Period,
    previous: &Period,
) -> CompareResult<Vec<ComparisonRow>> {
    let counts = SnapshotCounts::fetch(store, current, previous)?;
    let rows = merge_counts(&counts);

    tracing::debug!(
        current = %current,
        previous = %previous,
        artists = rows.len(),
        "built comparison"
    );

    Ok(rows)
}

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// Everything one comparison needs, passed explicitly
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub mode: GranularityMode,
    /// `None` means the latest date in the store
    pub current: Option<NaiveDate>,
    pub lookback: Lookback,
    pub week_policy: WeekPolicy,
}

impl ComparisonRequest {
    /// Request with the default lookback for `mode`
    pub fn new(mode: GranularityMode, current: Option<NaiveDate>) -> Self {
        ComparisonRequest {
            mode,
            current,
            lookback: Lookback::default_for(mode),
            week_policy: WeekPolicy::default(),
        }
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_week_policy(mut self, week_policy: WeekPolicy) -> Self {
        self.week_policy = week_policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub mode: GranularityMode,
    pub week_policy: WeekPolicy,
    pub current_period: Period,
    pub previous_period: Period,
    pub caption: String,
    pub rows: Vec<ComparisonRow>,
}

impl Comparison {
    pub fn row(&self, artist: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| row.artist == artist)
    }
}

/// Resolve both periods for `request` and build the table
pub fn compare<S: StreamStore + ?Sized>(
    store: &S,
    request: &ComparisonRequest,
) -> CompareResult<Comparison> {
    let needs_span = request.current.is_none() || request.lookback == Lookback::Earliest;
    let span = if needs_span {
        Some(store.date_span()?.ok_or(CompareError::EmptyStore)?)
    } else {
        None
    };

    let current = match (request.current, span) {
        (Some(date), _) => date,
        (None, Some(span)) => span.end(),
        (None, None) => return Err(CompareError::EmptyStore),
    };
    let lookback = request
        .lookback
        .resolve(current, request.mode, span.map(|s| s.start()))?;

    let (current_period, previous_period) =
        resolve_pair(current, lookback, request.mode, request.week_policy);

    tracing::info!(
        mode = %request.mode,
        current = %current_period,
        previous = %previous_period,
        "comparing periods"
    );

    let rows = build_comparison(store, &current_period, &previous_period)?;
    let caption = format!(
        "Comparing {} vs {}",
        current_period.caption(request.mode),
        previous_period.caption(request.mode)
    );

    Ok(Comparison {
        mode: request.mode,
        week_policy: request.week_policy,
        current_period,
        previous_period,
        caption,
        rows,
    })
}
