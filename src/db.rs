use crate::error::{CompareError, CompareResult};
use crate::period::Period;
use crate::snapshot::{compare, Comparison, ComparisonRequest, Region, RegionCount, StreamStore};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// How every row in `streams.date` is written
pub const STORE_DATE_FORMAT: &str = "%m/%d/%Y";

/// The only metric the dashboard reads
pub const DEFAULT_METRIC: &str = "Streaming On-Demand Audio";

/// `streams.date` rewritten as `YYYY-MM-DD` so ranges compare chronologically.
/// MM/DD/YYYY text sorts by month first, which breaks across year boundaries.
/// Splits on the slashes rather than fixed offsets, so unpadded `1/8/2024`
/// rows (accepted by [`parse_store_date`]) land on the same key as `01/08/2024`.
pub(crate) const SORTABLE_DATE_SQL: &str = concat!(
    "printf('%04d-%02d-%02d', ",
    // year: everything after the second slash
    "substr(s.date, instr(s.date, '/') + 1 + instr(substr(s.date, instr(s.date, '/') + 1), '/')), ",
    // month: before the first slash
    "substr(s.date, 1, instr(s.date, '/') - 1), ",
    // day: between the slashes
    "substr(substr(s.date, instr(s.date, '/') + 1), 1, instr(substr(s.date, instr(s.date, '/') + 1), '/') - 1))"
);

pub fn format_store_date(date: NaiveDate) -> String {
    date.format(STORE_DATE_FORMAT).to_string()
}

pub fn parse_store_date(text: &str) -> CompareResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), STORE_DATE_FORMAT)
        .map_err(|_| CompareError::malformed_date(text))
}

/// Range endpoint in the same shape as [`SORTABLE_DATE_SQL`]
fn sortable_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// SCHEMA
// ============================================================================

/// One stream row as ingested: artist, region, date, count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRow {
    pub artist: String,
    pub region: String,
    pub date: NaiveDate,
    pub count: i64,
}

/// Lookup tables keyed by a generated UUID and a unique name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Artist,
    Region,
    Metric,
}

impl Dimension {
    fn table(&self) -> &'static str {
        match self {
            Dimension::Artist => "artists",
            Dimension::Region => "regions",
            Dimension::Metric => "metrics",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            Dimension::Artist => "artist_id",
            Dimension::Region => "region_id",
            Dimension::Metric => "metric_id",
        }
    }
}

/// Prepare a writable store: enforce foreign keys and create the schema.
/// The journal stays in rollback mode so read-only readers need no -shm file.
pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    create_schema(conn)
}

/// Create tables and indexes
pub fn create_schema(conn: &Connection) -> Result<()> {
    for dim in [Dimension::Artist, Dimension::Region, Dimension::Metric] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    {} TEXT PRIMARY KEY,
                    name TEXT UNIQUE NOT NULL
                )",
                dim.table(),
                dim.id_column()
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Streams Table (one row per artist/region/metric/day)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS streams (
            stream_id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL REFERENCES artists(artist_id),
            region_id TEXT NOT NULL REFERENCES regions(region_id),
            metric_id TEXT NOT NULL REFERENCES metrics(metric_id),
            date TEXT NOT NULL,
            count INTEGER NOT NULL,
            UNIQUE(artist_id, region_id, metric_id, date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_streams_region_date ON streams(region_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_streams_artist ON streams(artist_id)",
        [],
    )?;

    Ok(())
}

/// Id for `name` in `dim`, inserting a fresh UUID row when missing
pub fn get_or_create_id(conn: &Connection, dim: Dimension, name: &str) -> Result<String> {
    let select = format!(
        "SELECT {} FROM {} WHERE name = ?1",
        dim.id_column(),
        dim.table()
    );
    if let Some(id) = conn
        .query_row(&select, [name], |row| row.get::<_, String>(0))
        .optional()?
    {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        &format!(
            "INSERT INTO {} ({}, name) VALUES (?1, ?2)",
            dim.table(),
            dim.id_column()
        ),
        params![id, name],
    )
    .with_context(|| format!("Failed to insert {} '{}'", dim.table(), name))?;

    Ok(id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub ignored: usize,
}

/// Insert rows under [`DEFAULT_METRIC`] in one transaction.
/// Rows already present for the same artist/region/day are left alone.
pub fn insert_streams(conn: &Connection, rows: &[StreamRow]) -> Result<InsertSummary> {
    let tx = conn.unchecked_transaction()?;
    let metric_id = get_or_create_id(&tx, Dimension::Metric, DEFAULT_METRIC)?;

    let mut summary = InsertSummary::default();
    for row in rows {
        let artist_id = get_or_create_id(&tx, Dimension::Artist, row.artist.trim())?;
        let region_id = get_or_create_id(&tx, Dimension::Region, row.region.trim())?;

        let changed = tx.execute(
            "INSERT OR IGNORE INTO streams (stream_id, artist_id, region_id, metric_id, date, count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                artist_id,
                region_id,
                metric_id,
                format_store_date(row.date),
                row.count,
            ],
        )?;

        if changed == 0 {
            summary.ignored += 1;
        } else {
            summary.inserted += 1;
        }
    }
    tx.commit()?;

    tracing::debug!(inserted = summary.inserted, ignored = summary.ignored, "inserted stream rows");
    Ok(summary)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM streams", [], |row| row.get(0))?;

    Ok(count)
}

/// (id, name) pairs of a lookup table, ordered by name
pub fn list_names(conn: &Connection, dim: Dimension) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, name FROM {} ORDER BY name",
        dim.id_column(),
        dim.table()
    ))?;

    let names = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names)
}

// ============================================================================
// DATE BOUNDS
// ============================================================================

/// Which dates the store can answer for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBounds {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    /// "September 2024" style labels, newest first
    pub months: Vec<String>,
    /// Newest first
    pub years: Vec<i32>,
}

impl DateBounds {
    pub fn span(&self) -> Period {
        Period::new(self.earliest, self.latest)
    }
}

/// Distinct dates in `streams`, summarised
pub fn date_bounds(conn: &Connection) -> CompareResult<DateBounds> {
    let mut stmt = conn.prepare("SELECT DISTINCT date FROM streams")?;
    let dates = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .map(|text| parse_store_date(text))
        .collect::<CompareResult<BTreeSet<NaiveDate>>>()?;

    let (Some(&earliest), Some(&latest)) = (dates.first(), dates.last()) else {
        return Err(CompareError::EmptyStore);
    };

    let month_keys: BTreeSet<(i32, u32)> = dates.iter().map(|d| (d.year(), d.month())).collect();
    let months = month_keys
        .iter()
        .rev()
        .filter_map(|&(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
        .map(|first| first.format("%B %Y").to_string())
        .collect();

    let year_keys: BTreeSet<i32> = dates.iter().map(|d| d.year()).collect();

    Ok(DateBounds {
        earliest,
        latest,
        months,
        years: year_keys.into_iter().rev().collect(),
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Read-only view of a stream database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open `path` read-only. A missing file is reported, not created.
    pub fn open_read_only(path: &Path) -> CompareResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %path.display(), "opened stream store");
        Ok(SqliteStore { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn date_bounds(&self) -> CompareResult<DateBounds> {
        date_bounds(&self.conn)
    }
}

impl StreamStore for SqliteStore {
    fn sum_by_artist(&self, region: Region, period: &Period) -> CompareResult<RegionCount> {
        let sql = format!(
            "SELECT a.name, CAST(SUM(s.count) AS INTEGER)
             FROM streams s
             JOIN artists a ON s.artist_id = a.artist_id
             JOIN regions r ON s.region_id = r.region_id
             WHERE r.name = ?1 AND {} BETWEEN ?2 AND ?3
             GROUP BY a.name",
            SORTABLE_DATE_SQL
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let counts = stmt
            .query_map(
                params![
                    region.as_str(),
                    sortable_key(period.start()),
                    sortable_key(period.end())
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<Result<RegionCount, _>>()?;

        tracing::debug!(region = %region, period = %period, artists = counts.len(), "summed streams");
        Ok(counts)
    }

    fn date_span(&self) -> CompareResult<Option<Period>> {
        match date_bounds(&self.conn) {
            Ok(bounds) => Ok(Some(bounds.span())),
            Err(CompareError::EmptyStore) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Open the store at `path`, run one comparison and release the connection
pub fn compare_at_path(path: &Path, request: &ComparisonRequest) -> CompareResult<Comparison> {
    let store = SqliteStore::open_read_only(path)?;
    compare(&store, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookback::Lookback;
    use crate::period::GranularityMode;
    use crate::snapshot::build_comparison;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(artist: &str, region: &str, date: NaiveDate, count: i64) -> StreamRow {
        StreamRow {
            artist: artist.to_string(),
            region: region.to_string(),
            date,
            count,
        }
    }

    fn seeded_store(rows: &[StreamRow]) -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_streams(&conn, rows).unwrap();
        SqliteStore::from_connection(conn)
    }

    #[test]
    fn test_insert_twice_is_ignored() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let rows = vec![
            row("Alpha", "US", d(2024, 1, 1), 100),
            row("Alpha", "Global", d(2024, 1, 1), 400),
            row("Bravo", "US", d(2024, 1, 1), 5),
        ];

        let first = insert_streams(&conn, &rows).unwrap();
        let second = insert_streams(&conn, &rows).unwrap();

        assert_eq!(first, InsertSummary { inserted: 3, ignored: 0 });
        assert_eq!(second, InsertSummary { inserted: 0, ignored: 3 });
        assert_eq!(verify_count(&conn).unwrap(), 3);
        assert_eq!(list_names(&conn, Dimension::Artist).unwrap().len(), 2);
        assert_eq!(list_names(&conn, Dimension::Metric).unwrap()[0].1, DEFAULT_METRIC);
    }

    #[test]
    fn test_get_or_create_id_is_stable() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let a = get_or_create_id(&conn, Dimension::Region, "US").unwrap();
        let b = get_or_create_id(&conn, Dimension::Region, "US").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_dates_are_stored_zero_padded() {
        let store = seeded_store(&[row("Alpha", "US", d(2024, 3, 5), 1)]);
        let stored: String = store
            .connection()
            .query_row("SELECT date FROM streams", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "03/05/2024");
        assert_eq!(parse_store_date(&stored).unwrap(), d(2024, 3, 5));
    }

    #[test]
    fn test_sum_by_artist_filters_region_and_range() {
        let store = seeded_store(&[
            row("Alpha", "US", d(2024, 1, 1), 100),
            row("Alpha", "US", d(2024, 1, 2), 50),
            row("Alpha", "US", d(2024, 1, 9), 999),
            row("Alpha", "Canada", d(2024, 1, 1), 7),
            row("Bravo", "Global", d(2024, 1, 1), 3),
        ]);

        let week = Period::new(d(2024, 1, 1), d(2024, 1, 7));
        let us = store.sum_by_artist(Region::Us, &week).unwrap();
        assert_eq!(us.get("Alpha"), Some(&150));
        assert_eq!(us.get("Bravo"), None);

        let global = store.sum_by_artist(Region::Global, &week).unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global.get("Bravo"), Some(&3));
    }

    #[test]
    fn test_range_spanning_new_year() {
        let store = seeded_store(&[
            row("Alpha", "US", d(2023, 12, 30), 10),
            row("Alpha", "US", d(2024, 1, 2), 20),
            row("Alpha", "US", d(2023, 1, 15), 1000),
            row("Alpha", "US", d(2024, 12, 30), 1000),
        ]);

        let straddle = Period::new(d(2023, 12, 28), d(2024, 1, 3));
        let us = store.sum_by_artist(Region::Us, &straddle).unwrap();
        assert_eq!(us.get("Alpha"), Some(&30));
    }

    #[test]
    fn test_zero_row_is_present() {
        let store = seeded_store(&[
            row("Alpha", "US", d(2024, 1, 1), 0),
            row("Bravo", "US", d(2024, 1, 8), 4),
        ]);
        let rows = build_comparison(
            &store,
            &Period::single_day(d(2024, 1, 8)),
            &Period::single_day(d(2024, 1, 1)),
        )
        .unwrap();

        let alpha = &rows[0];
        assert_eq!(alpha.artist, "Alpha");
        assert_eq!(alpha.us_previous, Some(0));
        assert_eq!(alpha.us_current, None);

        let bravo = &rows[1];
        assert_eq!(bravo.us_current, Some(4));
        assert_eq!(bravo.us_previous, None);
        assert_eq!(bravo.us_pct, None);
    }

    #[test]
    fn test_alpha_scenario_against_sqlite() {
        let store = seeded_store(&[
            row("Alpha", "US", d(2024, 1, 1), 100),
            row("Alpha", "US", d(2024, 1, 8), 150),
        ]);
        let request = ComparisonRequest::new(GranularityMode::Daily, Some(d(2024, 1, 8)))
            .with_lookback(Lookback::Explicit(d(2024, 1, 1)));

        let comparison = compare(&store, &request).unwrap();
        let alpha = comparison.row("Alpha").unwrap();
        assert_eq!(alpha.us_current, Some(150));
        assert_eq!(alpha.us_previous, Some(100));
        assert_eq!(alpha.us_pct, Some(50.0));
        assert_eq!(alpha.global_current, None);
        assert_eq!(alpha.global_previous, None);
        assert_eq!(alpha.global_pct, None);

        let again = compare(&store, &request).unwrap();
        assert_eq!(comparison, again);
    }

    #[test]
    fn test_unpadded_stored_dates_are_summed() {
        let store = seeded_store(&[row("Alpha", "US", d(2023, 12, 31), 40)]);
        store
            .connection()
            .execute_batch(
                "INSERT INTO streams (stream_id, artist_id, region_id, metric_id, date, count)
                 SELECT 'unpadded', artist_id, region_id, metric_id, '1/8/2024', 150 FROM streams;",
            )
            .unwrap();

        assert_eq!(store.date_bounds().unwrap().latest, d(2024, 1, 8));

        let request = ComparisonRequest::new(GranularityMode::Daily, None)
            .with_lookback(Lookback::OffsetDays(7));
        let comparison = compare(&store, &request).unwrap();
        let alpha = comparison.row("Alpha").unwrap();
        assert_eq!(alpha.us_current, Some(150));

        let week = Period::new(d(2023, 12, 31), d(2024, 1, 8));
        assert_eq!(store.sum_by_artist(Region::Us, &week).unwrap().get("Alpha"), Some(&190));
    }

    #[test]
    fn test_date_bounds() {
        let store = seeded_store(&[
            row("Alpha", "US", d(2023, 11, 30), 1),
            row("Alpha", "US", d(2024, 2, 1), 1),
            row("Alpha", "Global", d(2024, 2, 15), 1),
        ]);

        let bounds = store.date_bounds().unwrap();
        assert_eq!(bounds.earliest, d(2023, 11, 30));
        assert_eq!(bounds.latest, d(2024, 2, 15));
        assert_eq!(bounds.months, vec!["February 2024", "November 2023"]);
        assert_eq!(bounds.years, vec![2024, 2023]);
    }

    #[test]
    fn test_empty_store() {
        let store = seeded_store(&[]);
        assert!(matches!(store.date_bounds(), Err(CompareError::EmptyStore)));
        assert_eq!(store.date_span().unwrap(), None);
        assert!(store.sum_by_artist(Region::Us, &Period::single_day(d(2024, 1, 1))).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_stored_date_is_reported() {
        let store = seeded_store(&[row("Alpha", "US", d(2024, 1, 1), 1)]);
        store
            .connection()
            .execute("UPDATE streams SET date = '2024-01-01'", [])
            .unwrap();
        assert!(matches!(store.date_bounds(), Err(CompareError::MalformedDate { .. })));
    }

    #[test]
    fn test_missing_schema_is_store_unavailable() {
        let store = SqliteStore::from_connection(Connection::open_in_memory().unwrap());
        let result = store.sum_by_artist(Region::Us, &Period::single_day(d(2024, 1, 1)));
        assert!(matches!(result, Err(CompareError::StoreUnavailable(_))));
    }

    #[test]
    fn test_compare_at_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        let request = ComparisonRequest::new(GranularityMode::Daily, Some(d(2024, 1, 1)));

        let result = compare_at_path(&missing, &request);
        assert!(matches!(result, Err(CompareError::StoreUnavailable(_))));
        assert!(!missing.exists());
    }

    #[test]
    fn test_compare_at_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.db");
        {
            let conn = Connection::open(&path).unwrap();
            setup_database(&conn).unwrap();
            insert_streams(
                &conn,
                &[
                    row("Alpha", "Global", d(2024, 2, 10), 40),
                    row("Alpha", "Global", d(2024, 1, 10), 20),
                ],
            )
            .unwrap();
        }

        let request = ComparisonRequest::new(GranularityMode::Monthly, Some(d(2024, 2, 1)));
        let comparison = compare_at_path(&path, &request).unwrap();
        assert_eq!(comparison.caption, "Comparing February 2024 vs January 2024");
        assert_eq!(comparison.row("Alpha").unwrap().global_pct, Some(100.0));
    }
}
