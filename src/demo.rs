// ✂️ Demo store
// Copies a full stream database into a smaller one holding only the most
// recent months, then compacts it.

use crate::db::{create_schema, date_bounds, format_store_date, SORTABLE_DATE_SQL};
use anyhow::{bail, Context, Result};
use chrono::{Months, NaiveDate};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoSummary {
    /// First day kept (inclusive), store format
    pub cutoff: String,
    pub artists: usize,
    pub regions: usize,
    pub metrics: usize,
    pub streams_kept: usize,
    pub streams_dropped: i64,
}

/// Cutoff date: `months` calendar months before the latest row
pub fn demo_cutoff(latest: NaiveDate, months: u32) -> Result<NaiveDate> {
    latest
        .checked_sub_months(Months::new(months))
        .with_context(|| format!("{} months before {} is out of range", months, latest))
}

/// Build `dst` from `src`, keeping stream rows dated within `months` of the
/// latest row. Lookup tables are copied whole. `dst` is replaced if present.
pub fn make_demo(src: &Path, dst: &Path, months: u32) -> Result<DemoSummary> {
    if src == dst {
        bail!("Demo output must differ from the source database");
    }

    let source = Connection::open_with_flags(src, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open source database {}", src.display()))?;
    let bounds = date_bounds(&source).context("Failed to read source date range")?;
    let total: i64 = source.query_row("SELECT COUNT(*) FROM streams", [], |row| row.get(0))?;
    drop(source);

    let cutoff = demo_cutoff(bounds.latest, months)?;
    tracing::info!(latest = %bounds.latest, cutoff = %cutoff, "computed demo cutoff");

    if dst.exists() {
        tracing::warn!(path = %dst.display(), "replacing existing demo database");
        std::fs::remove_file(dst)
            .with_context(|| format!("Failed to remove {}", dst.display()))?;
    }

    let conn = Connection::open(dst)
        .with_context(|| format!("Failed to create demo database {}", dst.display()))?;
    create_schema(&conn)?;

    let src_str = src
        .to_str()
        .with_context(|| format!("Source path {} is not valid UTF-8", src.display()))?;
    conn.execute("ATTACH DATABASE ?1 AS src", [src_str])?;

    let artists = conn.execute("INSERT INTO artists (artist_id, name) SELECT artist_id, name FROM src.artists", [])?;
    let regions = conn.execute("INSERT INTO regions (region_id, name) SELECT region_id, name FROM src.regions", [])?;
    let metrics = conn.execute("INSERT INTO metrics (metric_id, name) SELECT metric_id, name FROM src.metrics", [])?;
    let streams_kept = conn.execute(
        &format!(
            "INSERT INTO streams (stream_id, artist_id, region_id, metric_id, date, count)
             SELECT s.stream_id, s.artist_id, s.region_id, s.metric_id, s.date, s.count
             FROM src.streams s
             WHERE {} >= ?1",
            SORTABLE_DATE_SQL
        ),
        [cutoff.format("%Y-%m-%d").to_string()],
    )?;

    conn.execute("DETACH DATABASE src", [])?;
    conn.execute_batch("VACUUM;")?;

    let summary = DemoSummary {
        cutoff: format_store_date(cutoff),
        artists,
        regions,
        metrics,
        streams_kept,
        streams_dropped: total - streams_kept as i64,
    };
    tracing::info!(
        kept = summary.streams_kept,
        dropped = summary.streams_dropped,
        "demo database created"
    );

    Ok(summary)
}
