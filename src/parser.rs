// 📥 Stream export parser
// Reads long-format CSV exports (one row per artist/region/day) into
// StreamRows ready for insert_streams.

use crate::db::{insert_streams, InsertSummary, StreamRow};
use crate::period::parse_reference_date;
use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One CSV record as exported. Header names must match one of the
/// aliases below exactly; matching is case-sensitive.
#[derive(Debug, Deserialize)]
struct ExportRecord {
    #[serde(alias = "Artist", alias = "artist_name")]
    artist: String,
    #[serde(alias = "Region", alias = "Country", alias = "country")]
    region: String,
    #[serde(alias = "Date")]
    date: String,
    #[serde(alias = "Count", alias = "streams", alias = "Streams")]
    count: String,
}

impl ExportRecord {
    fn into_row(self, line: u64) -> Result<StreamRow> {
        let artist = self.artist.trim().to_string();
        let region = self.region.trim().to_string();
        if artist.is_empty() || region.is_empty() {
            bail!("line {}: artist and region must not be empty", line);
        }

        let date = parse_reference_date(&self.date)
            .with_context(|| format!("line {}: bad date", line))?;

        // Exports write thousands separators ("1,234")
        let cleaned: String = self.count.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
        let count: i64 = cleaned
            .parse()
            .with_context(|| format!("line {}: count '{}' is not an integer", line, self.count))?;
        if count < 0 {
            bail!("line {}: count {} is negative", line, count);
        }

        Ok(StreamRow {
            artist,
            region,
            date,
            count,
        })
    }
}

/// Parse stream rows from any reader holding a headed CSV
pub fn read_stream_rows<R: Read>(reader: R) -> Result<Vec<StreamRow>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize::<ExportRecord>() {
        let record = result.context("Failed to deserialize stream row")?;
        let line = rows.len() as u64 + 2; // header is line 1
        rows.push(record.into_row(line)?);
    }

    Ok(rows)
}

pub fn load_stream_csv(csv_path: &Path) -> Result<Vec<StreamRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_stream_rows(file).with_context(|| format!("Failed to parse {}", csv_path.display()))
}

/// Load one CSV export into the store
pub fn import_csv(conn: &Connection, csv_path: &Path) -> Result<InsertSummary> {
    let rows = load_stream_csv(csv_path)?;
    tracing::info!(file = %csv_path.display(), rows = rows.len(), "parsed stream export");

    let summary = insert_streams(conn, &rows)?;
    tracing::info!(
        file = %csv_path.display(),
        inserted = summary.inserted,
        ignored = summary.ignored,
        "imported stream export"
    );

    Ok(summary)
}
