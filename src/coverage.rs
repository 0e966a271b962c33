// 🔍 Coverage check
// Lists every artist/region/day in a range that has no stream row, for the
// two regions the comparison reads.

use crate::db::{format_store_date, list_names, parse_store_date, Dimension};
use crate::period::Period;
use crate::snapshot::Region;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRecord {
    pub artist_name: String,
    pub region: String,
    /// Store format (MM/DD/YYYY)
    pub date: String,
}

/// Every (artist, region, day) in `range` without a row.
///
/// Regions absent from the store are skipped rather than reported day by day.
pub fn find_missing(conn: &Connection, range: &Period) -> Result<Vec<MissingRecord>> {
    let artists = list_names(conn, Dimension::Artist)?;
    let region_names: HashSet<String> = list_names(conn, Dimension::Region)?
        .into_iter()
        .map(|(_, name)| name)
        .collect();

    let mut stmt = conn.prepare(
        "SELECT a.name, r.name, s.date
         FROM streams s
         JOIN artists a ON s.artist_id = a.artist_id
         JOIN regions r ON s.region_id = r.region_id
         WHERE r.name IN ('US', 'Global')",
    )?;
    let mut present: HashSet<(String, String, NaiveDate)> = HashSet::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (artist, region, date) = row?;
        let date = parse_store_date(&date).context("Stored stream date is malformed")?;
        if range.contains(date) {
            present.insert((artist, region, date));
        }
    }

    let mut missing = Vec::new();
    for (_, artist) in &artists {
        for region in Region::ALL {
            if !region_names.contains(region.as_str()) {
                continue;
            }
            for date in range.days() {
                let key = (artist.clone(), region.as_str().to_string(), date);
                if !present.contains(&key) {
                    missing.push(MissingRecord {
                        artist_name: artist.clone(),
                        region: region.as_str().to_string(),
                        date: format_store_date(date),
                    });
                }
            }
        }
    }

    tracing::info!(
        range = %range,
        artists = artists.len(),
        missing = missing.len(),
        "coverage check complete"
    );
    Ok(missing)
}

/// Write the report as CSV with an `artist_name,region,date` header
pub fn write_missing_csv(path: &Path, records: &[MissingRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    if records.is_empty() {
        wtr.write_record(["artist_name", "region", "date"])?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_streams, setup_database, StreamRow};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(artist: &str, region: &str, date: NaiveDate) -> StreamRow {
        StreamRow {
            artist: artist.to_string(),
            region: region.to_string(),
            date,
            count: 1,
        }
    }

    #[test]
    fn test_finds_gaps_per_artist_and_region() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_streams(
            &conn,
            &[
                row("Alpha", "US", d(2024, 1, 1)),
                row("Alpha", "US", d(2024, 1, 2)),
                row("Alpha", "Global", d(2024, 1, 1)),
                row("Bravo", "US", d(2024, 1, 2)),
            ],
        )
        .unwrap();

        let missing = find_missing(&conn, &Period::new(d(2024, 1, 1), d(2024, 1, 2))).unwrap();
        let keys: Vec<(&str, &str, &str)> = missing
            .iter()
            .map(|m| (m.artist_name.as_str(), m.region.as_str(), m.date.as_str()))
            .collect();

        assert_eq!(
            keys,
            vec![
                ("Alpha", "Global", "01/02/2024"),
                ("Bravo", "US", "01/01/2024"),
                ("Bravo", "Global", "01/01/2024"),
                ("Bravo", "Global", "01/02/2024"),
            ]
        );
    }

    #[test]
    fn test_unknown_region_is_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_streams(&conn, &[row("Alpha", "US", d(2024, 1, 1))]).unwrap();

        let missing = find_missing(&conn, &Period::single_day(d(2024, 1, 1))).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let records = vec![MissingRecord {
            artist_name: "Alpha".to_string(),
            region: "US".to_string(),
            date: "01/02/2024".to_string(),
        }];

        write_missing_csv(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "artist_name,region,date\nAlpha,US,01/02/2024\n");

        write_missing_csv(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "artist_name,region,date\n");
    }
}
