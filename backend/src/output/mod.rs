//! Table emitter.
//!
//! CSV files get a header row in the table's fixed column order (written
//! even when the table is empty) and empty cells for absent values. JSON
//! files are pretty-printed arrays of records with `null` for absent
//! values. Existing files are replaced.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::diagnostics::log_success;
use crate::error::PipelineResult;
use crate::models::TableRecord;
use crate::parser::RawTable;
use crate::validation::check_table;

fn ensure_parent(path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Validate `rows` and write them as CSV.
pub fn write_csv<T>(path: &Path, rows: &[T]) -> PipelineResult<()>
where
    T: TableRecord + Serialize,
{
    check_table(rows)?;
    ensure_parent(path)?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    log_success(format!("Wrote {} ({} rows)", path.display(), rows.len()));
    Ok(())
}

/// Validate `rows` and write them as a JSON array of records.
pub fn write_json<T>(path: &Path, rows: &[T]) -> PipelineResult<()>
where
    T: TableRecord + Serialize,
{
    check_table(rows)?;
    ensure_parent(path)?;

    let mut content = serde_json::to_string_pretty(rows)?;
    content.push('\n');
    fs::write(path, content)?;

    log_success(format!("Wrote {} ({} records)", path.display(), rows.len()));
    Ok(())
}

/// Write a text table as CSV, as is.
pub fn write_raw_csv(path: &Path, table: &RawTable) -> PipelineResult<()> {
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    log_success(format!("Wrote {} ({} rows)", path.display(), table.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GdpRecord, PermitMetrics};

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gdp.csv");

        write_csv::<GdpRecord>(&path, &[]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "dest_iso3,gdp_pc,year\n");
    }

    #[test]
    fn test_absent_values_render_empty_and_null() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![PermitMetrics {
            country_id: "DEU".into(),
            permits_prewar: 100.0,
            permits_now: 130.0,
            delta: 30.0,
            total_refugees: Some(0.0),
            per_capita_ratio: None,
            implied_share: None,
            lat: None,
            lon: None,
        }];

        let csv_path = dir.path().join("metrics.csv");
        write_csv(&csv_path, &rows).unwrap();
        let csv_text = fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(
            lines[0],
            "dest_iso3,permits_prewar,permits_now,delta,total_refugees,per_capita_ratio,implied_share,lat,lon"
        );
        assert_eq!(lines[1], "DEU,100.0,130.0,30.0,0.0,,,,");

        let json_path = dir.path().join("metrics.json");
        write_json(&json_path, &rows).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert!(value[0]["per_capita_ratio"].is_null());
        assert_eq!(value[0]["delta"], 30.0);
    }

    #[test]
    fn test_invalid_table_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdp.csv");
        let rows = vec![
            GdpRecord { country_id: "AUT".into(), gdp_pc: 1.0, year: 2023 },
            GdpRecord { country_id: "AUT".into(), gdp_pc: 2.0, year: 2023 },
        ];

        assert!(write_csv(&path, &rows).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_raw_csv_quotes_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let table = RawTable::new(
            vec!["Country".into(), "Total".into()],
            vec![vec!["Korea, South".into(), "1.5".into()]],
        );

        write_raw_csv(&path, &table).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Country,Total\n\"Korea, South\",1.5\n");
    }
}
