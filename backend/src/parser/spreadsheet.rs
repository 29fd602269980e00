//! Workbook sheets as [`RawTable`]s.
//!
//! The header sits at a fixed row offset inside a named sheet (title and
//! notes rows come first). Repeated header names are made unique with `.1`,
//! `.2`, ... suffixes so that every column can be addressed by name.

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::Path;

use super::RawTable;
use crate::error::SpreadsheetError;

/// Read `sheet` from the workbook at `path`, using row `header_row` (0-based) as header.
pub fn read_sheet(path: &Path, sheet: &str, header_row: usize) -> Result<RawTable, SpreadsheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SpreadsheetError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| SpreadsheetError::Sheet {
            sheet: sheet.to_string(),
            message: e.to_string(),
        })?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    table_from_rows(sheet, from_sheet_top(rows, first_row), header_row)
}

/// The used range starts at its first non-empty row; pad it back so that
/// row offsets count from the top of the sheet.
fn from_sheet_top(rows: Vec<Vec<String>>, first_row: usize) -> Vec<Vec<String>> {
    if first_row == 0 || rows.is_empty() {
        return rows;
    }
    let mut padded = vec![Vec::new(); first_row];
    padded.extend(rows);
    padded
}

/// Build a table from already-rendered rows.
pub fn table_from_rows(
    sheet: &str,
    mut rows: Vec<Vec<String>>,
    header_row: usize,
) -> Result<RawTable, SpreadsheetError> {
    if header_row >= rows.len() {
        return Err(SpreadsheetError::HeaderOutOfRange {
            sheet: sheet.to_string(),
            rows: rows.len(),
            header_row,
        });
    }

    let data = rows.split_off(header_row + 1);
    let header = rows.pop().unwrap_or_default();
    let headers = dedupe_headers(header);

    let data = data
        .into_iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    Ok(RawTable::new(headers, data))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// `["a", "b", "a", "a"]` -> `["a", "b", "a.1", "a.2"]`
pub fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            unique
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_dedupe_headers() {
        let headers = row(&["Country", "Total", "Total", "Total"]);
        assert_eq!(
            dedupe_headers(headers),
            row(&["Country", "Total", "Total.1", "Total.2"])
        );
    }

    #[test]
    fn test_header_offset() {
        let rows = vec![
            row(&["Ukraine Support Tracker", ""]),
            row(&["", ""]),
            row(&["Country", "Total"]),
            row(&["Austria", "1.5"]),
            row(&["", ""]),
            row(&["Belgium", "2"]),
        ];

        let table = table_from_rows("Summary", rows, 2).unwrap();
        assert_eq!(table.headers, row(&["Country", "Total"]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][0], "Belgium");
    }

    #[test]
    fn test_blank_leading_rows_count_from_sheet_top() {
        // used range starting at A3
        let rows = vec![row(&["Country"]), row(&["Austria"])];

        let table = table_from_rows("S", from_sheet_top(rows, 2), 2).unwrap();
        assert_eq!(table.headers, row(&["Country"]));
        assert_eq!(table.rows, vec![row(&["Austria"])]);
    }

    #[test]
    fn test_empty_sheet_stays_empty() {
        assert!(from_sheet_top(Vec::new(), 3).is_empty());
        let err = table_from_rows("S", from_sheet_top(Vec::new(), 3), 0).unwrap_err();
        assert!(matches!(err, SpreadsheetError::HeaderOutOfRange { rows: 0, .. }));
    }

    #[test]
    fn test_header_out_of_range() {
        let rows = vec![row(&["a"])];
        let err = table_from_rows("Summary", rows, 7).unwrap_err();
        assert!(matches!(err, SpreadsheetError::HeaderOutOfRange { rows: 1, .. }));
    }

    #[test]
    fn test_missing_workbook() {
        let err = read_sheet(Path::new("/nonexistent/tracker.xlsx"), "Sheet1", 0).unwrap_err();
        assert!(matches!(err, SpreadsheetError::Open { .. }));
    }
}
