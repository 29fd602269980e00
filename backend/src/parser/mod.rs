//! Extract reader with encoding and delimiter auto-detection.
//!
//! Turns a raw Eurostat extract into a [`RawTable`]: trimmed header names and
//! rows of text cells. Lines starting with `#` are Eurostat comments and are
//! skipped. No dataset-specific logic here.

pub mod spreadsheet;

use std::path::Path;

use crate::error::{CsvError, CsvResult};

pub use spreadsheet::read_sheet;

/// Marker of comment lines in Eurostat extracts.
pub const COMMENT_MARKER: u8 = b'#';

/// A header row plus text rows, each padded to the header width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub table: RawTable,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            let (text, _, had_errors) = encoding_rs::ISO_8859_15.decode(bytes);
            if had_errors {
                return Err(CsvError::Encoding(encoding.to_string()));
            }
            text.into_owned()
        }
        "windows-1252" | "cp1252" => {
            let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
            if had_errors {
                return Err(CsvError::Encoding(encoding.to_string()));
            }
            text.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the header line.
///
/// Comment and blank lines are not considered. Falls back to `,`.
pub fn detect_delimiter(content: &str) -> char {
    let header_line = content
        .lines()
        .find(|line| !line.trim().is_empty() && !line.starts_with(COMMENT_MARKER as char))
        .unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = header_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// # Example
/// ```
/// use flowmetrics::parser::parse_table;
///
/// let csv = "# extracted 2024-06-01\ngeo,OBS_VALUE\nAT,10\nBE,\n";
/// let table = parse_table(csv, ',').unwrap();
///
/// assert_eq!(table.headers, vec!["geo", "OBS_VALUE"]);
/// assert_eq!(table.rows[1], vec!["BE", ""]);
/// ```
pub fn parse_table(content: &str, delimiter: char) -> CsvResult<RawTable> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .comment(Some(COMMENT_MARKER))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    Ok(RawTable::new(headers, rows))
}

fn parse_error(err: csv::Error) -> CsvError {
    CsvError::Parse {
        line: err.position().map(|p| p.line()).unwrap_or(0),
        message: err.to_string(),
    }
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let table = parse_table(&content, delimiter)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| CsvError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_bytes_auto(&bytes)
}
