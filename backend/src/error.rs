//! Error types for the flowmetrics pipeline.
//!
//! - [`CsvError`] - extract reading and decoding errors
//! - [`SpreadsheetError`] - workbook reading errors
//! - [`SchemaError`] - canonical field resolution errors
//! - [`ConfigError`] - configuration loading errors
//! - [`PipelineError`] - top-level step errors
//!
//! Recoverable conditions are not errors: they are reported as
//! [`UnmappedIdentifierWarning`] values and logged.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Extract Reading Errors
// =============================================================================

/// Errors while reading a CSV extract.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content could not be decoded.
    #[error("Failed to decode content as {0}")]
    Encoding(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Empty file (or only comment lines).
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

/// Errors while reading a spreadsheet extract.
#[derive(Debug, Error)]
pub enum SpreadsheetError {
    /// Workbook could not be opened.
    #[error("Failed to open workbook '{path}': {message}")]
    Open { path: PathBuf, message: String },

    /// Named sheet is missing or unreadable.
    #[error("Failed to read sheet '{sheet}': {message}")]
    Sheet { sheet: String, message: String },

    /// Header row offset is past the end of the sheet.
    #[error("Sheet '{sheet}' has {rows} rows, header row {header_row} is out of range")]
    HeaderOutOfRange {
        sheet: String,
        rows: usize,
        header_row: usize,
    },
}

// =============================================================================
// Schema Resolution Errors
// =============================================================================

/// A mandatory canonical field could not be resolved to a source column.
#[derive(Debug, Clone, Error)]
#[error("No column found for mandatory field '{field}' (tried: {})", .tried.join(", "))]
pub struct SchemaError {
    /// Canonical field name.
    pub field: String,
    /// Aliases that were tried, in order.
    pub tried: Vec<String>,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for the config type.
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },

    /// A tunable is out of its valid range.
    #[error("Invalid setting '{field}': {message}")]
    Invalid { field: String, message: String },
}

// =============================================================================
// Warnings
// =============================================================================

/// National codes that had no canonical mapping and were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedIdentifierWarning {
    /// Dataset the rows came from.
    pub dataset: String,
    /// Dropped codes, sorted and deduplicated.
    pub codes: Vec<String>,
}

impl std::fmt::Display for UnmappedIdentifierWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: missing ISO3 mapping for codes [{}]",
            self.dataset,
            self.codes.join(", ")
        )
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level step errors. Every variant aborts the current step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV reading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Spreadsheet reading error.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] SpreadsheetError),

    /// Mandatory field could not be resolved.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A mandatory filter produced no rows.
    #[error("No rows left after filter {filter}")]
    EmptyResult { filter: String },

    /// A prior step's output is missing.
    #[error("Missing upstream table '{table}' (looked for: {})", display_paths(.looked_for))]
    MissingUpstreamTable {
        table: String,
        looked_for: Vec<PathBuf>,
    },

    /// An output record broke its schema or a table invariant.
    #[error("Invalid output for table '{table}': {}", .errors.join("; "))]
    InvalidOutput { table: String, errors: Vec<String> },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        PipelineError::Csv(CsvError::Parse {
            line,
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for extract reading.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline steps.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let schema_err = SchemaError {
            field: "geo".into(),
            tried: vec!["geo".into(), "GEO".into()],
        };
        let pipeline_err: PipelineError = schema_err.into();
        assert!(pipeline_err.to_string().contains("'geo'"));
    }

    #[test]
    fn test_missing_upstream_lists_paths() {
        let err = PipelineError::MissingUpstreamTable {
            table: "flows".into(),
            looked_for: vec![PathBuf::from("data/a.csv"), PathBuf::from("data/a.json")],
        };
        let msg = err.to_string();
        assert!(msg.contains("flows"));
        assert!(msg.contains("data/a.csv, data/a.json"));
    }

    #[test]
    fn test_unmapped_warning_format() {
        let warning = UnmappedIdentifierWarning {
            dataset: "flows".into(),
            codes: vec!["EU27_2020".into(), "XK".into()],
        };
        assert_eq!(
            warning.to_string(),
            "flows: missing ISO3 mapping for codes [EU27_2020, XK]"
        );
    }
}
