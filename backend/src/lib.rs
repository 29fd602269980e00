//! # flowmetrics - Eurostat extracts to per-country feature tables
//!
//! Turns raw Eurostat extracts (temporary protection flows, valid residence
//! permits, GDP per capita) into small tables keyed by ISO3 country code.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │   Extract   │──▶│   Parser    │──▶│      Transform       │──▶│  CSV / JSON │
//! │ (CSV, XLSX) │   │  (auto-enc) │   │ schema → window →    │   │  (checked)  │
//! └─────────────┘   └─────────────┘   │ bins → ISO3 → joins  │   └─────────────┘
//!                                     └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowmetrics::{run_all, PipelineConfig};
//!
//! let config = PipelineConfig::load(None)?;
//! let reports = run_all(&config)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`config`] - Layered configuration
//! - [`diagnostics`] - Step log lines
//! - [`models`] - Observations and output rows
//! - [`parser`] - Extract reading with auto-detection
//! - [`transform`] - Pipeline stages and steps
//! - [`validation`] - Output schema and invariant checks
//! - [`output`] - CSV and JSON writers

// Core modules
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation and output
pub mod output;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AgeVocabulary, DataPaths, PipelineConfig};

pub use error::{
    ConfigError, CsvError, PipelineError, PipelineResult, SchemaError, SpreadsheetError,
    UnmappedIdentifierWarning,
};

pub use models::{
    CountryFactors, FlowAggregate, FlowRecord, GdpRecord, Observation, PermitAggregate,
    PermitMetrics, Sex, TableRecord,
};

pub use parser::{parse_csv_file_auto, parse_table, RawTable};

pub use transform::identifiers::{IdentifierMap, EUROSTAT_GEO};

pub use transform::pipeline::{
    build_flows, build_gdp, build_permits, run_all, run_country_summary, run_coverage,
    run_factors, run_flows, run_flows_json, run_gdp, run_permits, CoverageReport, StepReport,
};

pub use validation::{check_table, validate};
