//! Domain models for the flowmetrics pipeline.
//!
//! - [`Observation`] - one statistical record from an extract
//! - [`Sex`] - sex dimension codes
//! - [`FlowAggregate`], [`FlowRecord`] - refugee flow tables
//! - [`GdpRecord`] - GDP per capita table
//! - [`PermitAggregate`], [`PermitMetrics`] - residence permit tables
//! - [`CountryFactors`] - per-country feature table
//!
//! Every output table implements [`TableRecord`], which fixes its column
//! order and exposes what the output checks need.

use serde::{Deserialize, Serialize};

// =============================================================================
// Observations
// =============================================================================

/// Sex dimension of an observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sex {
    Total,
    Female,
    Male,
    Other(String),
}

impl Sex {
    /// Parse a Eurostat sex code.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "T" | "TOTAL" => Sex::Total,
            "F" => Sex::Female,
            "M" => Sex::Male,
            _ => Sex::Other(code.trim().to_string()),
        }
    }

    pub fn is_total(&self) -> bool {
        matches!(self, Sex::Total)
    }
}

/// One record of a statistical extract, after column resolution.
///
/// Only rows with a finite, non-negative value become observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// National code of the reporting (destination) country
    pub reporting_unit: String,
    pub citizenship: Option<String>,
    pub sex: Option<Sex>,
    pub age_band: Option<String>,
    /// Raw period string, e.g. `2024-03` or `2023`
    pub period: String,
    pub value: f64,
    pub unit_code: String,
    pub duration: Option<String>,
    pub reason: Option<String>,
}

impl Observation {
    pub fn new(reporting_unit: impl Into<String>, period: impl Into<String>, value: f64) -> Self {
        Self {
            reporting_unit: reporting_unit.into(),
            citizenship: None,
            sex: None,
            age_band: None,
            period: period.into(),
            value,
            unit_code: String::new(),
            duration: None,
            reason: None,
        }
    }

    pub fn with_sex(mut self, sex: Sex) -> Self {
        self.sex = Some(sex);
        self
    }

    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age_band = Some(age.into());
        self
    }
}

// =============================================================================
// Output tables
// =============================================================================

/// Row type of an output table.
pub trait TableRecord {
    /// Table name, used in diagnostics and to pick the record schema.
    const TABLE: &'static str;

    /// Column order of the CSV rendering.
    const COLUMNS: &'static [&'static str];

    /// Canonical country identifier of the row.
    fn country_id(&self) -> &str;

    /// Count columns that must never be negative.
    fn counts(&self) -> Vec<(&'static str, f64)> {
        Vec::new()
    }
}

/// Refugee flows per destination country, with demographic shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAggregate {
    #[serde(rename = "dest_iso3")]
    pub country_id: String,
    pub total_refugees: f64,
    pub children: f64,
    pub elderly: f64,
    pub women_adult: f64,
    pub men_adult: f64,
    pub unknown_age: f64,
    pub pct_children: f64,
    pub pct_elderly: f64,
    pub pct_women_adult: f64,
    pub pct_men_adult: f64,
    pub pct_unknown_age: f64,
}

impl TableRecord for FlowAggregate {
    const TABLE: &'static str = "flow_aggregate";
    const COLUMNS: &'static [&'static str] = &[
        "dest_iso3",
        "total_refugees",
        "children",
        "elderly",
        "women_adult",
        "men_adult",
        "unknown_age",
        "pct_children",
        "pct_elderly",
        "pct_women_adult",
        "pct_men_adult",
        "pct_unknown_age",
    ];

    fn country_id(&self) -> &str {
        &self.country_id
    }

    fn counts(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total_refugees", self.total_refugees),
            ("children", self.children),
            ("elderly", self.elderly),
            ("women_adult", self.women_adult),
            ("men_adult", self.men_adult),
            ("unknown_age", self.unknown_age),
        ]
    }
}

/// Flow aggregate positioned on the map (JSON records output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(flatten)]
    pub aggregate: FlowAggregate,
    pub lat: f64,
    pub lon: f64,
}

impl TableRecord for FlowRecord {
    const TABLE: &'static str = "flow_record";
    const COLUMNS: &'static [&'static str] = &[
        "dest_iso3",
        "total_refugees",
        "children",
        "elderly",
        "women_adult",
        "men_adult",
        "unknown_age",
        "pct_children",
        "pct_elderly",
        "pct_women_adult",
        "pct_men_adult",
        "pct_unknown_age",
        "lat",
        "lon",
    ];

    fn country_id(&self) -> &str {
        &self.aggregate.country_id
    }

    fn counts(&self) -> Vec<(&'static str, f64)> {
        self.aggregate.counts()
    }
}

/// GDP per capita in the latest year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpRecord {
    #[serde(rename = "dest_iso3")]
    pub country_id: String,
    pub gdp_pc: f64,
    pub year: i32,
}

impl TableRecord for GdpRecord {
    const TABLE: &'static str = "gdp";
    const COLUMNS: &'static [&'static str] = &["dest_iso3", "gdp_pc", "year"];

    fn country_id(&self) -> &str {
        &self.country_id
    }
}

/// Valid residence permits in the latest year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitAggregate {
    #[serde(rename = "dest_iso3")]
    pub country_id: String,
    pub permits_total: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TableRecord for PermitAggregate {
    const TABLE: &'static str = "permit_aggregate";
    const COLUMNS: &'static [&'static str] = &["dest_iso3", "permits_total", "lat", "lon"];

    fn country_id(&self) -> &str {
        &self.country_id
    }

    fn counts(&self) -> Vec<(&'static str, f64)> {
        vec![("permits_total", self.permits_total)]
    }
}

/// Permits joined with refugee flows.
///
/// `per_capita_ratio` and `implied_share` stay `None` when undefined; they
/// are never replaced by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitMetrics {
    #[serde(rename = "dest_iso3")]
    pub country_id: String,
    pub permits_prewar: f64,
    pub permits_now: f64,
    pub delta: f64,
    pub total_refugees: Option<f64>,
    pub per_capita_ratio: Option<f64>,
    pub implied_share: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TableRecord for PermitMetrics {
    const TABLE: &'static str = "permit_metrics";
    const COLUMNS: &'static [&'static str] = &[
        "dest_iso3",
        "permits_prewar",
        "permits_now",
        "delta",
        "total_refugees",
        "per_capita_ratio",
        "implied_share",
        "lat",
        "lon",
    ];

    fn country_id(&self) -> &str {
        &self.country_id
    }

    fn counts(&self) -> Vec<(&'static str, f64)> {
        let mut counts = vec![
            ("permits_prewar", self.permits_prewar),
            ("permits_now", self.permits_now),
            ("delta", self.delta),
        ];
        if let Some(refugees) = self.total_refugees {
            counts.push(("total_refugees", refugees));
        }
        counts
    }
}

/// Per-country feature table consumed by the map.
///
/// `aid_per_refugee` and `unemployment` have no source yet and are always
/// empty. Permit columns are empty until permit metrics are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryFactors {
    #[serde(rename = "dest_iso3")]
    pub country_id: String,
    pub gdp_pc: Option<f64>,
    pub aid_per_refugee: Option<f64>,
    pub unemployment: Option<f64>,
    pub permits_prewar: Option<f64>,
    pub permits_now: Option<f64>,
    pub delta: Option<f64>,
    pub total_refugees: Option<f64>,
    pub per_capita_ratio: Option<f64>,
    pub implied_share: Option<f64>,
}

impl CountryFactors {
    pub fn new(country_id: impl Into<String>, gdp_pc: Option<f64>) -> Self {
        Self {
            country_id: country_id.into(),
            gdp_pc,
            aid_per_refugee: None,
            unemployment: None,
            permits_prewar: None,
            permits_now: None,
            delta: None,
            total_refugees: None,
            per_capita_ratio: None,
            implied_share: None,
        }
    }

    pub fn with_permits(mut self, metrics: &PermitMetrics) -> Self {
        self.permits_prewar = Some(metrics.permits_prewar);
        self.permits_now = Some(metrics.permits_now);
        self.delta = Some(metrics.delta);
        self.total_refugees = metrics.total_refugees;
        self.per_capita_ratio = metrics.per_capita_ratio;
        self.implied_share = metrics.implied_share;
        self
    }
}

impl TableRecord for CountryFactors {
    const TABLE: &'static str = "country_factors";
    const COLUMNS: &'static [&'static str] = &[
        "dest_iso3",
        "gdp_pc",
        "aid_per_refugee",
        "unemployment",
        "permits_prewar",
        "permits_now",
        "delta",
        "total_refugees",
        "per_capita_ratio",
        "implied_share",
    ];

    fn country_id(&self) -> &str {
        &self.country_id
    }

    fn counts(&self) -> Vec<(&'static str, f64)> {
        [
            ("permits_prewar", self.permits_prewar),
            ("permits_now", self.permits_now),
            ("delta", self.delta),
            ("total_refugees", self.total_refugees),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}
