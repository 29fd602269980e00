//! Raw rows to [`Observation`]s.

use crate::models::{Observation, Sex};
use crate::parser::RawTable;

use super::schema::{self, ResolvedSchema};

/// Row accounting of one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub rows: usize,
    pub kept: usize,
    /// Rows whose value is blank, a `:` marker, negative or not a number
    pub unusable_value: usize,
    pub missing_geo: usize,
}

/// Parse an observation value; `None` unless finite and non-negative.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Build observations from every usable row of `table`.
pub fn extract(table: &RawTable, schema: &ResolvedSchema) -> (Vec<Observation>, ExtractStats) {
    let mut stats = ExtractStats {
        rows: table.len(),
        ..ExtractStats::default()
    };
    let mut observations = Vec::with_capacity(table.len());

    for row in &table.rows {
        let Some(geo) = schema.non_empty(row, schema::GEO) else {
            stats.missing_geo += 1;
            continue;
        };
        let Some(value) = schema.value(row, schema::VALUE).and_then(parse_value) else {
            stats.unusable_value += 1;
            continue;
        };

        let text = |field: &str| schema.non_empty(row, field).map(|s| s.trim().to_string());

        observations.push(Observation {
            reporting_unit: geo.trim().to_string(),
            citizenship: text(schema::CITIZEN),
            sex: schema.non_empty(row, schema::SEX).map(Sex::from_code),
            age_band: text(schema::AGE),
            period: schema.value(row, schema::TIME).unwrap_or("").trim().to_string(),
            value,
            unit_code: text(schema::UNIT).unwrap_or_default(),
            duration: text(schema::DURATION),
            reason: text(schema::REASON),
        });
    }

    stats.kept = observations.len();
    (observations, stats)
}
