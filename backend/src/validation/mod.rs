//! Output table validation.
//!
//! Two layers run before anything is written:
//!
//! - every record is checked against the JSON Schema (Draft 7) of its table
//! - the table as a whole must have unique, non-empty country ids and no
//!   negative counts
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory, one
//! per [`TableRecord::TABLE`]:
//! - `flow-aggregate.json`, `flow-record.json`
//! - `gdp.json`
//! - `permit-aggregate.json`, `permit-metrics.json`
//! - `country-factors.json`

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};
use crate::models::TableRecord;

/// Errors reported per table before giving up on listing more.
const MAX_REPORTED: usize = 10;

/// Validate a JSON value against a JSON schema.
///
/// # Example
/// ```
/// use serde_json::json;
/// use flowmetrics::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["dest_iso3"],
///     "properties": { "dest_iso3": { "type": "string" } }
/// });
///
/// assert!(validate(&schema, &json!({ "dest_iso3": "AUT" })).is_ok());
/// assert!(validate(&schema, &json!({ "gdp_pc": 1.0 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn embedded_schema(table: &str) -> Option<&'static str> {
    match table {
        "flow_aggregate" => Some(include_str!("../../schemas/flow-aggregate.json")),
        "flow_record" => Some(include_str!("../../schemas/flow-record.json")),
        "gdp" => Some(include_str!("../../schemas/gdp.json")),
        "permit_aggregate" => Some(include_str!("../../schemas/permit-aggregate.json")),
        "permit_metrics" => Some(include_str!("../../schemas/permit-metrics.json")),
        "country_factors" => Some(include_str!("../../schemas/country-factors.json")),
        _ => None,
    }
}

/// Parsed record schema of `table`.
pub fn table_schema(table: &str) -> PipelineResult<Value> {
    let source = embedded_schema(table).ok_or_else(|| PipelineError::InvalidOutput {
        table: table.to_string(),
        errors: vec!["no record schema for this table".to_string()],
    })?;
    Ok(serde_json::from_str(source)?)
}

/// Check every record against its schema, then the table invariants.
pub fn check_table<T>(rows: &[T]) -> PipelineResult<()>
where
    T: TableRecord + Serialize,
{
    let schema = table_schema(T::TABLE)?;
    let mut errors = Vec::new();

    for row in rows {
        let value = serde_json::to_value(row)?;
        if let Err(errs) = validate(&schema, &value) {
            for e in errs {
                errors.push(format!("{}: {}", row.country_id(), e));
            }
        }
    }

    errors.extend(invariant_errors(rows));

    if errors.is_empty() {
        Ok(())
    } else {
        errors.truncate(MAX_REPORTED);
        Err(PipelineError::InvalidOutput {
            table: T::TABLE.to_string(),
            errors,
        })
    }
}

/// Unique non-empty ids and non-negative counts.
pub fn invariant_errors<T: TableRecord>(rows: &[T]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();

    for (i, row) in rows.iter().enumerate() {
        let id = row.country_id();
        if id.trim().is_empty() {
            errors.push(format!("row {}: empty country id", i));
        } else if !seen.insert(id) {
            errors.push(format!("row {}: duplicate country id {}", i, id));
        }

        for (column, value) in row.counts() {
            if value < 0.0 || !value.is_finite() {
                errors.push(format!("{}: {} = {} is not a non-negative count", id, column, value));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CountryFactors, FlowAggregate, GdpRecord, PermitAggregate, PermitMetrics};
    use serde_json::json;

    fn aggregate(id: &str, total: f64) -> FlowAggregate {
        FlowAggregate {
            country_id: id.into(),
            total_refugees: total,
            children: 0.0,
            elderly: 0.0,
            women_adult: 0.0,
            men_adult: 0.0,
            unknown_age: 0.0,
            pct_children: 0.0,
            pct_elderly: 0.0,
            pct_women_adult: 0.0,
            pct_men_adult: 0.0,
            pct_unknown_age: 0.0,
        }
    }

    #[test]
    fn test_all_embedded_schemas_parse() {
        for table in [
            FlowAggregate::TABLE,
            crate::models::FlowRecord::TABLE,
            GdpRecord::TABLE,
            PermitAggregate::TABLE,
            PermitMetrics::TABLE,
            CountryFactors::TABLE,
        ] {
            assert!(table_schema(table).is_ok(), "schema for {}", table);
        }
        assert!(table_schema("unknown").is_err());
    }

    #[test]
    fn test_valid_table() {
        let rows = vec![aggregate("AUT", 10.0), aggregate("BEL", 0.0)];
        assert!(check_table(&rows).is_ok());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let rows = vec![aggregate("AUT", 10.0), aggregate("AUT", 5.0)];
        let err = check_table(&rows).unwrap_err();
        assert!(err.to_string().contains("duplicate country id AUT"));
    }

    #[test]
    fn test_negative_count_rejected() {
        let rows = vec![aggregate("AUT", -1.0)];
        match check_table(&rows).unwrap_err() {
            PipelineError::InvalidOutput { table, errors } => {
                assert_eq!(table, "flow_aggregate");
                assert!(errors.iter().any(|e| e.contains("total_refugees")));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bad_identifier_rejected() {
        let rows = vec![GdpRecord {
            country_id: "at".into(),
            gdp_pc: 45000.0,
            year: 2023,
        }];
        assert!(check_table(&rows).is_err());
    }

    #[test]
    fn test_nullable_factor_columns() {
        let rows = vec![CountryFactors::new("POL", None)];
        assert!(check_table(&rows).is_ok());

        let schema = table_schema(CountryFactors::TABLE).unwrap();
        assert!(validate(&schema, &json!({ "dest_iso3": "POL" })).is_err());
    }
}
