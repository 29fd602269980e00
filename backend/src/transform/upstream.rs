//! Readers for tables written by earlier steps.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::joiner::FlowSummary;
use super::observations::parse_value;
use super::schema::{self, resolve, ResolvedSchema, UPSTREAM_FLOW_FIELDS, UPSTREAM_GDP_FIELDS};
use crate::diagnostics::{log_info, log_warning};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{FlowAggregate, PermitMetrics};
use crate::parser::{parse_csv_file_auto, RawTable};

/// Flows table as seen by the permit and factor steps.
#[derive(Debug, Clone, Default)]
pub struct UpstreamFlows {
    pub summaries: BTreeMap<String, FlowSummary>,
    /// Positions were found, in the chosen table or the JSON fallback
    pub has_positions: bool,
    pub source: PathBuf,
}

/// Read the flows table from `csv`, falling back to `json`.
///
/// When the chosen table has no `lat`/`lon` columns, positions are taken
/// from `json` if that file carries them.
pub fn read_flows(csv: &Path, json: &Path) -> PipelineResult<UpstreamFlows> {
    let (table, source) = if csv.exists() {
        (parse_csv_file_auto(csv)?.table, csv.to_path_buf())
    } else if json.exists() {
        (read_json_records(json)?, json.to_path_buf())
    } else {
        return Err(PipelineError::MissingUpstreamTable {
            table: "flows".to_string(),
            looked_for: vec![csv.to_path_buf(), json.to_path_buf()],
        });
    };
    log_info(format!("Using flows table {}", source.display()));

    let schema = resolve(&table.headers, UPSTREAM_FLOW_FIELDS)?;
    let has_positions = schema.has(schema::LAT) && schema.has(schema::LON);

    let mut flows = UpstreamFlows {
        has_positions,
        source,
        ..UpstreamFlows::default()
    };

    for row in &table.rows {
        let Some(id) = schema.non_empty(row, schema::DEST_ISO3) else {
            continue;
        };
        let id = id.trim().to_string();
        let total = schema.value(row, schema::TOTAL_REFUGEES).and_then(parse_value);
        let position = if has_positions { read_position(&schema, row) } else { None };

        flows.summaries.entry(id).or_insert(FlowSummary {
            total_refugees: total,
            position,
        });
    }

    if !flows.has_positions && flows.source != json && json.exists() {
        flows.has_positions = attach_positions(&mut flows.summaries, json)?;
    }

    Ok(flows)
}

fn attach_positions(summaries: &mut BTreeMap<String, FlowSummary>, json: &Path) -> PipelineResult<bool> {
    let table = read_json_records(json)?;
    let schema = resolve(&table.headers, UPSTREAM_FLOW_FIELDS)?;
    if !(schema.has(schema::LAT) && schema.has(schema::LON)) {
        return Ok(false);
    }
    log_info(format!("Using positions from {}", json.display()));

    for row in &table.rows {
        let Some(id) = schema.non_empty(row, schema::DEST_ISO3) else {
            continue;
        };
        if let Some(summary) = summaries.get_mut(id.trim()) {
            if summary.position.is_none() {
                summary.position = read_position(&schema, row);
            }
        }
    }
    Ok(true)
}

fn read_position(schema: &ResolvedSchema, row: &[String]) -> Option<(f64, f64)> {
    let coord = |field: &str| {
        schema
            .value(row, field)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };
    Some((coord(schema::LAT)?, coord(schema::LON)?))
}

/// Read the GDP table: `dest_iso3 -> gdp_pc`.
pub fn read_gdp(path: &Path) -> PipelineResult<BTreeMap<String, f64>> {
    require(path, "gdp")?;
    let table = parse_csv_file_auto(path)?.table;
    let schema = resolve(&table.headers, UPSTREAM_GDP_FIELDS)?;

    let mut gdp = BTreeMap::new();
    for row in &table.rows {
        let Some(id) = schema.non_empty(row, schema::DEST_ISO3) else {
            continue;
        };
        let value = schema
            .value(row, schema::GDP_PC)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        if let Some(value) = value {
            gdp.entry(id.trim().to_string()).or_insert(value);
        }
    }
    Ok(gdp)
}

/// Read the permit metrics table, keyed by country id.
pub fn read_permit_metrics(path: &Path) -> PipelineResult<BTreeMap<String, PermitMetrics>> {
    require(path, "permit_metrics")?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut metrics = BTreeMap::new();
    for record in reader.deserialize() {
        let row: PermitMetrics = record?;
        metrics.insert(row.country_id.clone(), row);
    }
    Ok(metrics)
}

/// Read the flow aggregate table written by the flows step.
pub fn read_flow_aggregates(path: &Path) -> PipelineResult<Vec<FlowAggregate>> {
    require(path, "flow_aggregate")?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Country ids of the permit aggregate table.
pub fn read_permit_ids(path: &Path) -> PipelineResult<Vec<String>> {
    require(path, "permit_aggregate")?;
    let table = parse_csv_file_auto(path)?.table;
    let schema = resolve(&table.headers, &[schema::FieldSpec::required(schema::DEST_ISO3, &[])])?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| schema.non_empty(row, schema::DEST_ISO3))
        .map(|id| id.trim().to_string())
        .collect())
}

fn require(path: &Path, table: &str) -> PipelineResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingUpstreamTable {
            table: table.to_string(),
            looked_for: vec![path.to_path_buf()],
        })
    }
}

/// Read a JSON array of flat records as a [`RawTable`].
///
/// Columns are the union of record keys in first-seen order; `null` and
/// missing keys read as empty cells.
pub fn read_json_records(path: &Path) -> PipelineResult<RawTable> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let Value::Array(records) = value else {
        log_warning(format!("{} is not a JSON array of records", path.display()));
        return Ok(RawTable::default());
    };

    let mut headers: Vec<String> = Vec::new();
    for record in &records {
        if let Value::Object(map) = record {
            for key in map.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(|record| record.as_object())
        .map(|map| {
            headers
                .iter()
                .map(|h| map.get(h).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(RawTable::new(headers, rows))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
