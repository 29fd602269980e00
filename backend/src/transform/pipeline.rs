//! Pipeline steps.
//!
//! Each step has a pure builder (raw table in, typed rows out) and a runner
//! that resolves paths from [`PipelineConfig`], reads its inputs, calls the
//! builder and writes the outputs. Steps communicate only through files.
//!
//! # Example
//!
//! ```rust,ignore
//! use flowmetrics::config::PipelineConfig;
//! use flowmetrics::transform::pipeline::run_all;
//!
//! let config = PipelineConfig::load(None)?;
//! for report in run_all(&config)? {
//!     println!("{}: {} rows", report.step, report.rows);
//! }
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::aggregator::{assemble, mean_by_unit, sum_by_unit_year, BinCounts, Mean};
use super::binner::bin_observations;
use super::identifiers::{IdentifierMap, COUNTRY_CENTROIDS, EUROSTAT_GEO, MAP_COUNTRIES};
use super::joiner::{build_country_factors, join_permit_metrics, permit_aggregates, permit_snapshot};
use super::observations::{extract, ExtractStats};
use super::schema::{self, resolve, FieldSpec, FLOW_FIELDS, GDP_FIELDS, PERMIT_FIELDS};
use super::upstream::{read_flow_aggregates, read_flows, read_gdp, read_permit_ids, read_permit_metrics, UpstreamFlows};
use super::window::{format_month, latest_per_unit_in_window, latest_year};
use crate::config::PipelineConfig;
use crate::diagnostics::{log_info, log_info_indent, log_success, log_warning, preview};
use crate::error::{PipelineError, PipelineResult, UnmappedIdentifierWarning};
use crate::models::{CountryFactors, FlowAggregate, FlowRecord, GdpRecord, Observation, PermitAggregate, PermitMetrics};
use crate::output::{write_csv, write_json, write_raw_csv};
use crate::parser::{parse_csv_file_auto, read_sheet, RawTable};

/// Sheet of the support tracker workbook holding per-country totals.
pub const SUMMARY_SHEET: &str = "Country Summary (€)";

/// 0-based header row of [`SUMMARY_SHEET`].
pub const SUMMARY_HEADER_ROW: usize = 7;

/// Columns kept from [`SUMMARY_SHEET`], in output order.
pub const SUMMARY_COLUMNS: &[&str] = &[
    "Country",
    "EU member",
    "Geographic Europe",
    "Total bilateral allocations",
    "Total bilateral commitments",
    "Total bilateral and EU allocations",
    "Total bilateral and EU allocations.1",
    "Financial allocations",
    "Humanitarian allocations",
    "Military allocations",
    "Financial commitments",
    "Humanitarian commitments",
    "Military commitments",
];

/// Output names of renamed summary columns.
const SUMMARY_RENAMES: &[(&str, &str)] = &[("Total bilateral and EU allocations.1", "Allocations % GDP 2021")];

/// What a step produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    /// Rows of the main output table
    pub rows: usize,
    pub outputs: Vec<PathBuf>,
    /// Recoverable problems, already logged
    pub warnings: Vec<String>,
}

impl StepReport {
    fn new(step: &'static str) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }
}

/// Rows built by a step plus its warnings.
#[derive(Debug, Clone, Default)]
pub struct Built<T> {
    pub rows: Vec<T>,
    pub warnings: Vec<String>,
}

fn warn(warnings: &mut Vec<String>, message: impl Into<String>) {
    let message = message.into();
    log_warning(&message);
    warnings.push(message);
}

fn warn_unmapped(warnings: &mut Vec<String>, warning: Option<UnmappedIdentifierWarning>) {
    if let Some(w) = warning {
        warn(warnings, w.to_string());
    }
}

fn log_extract(stats: &ExtractStats) {
    log_info(format!("Read {} rows, {} usable", stats.rows, stats.kept));
    if stats.unusable_value > 0 {
        log_info_indent(format!("{} rows without a numeric value", stats.unusable_value), 1);
    }
    if stats.missing_geo > 0 {
        log_info_indent(format!("{} rows without a reporting unit", stats.missing_geo), 1);
    }
}

/// Distinct codes of a dimension, for logging.
fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn keep_citizenship(observations: Vec<Observation>, config: &PipelineConfig) -> PipelineResult<Vec<Observation>> {
    let kept: Vec<Observation> = observations
        .into_iter()
        .filter(|obs| {
            obs.citizenship.as_deref().map_or(false, |c| {
                config.target_citizenship.iter().any(|t| t.eq_ignore_ascii_case(c))
            })
        })
        .collect();

    if kept.is_empty() {
        return Err(PipelineError::EmptyResult {
            filter: format!("citizen in [{}]", config.target_citizenship.join(", ")),
        });
    }
    log_info(format!(
        "{} rows with citizenship {}",
        kept.len(),
        config.target_citizenship.join("/")
    ));
    Ok(kept)
}

// =============================================================================
// Flows
// =============================================================================

/// Flow extract -> one [`FlowAggregate`] per destination country.
///
/// Reporting units are re-keyed through `ids` after aggregation.
pub fn build_flows(
    table: &RawTable,
    config: &PipelineConfig,
    ids: &IdentifierMap,
) -> PipelineResult<Built<FlowAggregate>> {
    let mut warnings = Vec::new();

    let resolved = resolve(&table.headers, FLOW_FIELDS)?;
    log_info("Using columns:");
    resolved.log_mapping();

    let (observations, stats) = extract(table, &resolved);
    log_extract(&stats);

    let mut observations = keep_citizenship(observations, config)?;

    if observations.iter().any(|o| o.unit_code == config.flow_unit) {
        observations.retain(|o| o.unit_code == config.flow_unit);
    } else {
        warn(
            &mut warnings,
            format!("no rows with unit {}, keeping all units", config.flow_unit),
        );
    }

    let selection = latest_per_unit_in_window(observations, config.window_months);
    if selection.unparseable > 0 {
        log_info(format!("Dropped {} rows with an unparseable month", selection.unparseable));
    }
    if let (Some(start), Some(latest)) = (selection.window_start, selection.latest) {
        log_info(format!(
            "Window {} .. {} ({} months), {} reporting units",
            format_month(start),
            format_month(latest),
            config.window_months,
            selection.unit_periods.len()
        ));
    }
    let units: Vec<&String> = selection.unit_periods.keys().collect();
    log_info_indent(preview(&units, 40), 1);

    log_info(format!(
        "Age codes in window: {}",
        preview(&distinct(selection.observations.iter().map(|o| o.age_band.as_deref())), 30)
    ));

    let binned = bin_observations(&selection.observations, &config.ages);
    let per_unit = assemble(&binned);

    let (mapped, unmapped) = ids.map_keys("flows", per_unit, |acc: &mut BinCounts, other| acc.merge(&other));
    warn_unmapped(&mut warnings, unmapped);

    let rows: Vec<FlowAggregate> = mapped.iter().map(|(id, counts)| counts.to_aggregate(id.clone())).collect();
    log_success(format!("{} destination countries", rows.len()));

    Ok(Built { rows, warnings })
}

/// Flow aggregates positioned on their country centroid.
pub fn build_flow_records(aggregates: Vec<FlowAggregate>) -> Built<FlowRecord> {
    let mut warnings = Vec::new();
    let mut missing = Vec::new();

    let rows = aggregates
        .into_iter()
        .filter_map(|aggregate| match COUNTRY_CENTROIDS.get(&aggregate.country_id) {
            Some((lat, lon)) => Some(FlowRecord { aggregate, lat, lon }),
            None => {
                missing.push(aggregate.country_id);
                None
            }
        })
        .collect();

    if !missing.is_empty() {
        warn(
            &mut warnings,
            format!("no centroid for [{}], rows dropped", missing.join(", ")),
        );
    }
    Built { rows, warnings }
}

// =============================================================================
// GDP
// =============================================================================

/// GDP extract -> per-capita GDP of the latest year, per country.
pub fn build_gdp(table: &RawTable, config: &PipelineConfig, ids: &IdentifierMap) -> PipelineResult<Built<GdpRecord>> {
    let mut warnings = Vec::new();

    let resolved = resolve(&table.headers, GDP_FIELDS)?;
    log_info("Using columns:");
    resolved.log_mapping();

    let (mut observations, stats) = extract(table, &resolved);
    log_extract(&stats);

    let marker = config.gdp_unit_marker.to_uppercase();
    if observations.iter().any(|o| o.unit_code.to_uppercase().contains(&marker)) {
        observations.retain(|o| o.unit_code.to_uppercase().contains(&marker));
        log_info(format!(
            "Per-capita units: {}",
            preview(&distinct(observations.iter().map(|o| Some(o.unit_code.as_str()))), 10)
        ));
    } else {
        warn(
            &mut warnings,
            format!("no unit containing '{}', using all units as-is", config.gdp_unit_marker),
        );
    }

    let selection = latest_year(observations);
    let Some(year) = selection.year else {
        return Err(PipelineError::EmptyResult {
            filter: "GDP rows with a numeric value and a year".to_string(),
        });
    };
    log_info(format!("Latest year: {} (of {:?})", year, selection.years_present));

    let means = mean_by_unit(&selection.observations);
    let (mapped, unmapped) = ids.map_keys("gdp", means, |acc: &mut Mean, other| acc.merge(&other));
    warn_unmapped(&mut warnings, unmapped);

    let rows: Vec<GdpRecord> = mapped
        .into_iter()
        .filter_map(|(country_id, mean)| {
            mean.value().map(|gdp_pc| GdpRecord {
                country_id,
                gdp_pc,
                year,
            })
        })
        .collect();
    log_success(format!("{} countries with GDP per capita", rows.len()));

    Ok(Built { rows, warnings })
}

// =============================================================================
// Permits
// =============================================================================

/// Both permit tables.
#[derive(Debug, Clone, Default)]
pub struct PermitTables {
    pub aggregates: Vec<PermitAggregate>,
    pub metrics: Vec<PermitMetrics>,
    pub warnings: Vec<String>,
}

/// Permit extract joined with the flows table.
pub fn build_permits(
    table: &RawTable,
    flows: &UpstreamFlows,
    config: &PipelineConfig,
    ids: &IdentifierMap,
) -> PipelineResult<PermitTables> {
    let mut warnings = Vec::new();

    let resolved = resolve(&table.headers, PERMIT_FIELDS)?;
    log_info("Using columns:");
    resolved.log_mapping();

    let (observations, stats) = extract(table, &resolved);
    log_extract(&stats);

    let mut observations = keep_citizenship(observations, config)?;

    if resolved.has(schema::DURATION) {
        let codes = distinct(observations.iter().map(|o| o.duration.as_deref()));
        log_info_indent(format!("duration codes: {}", preview(&codes, 20)), 1);
    }
    if resolved.has(schema::REASON) {
        let codes = distinct(observations.iter().map(|o| o.reason.as_deref()));
        log_info_indent(format!("reason codes: {}", preview(&codes, 20)), 1);
    }
    if resolved.has(schema::SEX) {
        observations.retain(|o| o.sex.as_ref().map_or(true, |s| s.is_total()));
    }
    if resolved.has(schema::AGE) {
        observations.retain(|o| o.age_band.as_deref().map_or(true, |a| a.eq_ignore_ascii_case("TOTAL")));
    }
    log_info(format!("{} rows after sex/age filter", observations.len()));

    let series = sum_by_unit_year(&observations);
    let (series, unmapped) = ids.map_keys("permits", series, |acc: &mut BTreeMap<i32, f64>, other| {
        for (year, value) in other {
            *acc.entry(year).or_insert(0.0) += value;
        }
    });
    warn_unmapped(&mut warnings, unmapped);

    let snapshot = permit_snapshot(&series, config.prewar_cutoff_year);
    match snapshot.latest_year {
        Some(year) => log_info(format!(
            "Latest year: {}, pre-war cutoff: {}",
            year, config.prewar_cutoff_year
        )),
        None => warn(&mut warnings, "no permit rows with a usable year"),
    }
    let without_baseline: Vec<&String> = snapshot
        .now
        .keys()
        .filter(|id| !snapshot.prewar_years.contains_key(*id))
        .collect();
    if !without_baseline.is_empty() {
        log_info(format!(
            "No pre-war year for {}, baseline 0",
            preview(&without_baseline, 20)
        ));
    }

    if !flows.has_positions {
        warn(&mut warnings, "flows table has no lat/lon, positions left empty");
    }

    Ok(PermitTables {
        aggregates: permit_aggregates(&snapshot, &flows.summaries),
        metrics: join_permit_metrics(&snapshot, &flows.summaries),
        warnings,
    })
}

// =============================================================================
// Country summary and coverage
// =============================================================================

/// Keep the fixed summary columns of non-empty country rows.
pub fn build_country_summary(table: &RawTable) -> PipelineResult<RawTable> {
    let specs: Vec<FieldSpec> = SUMMARY_COLUMNS.iter().map(|c| FieldSpec::required(*c, &[])).collect();
    let resolved = resolve(&table.headers, &specs)?;

    let headers = SUMMARY_COLUMNS
        .iter()
        .map(|c| {
            SUMMARY_RENAMES
                .iter()
                .find(|(from, _)| from == c)
                .map_or(*c, |(_, to)| *to)
                .to_string()
        })
        .collect();

    let rows = table
        .rows
        .iter()
        .filter(|row| resolved.non_empty(row, "Country").is_some())
        .map(|row| {
            SUMMARY_COLUMNS
                .iter()
                .map(|c| resolved.value(row, c).unwrap_or_default().to_string())
                .collect()
        })
        .collect();

    Ok(RawTable::new(headers, rows))
}

/// Map countries against permit coverage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub on_map: usize,
    pub with_permits: usize,
    /// On the map, no permit data
    pub missing: Vec<String>,
    /// Permit data, not on the map
    pub extra: Vec<String>,
}

pub fn coverage(permit_ids: &[String]) -> CoverageReport {
    let have: BTreeSet<&str> = permit_ids.iter().map(|s| s.as_str()).collect();
    let target: BTreeSet<&str> = MAP_COUNTRIES.iter().copied().collect();

    CoverageReport {
        on_map: target.len(),
        with_permits: have.len(),
        missing: target.difference(&have).map(|s| s.to_string()).collect(),
        extra: have.difference(&target).map(|s| s.to_string()).collect(),
    }
}

// =============================================================================
// Runners
// =============================================================================

fn read_extract(path: &std::path::Path) -> PipelineResult<RawTable> {
    log_info(format!("Reading {}", path.display()));
    let parsed = parse_csv_file_auto(path)?;
    log_info_indent(
        format!("encoding {}, delimiter '{}'", parsed.encoding, parsed.delimiter.escape_default()),
        1,
    );
    Ok(parsed.table)
}

pub fn run_flows(config: &PipelineConfig) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let table = read_extract(&paths.resolve(&paths.flows_source))?;
    let built = build_flows(&table, config, &EUROSTAT_GEO)?;

    let out = paths.resolve(&paths.flows_csv);
    write_csv(&out, &built.rows)?;

    Ok(StepReport {
        rows: built.rows.len(),
        outputs: vec![out],
        warnings: built.warnings,
        ..StepReport::new("flows")
    })
}

pub fn run_flows_json(config: &PipelineConfig) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let input = paths.resolve(&paths.flows_csv);
    log_info(format!("Reading {}", input.display()));
    let built = build_flow_records(read_flow_aggregates(&input)?);

    let out = paths.resolve(&paths.flows_json);
    write_json(&out, &built.rows)?;

    Ok(StepReport {
        rows: built.rows.len(),
        outputs: vec![out],
        warnings: built.warnings,
        ..StepReport::new("flows-json")
    })
}

pub fn run_gdp(config: &PipelineConfig) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let table = read_extract(&paths.resolve(&paths.gdp_source))?;
    let built = build_gdp(&table, config, &EUROSTAT_GEO)?;

    let out = paths.resolve(&paths.gdp_csv);
    write_csv(&out, &built.rows)?;

    Ok(StepReport {
        rows: built.rows.len(),
        outputs: vec![out],
        warnings: built.warnings,
        ..StepReport::new("gdp")
    })
}

pub fn run_permits(config: &PipelineConfig) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let table = read_extract(&paths.resolve(&paths.permits_source))?;
    let flows = read_flows(&paths.resolve(&paths.flows_csv), &paths.resolve(&paths.flows_json))?;
    let tables = build_permits(&table, &flows, config, &EUROSTAT_GEO)?;

    let outputs = vec![
        paths.resolve(&paths.permits_agg_csv),
        paths.resolve(&paths.permits_agg_json),
        paths.resolve(&paths.permits_metrics_csv),
        paths.resolve(&paths.permits_metrics_json),
    ];
    write_csv(&outputs[0], &tables.aggregates)?;
    write_json(&outputs[1], &tables.aggregates)?;
    write_csv(&outputs[2], &tables.metrics)?;
    write_json(&outputs[3], &tables.metrics)?;

    Ok(StepReport {
        rows: tables.metrics.len(),
        outputs,
        warnings: tables.warnings,
        ..StepReport::new("permits")
    })
}

pub fn run_factors(config: &PipelineConfig, with_permits: bool) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let flows = read_flows(&paths.resolve(&paths.flows_csv), &paths.resolve(&paths.flows_json))?;
    let gdp_path = paths.resolve(&paths.gdp_csv);
    log_info(format!("Reading {}", gdp_path.display()));
    let gdp = read_gdp(&gdp_path)?;

    let metrics = if with_permits {
        let path = paths.resolve(&paths.permits_metrics_csv);
        log_info(format!("Merging permit metrics from {}", path.display()));
        Some(read_permit_metrics(&path)?)
    } else {
        None
    };

    let countries: Vec<String> = flows.summaries.keys().cloned().collect();
    log_info(format!("Host countries from flows: {}", preview(&countries, 40)));
    let rows: Vec<CountryFactors> = build_country_factors(&countries, &gdp, metrics.as_ref());

    let mut report = StepReport::new("factors");
    let without_gdp: Vec<&str> = rows
        .iter()
        .filter(|r| r.gdp_pc.is_none())
        .map(|r| r.country_id.as_str())
        .collect();
    if !without_gdp.is_empty() {
        warn(&mut report.warnings, format!("no GDP for [{}]", without_gdp.join(", ")));
    }

    let out = paths.resolve(&paths.factors_csv);
    write_csv(&out, &rows)?;

    report.rows = rows.len();
    report.outputs.push(out);
    Ok(report)
}

pub fn run_country_summary(config: &PipelineConfig) -> PipelineResult<StepReport> {
    let paths = &config.paths;
    let workbook = paths.resolve(&paths.support_workbook);
    log_info(format!("Reading {} [{}]", workbook.display(), SUMMARY_SHEET));
    let sheet = read_sheet(&workbook, SUMMARY_SHEET, SUMMARY_HEADER_ROW)?;
    let summary = build_country_summary(&sheet)?;

    let out = paths.resolve(&paths.country_summary_csv);
    write_raw_csv(&out, &summary)?;

    Ok(StepReport {
        rows: summary.len(),
        outputs: vec![out],
        ..StepReport::new("country-summary")
    })
}

pub fn run_coverage(config: &PipelineConfig) -> PipelineResult<(StepReport, CoverageReport)> {
    let paths = &config.paths;
    let ids = read_permit_ids(&paths.resolve(&paths.permits_agg_csv))?;
    let report = coverage(&ids);

    log_info(format!("Countries on map: {}", report.on_map));
    log_info(format!("Countries with permit data: {}", report.with_permits));
    log_info(format!("Missing (on map, no permit data): [{}]", report.missing.join(", ")));
    log_info(format!("Extra (permit data, not on map): [{}]", report.extra.join(", ")));

    let step = StepReport {
        rows: report.with_permits,
        ..StepReport::new("coverage")
    };
    Ok((step, report))
}

/// Every step in dependency order.
///
/// The spreadsheet step runs only when the workbook exists.
pub fn run_all(config: &PipelineConfig) -> PipelineResult<Vec<StepReport>> {
    let mut reports = vec![
        run_flows(config)?,
        run_flows_json(config)?,
        run_gdp(config)?,
        run_permits(config)?,
        run_factors(config, true)?,
    ];

    let workbook = config.paths.resolve(&config.paths.support_workbook);
    if workbook.exists() {
        reports.push(run_country_summary(config)?);
    } else {
        log_info(format!("Skipping country-summary, {} not found", workbook.display()));
    }

    reports.push(run_coverage(config)?.0);
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableRecord;
    use crate::transform::joiner::FlowSummary;
    use std::fs;
    use std::path::Path;

    const FLOWS: &str = "\
# Eurostat migr_asytpsm
DATAFLOW,LAST UPDATE,freq,unit,citizen,sex,age,geo,TIME_PERIOD,OBS_VALUE
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,PL,2024-04,900
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,PL,2024-05,950
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,Y_LT18,PL,2024-05,400
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,Y_GE65,PL,2024-05,50
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,F,Y18-64,PL,2024-05,350
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,M,Y18-64,PL,2024-05,150
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,UNK,PL,2024-05,10
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,DE,2024-03,1100
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,Y_LT18,DE,2024-03,300
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,EL,2024-05,20
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,IE,2023-10,70
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,XK,2024-05,5
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,UA,T,TOTAL,AT,2024-05,:
ESTAT:MIGR_ASYTPSM,01/06/24,M,PER,SY,T,TOTAL,AT,2024-05,80
";

    const GDP: &str = "\
DATAFLOW,unit,geo,TIME_PERIOD,OBS_VALUE
ESTAT:SDG_08_10,CLV10_EUR_HAB,PL,2022,14000
ESTAT:SDG_08_10,CLV10_EUR_HAB,PL,2023,15000
ESTAT:SDG_08_10,CLV10_EUR_HAB,DE,2023,36000
ESTAT:SDG_08_10,CLV_PCH_PRE_HAB,DE,2023,
ESTAT:SDG_08_10,CLV10_EUR,DE,2023,999999
";

    const PERMITS: &str = "\
DATAFLOW,unit,citizen,reason,duration,sex,age,geo,TIME_PERIOD,OBS_VALUE
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,PL,2021,200000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,PL,2023,1200000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,F,TOTAL,PL,2023,700000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,DE,2020,100000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,DE,2023,80000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,EL,2023,3000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,IE,2023,9000
ESTAT:MIGR_RESVALID,PER,UA,TOTAL,TOTAL,T,TOTAL,UK,2023,500
";

    fn config_for(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.data_dir = dir.to_path_buf();
        config.flow_unit = "PER".to_string();
        config
    }

    fn table(content: &str) -> RawTable {
        crate::parser::parse_table(content, ',').unwrap()
    }

    fn write_sources(dir: &Path, config: &PipelineConfig) {
        let paths = &config.paths;
        fs::write(paths.resolve(&paths.flows_source), FLOWS).unwrap();
        fs::write(paths.resolve(&paths.gdp_source), GDP).unwrap();
        fs::write(paths.resolve(&paths.permits_source), PERMITS).unwrap();
        assert!(dir.exists());
    }

    #[test]
    fn test_build_flows_window_and_mapping() {
        let built = build_flows(&table(FLOWS), &config_for(Path::new(".")), &EUROSTAT_GEO).unwrap();
        let ids: Vec<&str> = built.rows.iter().map(|r| r.country_id.as_str()).collect();

        // IE is outside the window, XK has no mapping, AT has no numeric value
        assert_eq!(ids, vec!["DEU", "GRC", "POL"]);
        assert!(built.warnings.iter().any(|w| w.contains("XK")));

        let pol = &built.rows[2];
        assert_eq!(pol.total_refugees, 950.0);
        assert_eq!(pol.children, 400.0);
        assert_eq!(pol.women_adult, 350.0);
        assert_eq!(pol.unknown_age, 10.0);
        assert_eq!(pol.children + pol.elderly + pol.women_adult + pol.men_adult, pol.total_refugees);

        // DE keeps its own latest month inside the window
        let deu = &built.rows[0];
        assert_eq!(deu.total_refugees, 1100.0);
        assert_eq!(deu.elderly, 0.0);
    }

    #[test]
    fn test_build_flows_unit_fallback_warns() {
        let mut config = config_for(Path::new("."));
        config.flow_unit = "NR".to_string();
        let built = build_flows(&table(FLOWS), &config, &EUROSTAT_GEO).unwrap();

        assert_eq!(built.rows.len(), 3);
        assert!(built.warnings.iter().any(|w| w.contains("unit NR")));
    }

    #[test]
    fn test_citizenship_filter_empty_is_fatal() {
        let mut config = config_for(Path::new("."));
        config.target_citizenship = vec!["BY".to_string()];
        let err = build_flows(&table(FLOWS), &config, &EUROSTAT_GEO).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult { .. }));
    }

    #[test]
    fn test_build_flows_missing_column() {
        let err = build_flows(
            &table("citizen,sex,geo,TIME_PERIOD,OBS_VALUE,unit\n"),
            &PipelineConfig::default(),
            &EUROSTAT_GEO,
        );
        match err {
            Err(PipelineError::Schema(e)) => assert_eq!(e.field, "age"),
            other => panic!("unexpected result: {:?}", other.map(|b| b.rows.len())),
        }
    }

    #[test]
    fn test_build_gdp_per_capita_latest_year() {
        let built = build_gdp(&table(GDP), &PipelineConfig::default(), &EUROSTAT_GEO).unwrap();

        assert_eq!(built.rows.len(), 2);
        assert_eq!(built.rows[0].country_id, "DEU");
        assert_eq!(built.rows[0].gdp_pc, 36000.0);
        assert_eq!(built.rows[1].gdp_pc, 15000.0);
        assert!(built.rows.iter().all(|r| r.year == 2023));
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_build_gdp_without_marker_keeps_all() {
        let gdp = "unit,geo,TIME_PERIOD,OBS_VALUE\nEUR,AT,2023,1\nEUR,AT,2023,3\n";
        let built = build_gdp(&table(gdp), &PipelineConfig::default(), &EUROSTAT_GEO).unwrap();

        assert_eq!(built.rows[0].gdp_pc, 2.0);
        assert!(built.warnings.iter().any(|w| w.contains("HAB")));
    }

    #[test]
    fn test_build_permits() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            "POL".to_string(),
            FlowSummary {
                total_refugees: Some(950000.0),
                position: Some((51.92, 19.15)),
            },
        );
        let flows = UpstreamFlows {
            summaries,
            has_positions: true,
            ..UpstreamFlows::default()
        };

        let tables = build_permits(&table(PERMITS), &flows, &PipelineConfig::default(), &EUROSTAT_GEO).unwrap();

        let ids: Vec<&str> = tables.aggregates.iter().map(|r| r.country_id.as_str()).collect();
        assert_eq!(ids, vec!["POL", "DEU", "IRL", "GRC", "GBR"]);
        assert_eq!(tables.aggregates[0].permits_total, 1200000.0);
        assert_eq!(tables.aggregates[0].lat, Some(51.92));

        let pol = tables.metrics.iter().find(|m| m.country_id == "POL").unwrap();
        assert_eq!(pol.permits_prewar, 200000.0);
        assert_eq!(pol.delta, 1000000.0);
        assert!((pol.per_capita_ratio.unwrap() - 1000000.0 / 950000.0).abs() < 1e-12);

        let deu = tables.metrics.iter().find(|m| m.country_id == "DEU").unwrap();
        assert_eq!(deu.delta, 0.0);
        assert_eq!(deu.total_refugees, None);
        assert_eq!(deu.implied_share, None);

        let grc = tables.metrics.iter().find(|m| m.country_id == "GRC").unwrap();
        assert_eq!(grc.permits_prewar, 0.0);
    }

    #[test]
    fn test_permits_keep_missing_refugee_count_absent() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            "POL".to_string(),
            FlowSummary {
                total_refugees: None,
                position: None,
            },
        );
        let flows = UpstreamFlows {
            summaries,
            ..UpstreamFlows::default()
        };

        let tables = build_permits(&table(PERMITS), &flows, &PipelineConfig::default(), &EUROSTAT_GEO).unwrap();

        let pol = tables.metrics.iter().find(|m| m.country_id == "POL").unwrap();
        assert_eq!(pol.delta, 1000000.0);
        assert_eq!(pol.total_refugees, None);
        assert_eq!(pol.per_capita_ratio, None);
    }

    #[test]
    fn test_custom_identifier_map() {
        let ids = IdentifierMap::from_pairs(&[("PL", "POL"), ("DE", "POL")]);
        let built = build_gdp(&table(GDP), &PipelineConfig::default(), &ids).unwrap();

        assert_eq!(built.rows.len(), 1);
        assert_eq!(built.rows[0].country_id, "POL");
        // PL 15000 and DE 36000 merge as a mean
        assert_eq!(built.rows[0].gdp_pc, 25500.0);
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_country_summary_columns() {
        let mut headers: Vec<String> = vec!["Country".to_string(), "Notes".to_string()];
        headers.extend(SUMMARY_COLUMNS[1..].iter().map(|c| c.to_string()));
        let mut row = vec!["Austria".to_string(), "n/a".to_string()];
        row.extend((1..SUMMARY_COLUMNS.len()).map(|i| i.to_string()));
        let empty = vec![String::new(); headers.len()];

        let summary = build_country_summary(&RawTable::new(headers, vec![row, empty])).unwrap();

        assert_eq!(summary.headers.len(), SUMMARY_COLUMNS.len());
        assert_eq!(summary.headers[6], "Allocations % GDP 2021");
        assert!(!summary.headers.contains(&"Notes".to_string()));
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.rows[0][0], "Austria");
        assert_eq!(summary.rows[0][6], "6");
    }

    #[test]
    fn test_country_summary_missing_column() {
        let t = RawTable::new(vec!["Country".to_string()], vec![]);
        assert!(matches!(build_country_summary(&t), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_coverage() {
        let ids = vec!["POL".to_string(), "DEU".to_string(), "GBR".to_string()];
        let report = coverage(&ids);

        assert_eq!(report.on_map, MAP_COUNTRIES.len());
        assert_eq!(report.with_permits, 3);
        assert_eq!(report.extra, vec!["GBR".to_string()]);
        assert!(report.missing.contains(&"AUT".to_string()));
        assert!(!report.missing.contains(&"POL".to_string()));
    }

    #[test]
    fn test_permits_without_flows_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        write_sources(dir.path(), &config);

        let err = run_permits(&config).unwrap_err();
        assert!(matches!(err, PipelineError::MissingUpstreamTable { .. }));
    }

    #[test]
    fn test_run_all_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        write_sources(dir.path(), &config);

        let reports = run_all(&config).unwrap();
        let steps: Vec<&str> = reports.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec!["flows", "flows-json", "gdp", "permits", "factors", "coverage"]);

        let paths = &config.paths;
        let factors = fs::read_to_string(paths.resolve(&paths.factors_csv)).unwrap();
        let lines: Vec<&str> = factors.lines().collect();
        assert_eq!(lines[0], CountryFactors::COLUMNS.join(","));
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("POL,15000.0,,,200000.0,1200000.0,1000000.0,950.0,"));

        // positions come from the JSON flows table
        let metrics = read_permit_metrics(&paths.resolve(&paths.permits_metrics_csv)).unwrap();
        assert_eq!(metrics["POL"].lat, Some(51.92));
        assert!(reports[3].warnings.iter().all(|w| !w.contains("lat/lon")));
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        write_sources(dir.path(), &config);

        let first = run_all(&config).unwrap();
        let snapshot: Vec<Vec<u8>> = first
            .iter()
            .flat_map(|r| r.outputs.iter())
            .map(|p| fs::read(p).unwrap())
            .collect();

        let second = run_all(&config).unwrap();
        let again: Vec<Vec<u8>> = second
            .iter()
            .flat_map(|r| r.outputs.iter())
            .map(|p| fs::read(p).unwrap())
            .collect();

        assert!(!snapshot.is_empty());
        assert_eq!(snapshot, again);
    }
}
