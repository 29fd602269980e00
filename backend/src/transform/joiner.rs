//! Cross-dataset joins and derived metrics.
//!
//! Derived ratios are `Option`s: a zero denominator or a missing upstream
//! value leaves them absent instead of zero.

use std::collections::BTreeMap;

use super::window::latest_at_or_before;
use crate::models::{CountryFactors, PermitAggregate, PermitMetrics};

/// What the permit steps need from the flows table, per country.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowSummary {
    /// `None` when the flows table has no usable count
    pub total_refugees: Option<f64>,
    pub position: Option<(f64, f64)>,
}

/// `max(now - prewar, 0)`
pub fn clamp_delta(now: f64, prewar: f64) -> f64 {
    (now - prewar).max(0.0)
}

/// `delta / refugees`, only for a positive delta and positive refugee count.
pub fn per_capita_ratio(delta: f64, total_refugees: Option<f64>) -> Option<f64> {
    match total_refugees {
        Some(refugees) if refugees > 0.0 && delta > 0.0 => Some(delta / refugees),
        _ => None,
    }
}

/// `ratio / (1 + ratio)`, for a present non-negative ratio.
pub fn implied_share(ratio: Option<f64>) -> Option<f64> {
    ratio.filter(|r| *r >= 0.0).map(|r| r / (1.0 + r))
}

/// Current and pre-war permit stock per country.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermitSnapshot {
    pub latest_year: Option<i32>,
    /// Countries reporting in the latest year
    pub now: BTreeMap<String, f64>,
    /// Baseline per country of `now`, 0 when no year at or before the cutoff
    pub prewar: BTreeMap<String, f64>,
    /// Year the baseline was taken from
    pub prewar_years: BTreeMap<String, i32>,
}

/// Split a per-country annual series into the latest-year and pre-war snapshots.
pub fn permit_snapshot(series: &BTreeMap<String, BTreeMap<i32, f64>>, cutoff: i32) -> PermitSnapshot {
    let latest_year = series.values().filter_map(|years| years.keys().next_back()).max().copied();

    let Some(year) = latest_year else {
        return PermitSnapshot::default();
    };

    let now: BTreeMap<String, f64> = series
        .iter()
        .filter_map(|(id, years)| years.get(&year).map(|v| (id.clone(), *v)))
        .collect();

    let baseline = latest_at_or_before(series, cutoff);
    let mut prewar = BTreeMap::new();
    let mut prewar_years = BTreeMap::new();
    for id in now.keys() {
        match baseline.get(id) {
            Some((y, value)) => {
                prewar.insert(id.clone(), *value);
                prewar_years.insert(id.clone(), *y);
            }
            None => {
                prewar.insert(id.clone(), 0.0);
            }
        }
    }

    PermitSnapshot {
        latest_year,
        now,
        prewar,
        prewar_years,
    }
}

/// Permit totals of the latest year, largest first (ties by id).
pub fn permit_aggregates(
    snapshot: &PermitSnapshot,
    flows: &BTreeMap<String, FlowSummary>,
) -> Vec<PermitAggregate> {
    let mut rows: Vec<PermitAggregate> = snapshot
        .now
        .iter()
        .map(|(id, total)| {
            let position = flows.get(id).and_then(|f| f.position);
            PermitAggregate {
                country_id: id.clone(),
                permits_total: *total,
                lat: position.map(|p| p.0),
                lon: position.map(|p| p.1),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.permits_total
            .total_cmp(&a.permits_total)
            .then_with(|| a.country_id.cmp(&b.country_id))
    });
    rows
}

/// Permits left-joined with flows, sorted by id.
pub fn join_permit_metrics(
    snapshot: &PermitSnapshot,
    flows: &BTreeMap<String, FlowSummary>,
) -> Vec<PermitMetrics> {
    snapshot
        .now
        .iter()
        .map(|(id, now)| {
            let prewar = snapshot.prewar.get(id).copied().unwrap_or(0.0);
            let delta = clamp_delta(*now, prewar);
            let flow = flows.get(id);
            let total_refugees = flow.and_then(|f| f.total_refugees);
            let ratio = per_capita_ratio(delta, total_refugees);
            let position = flow.and_then(|f| f.position);

            PermitMetrics {
                country_id: id.clone(),
                permits_prewar: prewar,
                permits_now: *now,
                delta,
                total_refugees,
                per_capita_ratio: ratio,
                implied_share: implied_share(ratio),
                lat: position.map(|p| p.0),
                lon: position.map(|p| p.1),
            }
        })
        .collect()
}

/// One row per flow country, in the given order, with GDP and optionally
/// permit metrics attached.
pub fn build_country_factors(
    flow_countries: &[String],
    gdp: &BTreeMap<String, f64>,
    metrics: Option<&BTreeMap<String, PermitMetrics>>,
) -> Vec<CountryFactors> {
    let mut seen = std::collections::BTreeSet::new();
    flow_countries
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| {
            let factors = CountryFactors::new(id.clone(), gdp.get(id).copied());
            match metrics.and_then(|m| m.get(id)) {
                Some(m) => factors.with_permits(m),
                None => factors,
            }
        })
        .collect()
}
