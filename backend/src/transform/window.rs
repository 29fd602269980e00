//! Reporting period selection.
//!
//! Three policies:
//!
//! - [`latest_per_unit_in_window`]: monthly series. A trailing window of
//!   `width` months ends at the latest month of any unit; inside it every
//!   unit keeps its own latest month, so slow reporters still contribute.
//! - [`latest_year`]: annual series. Only the globally latest year is kept.
//! - [`latest_at_or_before`]: per unit, the latest year not after a cutoff.
//!
//! Periods that do not parse are dropped and counted, never treated as
//! an early date.

use chrono::{Datelike, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::models::Observation;

static MONTH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month pattern"));
static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})").expect("valid year pattern"));

/// Parse a `YYYY-MM` period into the first day of that month.
pub fn parse_month(period: &str) -> Option<NaiveDate> {
    let caps = MONTH_PATTERN.captures(period.trim())?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Year from the leading four digits of a period (`2023`, `2023-01`, `2023Q4`).
pub fn parse_year(period: &str) -> Option<i32> {
    let caps = YEAR_PATTERN.captures(period.trim())?;
    caps[1].parse().ok()
}

/// Result of the monthly window policy.
#[derive(Debug, Clone, Default)]
pub struct WindowSelection {
    pub observations: Vec<Observation>,
    /// Latest month across all units
    pub latest: Option<NaiveDate>,
    /// First month inside the window
    pub window_start: Option<NaiveDate>,
    /// Month kept for each unit
    pub unit_periods: BTreeMap<String, NaiveDate>,
    pub unparseable: usize,
}

/// Keep, per unit, its latest month inside the trailing `width`-month window.
pub fn latest_per_unit_in_window(observations: Vec<Observation>, width: u32) -> WindowSelection {
    let mut unparseable = 0;
    let dated: Vec<(NaiveDate, Observation)> = observations
        .into_iter()
        .filter_map(|obs| match parse_month(&obs.period) {
            Some(date) => Some((date, obs)),
            None => {
                unparseable += 1;
                None
            }
        })
        .collect();

    let Some(latest) = dated.iter().map(|(date, _)| *date).max() else {
        return WindowSelection {
            unparseable,
            ..WindowSelection::default()
        };
    };

    let back = Months::new(width.saturating_sub(1));
    let window_start = latest.checked_sub_months(back).unwrap_or(NaiveDate::MIN);

    let mut unit_periods: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for (date, obs) in &dated {
        if *date < window_start {
            continue;
        }
        let entry = unit_periods.entry(obs.reporting_unit.clone()).or_insert(*date);
        if *date > *entry {
            *entry = *date;
        }
    }

    let observations = dated
        .into_iter()
        .filter(|(date, obs)| unit_periods.get(&obs.reporting_unit) == Some(date))
        .map(|(_, obs)| obs)
        .collect();

    WindowSelection {
        observations,
        latest: Some(latest),
        window_start: Some(window_start),
        unit_periods,
        unparseable,
    }
}

/// Result of the latest-year policy.
#[derive(Debug, Clone, Default)]
pub struct YearSelection {
    pub observations: Vec<Observation>,
    pub year: Option<i32>,
    /// Distinct years present, ascending
    pub years_present: Vec<i32>,
    pub unparseable: usize,
}

/// Keep only observations of the latest year present.
pub fn latest_year(observations: Vec<Observation>) -> YearSelection {
    let mut unparseable = 0;
    let dated: Vec<(i32, Observation)> = observations
        .into_iter()
        .filter_map(|obs| match parse_year(&obs.period) {
            Some(year) => Some((year, obs)),
            None => {
                unparseable += 1;
                None
            }
        })
        .collect();

    let mut years_present: Vec<i32> = dated.iter().map(|(year, _)| *year).collect();
    years_present.sort_unstable();
    years_present.dedup();

    let year = years_present.last().copied();
    let observations = dated
        .into_iter()
        .filter(|(y, _)| Some(*y) == year)
        .map(|(_, obs)| obs)
        .collect();

    YearSelection {
        observations,
        year,
        years_present,
        unparseable,
    }
}

/// Per unit, the latest `(year, value)` with `year <= cutoff`.
///
/// Units without any such year are absent from the result.
pub fn latest_at_or_before<V: Copy>(
    series: &BTreeMap<String, BTreeMap<i32, V>>,
    cutoff: i32,
) -> BTreeMap<String, (i32, V)> {
    series
        .iter()
        .filter_map(|(unit, years)| {
            years
                .range(..=cutoff)
                .next_back()
                .map(|(year, value)| (unit.clone(), (*year, *value)))
        })
        .collect()
}

/// `YYYY-MM` rendering for log lines.
pub fn format_month(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
