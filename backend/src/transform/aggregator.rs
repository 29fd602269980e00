//! Per-unit aggregation.
//!
//! Bin sums are assembled into one wide [`BinCounts`] per unit (left join on
//! the units that have a `total`, missing bins read as zero). Annual series
//! are summed per `(unit, year)` or averaged per unit.

use std::collections::BTreeMap;

use super::binner::{Bin, BinnedCounts};
use super::window::parse_year;
use crate::models::{FlowAggregate, Observation};

/// Bin counts of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinCounts {
    pub total: f64,
    pub children: f64,
    pub elderly: f64,
    pub women_adult: f64,
    pub men_adult: f64,
    pub unknown_age: f64,
}

impl BinCounts {
    /// Add another unit's counts (identifier collapse).
    pub fn merge(&mut self, other: &BinCounts) {
        self.total += other.total;
        self.children += other.children;
        self.elderly += other.elderly;
        self.women_adult += other.women_adult;
        self.men_adult += other.men_adult;
        self.unknown_age += other.unknown_age;
    }

    /// Share of `part` in `total`; 0 when total is 0.
    pub fn share(&self, part: f64) -> f64 {
        if self.total > 0.0 {
            part / self.total
        } else {
            0.0
        }
    }

    pub fn to_aggregate(&self, country_id: impl Into<String>) -> FlowAggregate {
        FlowAggregate {
            country_id: country_id.into(),
            total_refugees: self.total,
            children: self.children,
            elderly: self.elderly,
            women_adult: self.women_adult,
            men_adult: self.men_adult,
            unknown_age: self.unknown_age,
            pct_children: self.share(self.children),
            pct_elderly: self.share(self.elderly),
            pct_women_adult: self.share(self.women_adult),
            pct_men_adult: self.share(self.men_adult),
            pct_unknown_age: self.share(self.unknown_age),
        }
    }
}

/// One [`BinCounts`] per unit with a `total`.
pub fn assemble(binned: &BinnedCounts) -> BTreeMap<String, BinCounts> {
    binned
        .units()
        .map(|unit| {
            let counts = BinCounts {
                total: binned.get(Bin::Total, unit),
                children: binned.get(Bin::Children, unit),
                elderly: binned.get(Bin::Elderly, unit),
                women_adult: binned.get(Bin::WomenAdult, unit),
                men_adult: binned.get(Bin::MenAdult, unit),
                unknown_age: binned.get(Bin::UnknownAge, unit),
            };
            (unit.clone(), counts)
        })
        .collect()
}

/// Sum values per unit and year. Observations without a year are skipped.
pub fn sum_by_unit_year(observations: &[Observation]) -> BTreeMap<String, BTreeMap<i32, f64>> {
    let mut series: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
    for obs in observations {
        if let Some(year) = parse_year(&obs.period) {
            *series
                .entry(obs.reporting_unit.clone())
                .or_default()
                .entry(year)
                .or_insert(0.0) += obs.value;
        }
    }
    series
}

/// Running mean accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Mean) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Mean value per unit.
pub fn mean_by_unit(observations: &[Observation]) -> BTreeMap<String, Mean> {
    let mut means: BTreeMap<String, Mean> = BTreeMap::new();
    for obs in observations {
        means.entry(obs.reporting_unit.clone()).or_default().push(obs.value);
    }
    means
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgeVocabulary;
    use crate::models::Sex;
    use crate::transform::binner::bin_observations;

    fn obs(unit: &str, sex: &str, age: &str, value: f64) -> Observation {
        Observation::new(unit, "2024-05", value)
            .with_sex(Sex::from_code(sex))
            .with_age(age)
    }

    #[test]
    fn test_scenario_bins_sum_to_total() {
        let input = vec![
            obs("X", "T", "Y_LT18", 10.0),
            obs("X", "T", "Y_GE65", 5.0),
            obs("X", "F", "Y25-29", 20.0),
            obs("X", "M", "Y25-29", 15.0),
            obs("X", "T", "TOTAL", 50.0),
        ];
        let table = assemble(&bin_observations(&input, &AgeVocabulary::default()));
        let x = table["X"];

        assert_eq!(x.total, 50.0);
        assert_eq!(x.children + x.elderly + x.women_adult + x.men_adult, x.total);

        let record = x.to_aggregate("XXX");
        assert_eq!(record.pct_children, 0.2);
        assert_eq!(record.pct_women_adult, 0.4);
    }

    #[test]
    fn test_missing_bins_are_zero() {
        let input = vec![obs("A", "T", "TOTAL", 12.0), obs("B", "F", "Y25-29", 3.0)];
        let table = assemble(&bin_observations(&input, &AgeVocabulary::default()));

        // B has no total, so it is not a row
        assert_eq!(table.len(), 1);
        assert_eq!(table["A"].children, 0.0);
        assert_eq!(table["A"].men_adult, 0.0);
    }

    #[test]
    fn test_zero_total_shares() {
        let counts = BinCounts {
            unknown_age: 4.0,
            ..BinCounts::default()
        };
        let record = counts.to_aggregate("AUT");
        assert_eq!(record.pct_unknown_age, 0.0);
        assert_eq!(record.pct_children, 0.0);
    }

    #[test]
    fn test_unknown_share_not_normalized() {
        let counts = BinCounts {
            total: 100.0,
            children: 30.0,
            elderly: 10.0,
            women_adult: 40.0,
            men_adult: 20.0,
            unknown_age: 25.0,
        };
        let r = counts.to_aggregate("DEU");
        let sum = r.pct_children + r.pct_elderly + r.pct_women_adult + r.pct_men_adult + r.pct_unknown_age;
        assert!((sum - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_merge() {
        let mut a = BinCounts { total: 10.0, children: 2.0, ..BinCounts::default() };
        a.merge(&BinCounts { total: 5.0, children: 1.0, ..BinCounts::default() });
        assert_eq!(a.total, 15.0);
        assert_eq!(a.children, 3.0);
    }

    #[test]
    fn test_sum_by_unit_year() {
        let input = vec![
            Observation::new("AT", "2022", 1.0),
            Observation::new("AT", "2022", 2.0),
            Observation::new("AT", "2023-01", 4.0),
            Observation::new("AT", "??", 8.0),
        ];
        let series = sum_by_unit_year(&input);
        assert_eq!(series["AT"][&2022], 3.0);
        assert_eq!(series["AT"][&2023], 4.0);
        assert_eq!(series["AT"].len(), 2);
    }

    #[test]
    fn test_mean_by_unit() {
        let input = vec![
            Observation::new("BE", "2023", 30000.0),
            Observation::new("BE", "2023", 32000.0),
        ];
        let means = mean_by_unit(&input);
        assert_eq!(means["BE"].value(), Some(31000.0));
        assert_eq!(Mean::default().value(), None);
    }
}
