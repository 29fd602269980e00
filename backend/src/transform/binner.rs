//! Demographic bins.
//!
//! Every observation lands in at most one named bin. `total` is the
//! normalization denominator: the unit's all-ages aggregate row when the
//! extract publishes one, otherwise the sum of its sex-total rows of known
//! age.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::AgeVocabulary;
use crate::models::{Observation, Sex};

/// Named, mutually exclusive demographic subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bin {
    Total,
    Children,
    Elderly,
    WomenAdult,
    MenAdult,
    UnknownAge,
}

impl Bin {
    pub const ALL: [Bin; 6] = [
        Bin::Total,
        Bin::Children,
        Bin::Elderly,
        Bin::WomenAdult,
        Bin::MenAdult,
        Bin::UnknownAge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Bin::Total => "total",
            Bin::Children => "children",
            Bin::Elderly => "elderly",
            Bin::WomenAdult => "women_adult",
            Bin::MenAdult => "men_adult",
            Bin::UnknownAge => "unknown_age",
        }
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one observation is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// All-ages aggregate row; only ever the unit's `total`
    Aggregate,
    /// Named bin; `in_total` marks rows that feed the fallback total
    Binned { bin: Option<Bin>, in_total: bool },
    /// Sex code outside the vocabulary, or a female/male row of a
    /// non-adult band
    Ignored,
}

/// Place an observation according to its sex and age codes.
///
/// A missing age code is read as the all-ages aggregate.
pub fn classify(obs: &Observation, ages: &AgeVocabulary) -> Placement {
    let age = obs.age_band.as_deref();
    let is_aggregate = age.map_or(true, |a| ages.is_all_ages(a));

    match obs.sex.as_ref() {
        Some(Sex::Total) | None => {
            if is_aggregate {
                return Placement::Aggregate;
            }
            let age = age.unwrap_or_default();
            if ages.is_unknown(age) {
                Placement::Binned { bin: Some(Bin::UnknownAge), in_total: false }
            } else if ages.is_child(age) {
                Placement::Binned { bin: Some(Bin::Children), in_total: true }
            } else if ages.is_elder(age) {
                Placement::Binned { bin: Some(Bin::Elderly), in_total: true }
            } else {
                Placement::Binned { bin: None, in_total: true }
            }
        }
        Some(Sex::Female) if !is_aggregate && age.map_or(false, |a| ages.is_adult(a)) => {
            Placement::Binned { bin: Some(Bin::WomenAdult), in_total: false }
        }
        Some(Sex::Male) if !is_aggregate && age.map_or(false, |a| ages.is_adult(a)) => {
            Placement::Binned { bin: Some(Bin::MenAdult), in_total: false }
        }
        _ => Placement::Ignored,
    }
}

/// Per-bin, per-unit sums.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinnedCounts {
    bins: BTreeMap<Bin, BTreeMap<String, f64>>,
    pub ignored: usize,
}

impl BinnedCounts {
    /// Sums of one bin. Units without a contribution are absent.
    pub fn bin(&self, bin: Bin) -> Option<&BTreeMap<String, f64>> {
        self.bins.get(&bin)
    }

    /// Units that have a `total`.
    pub fn units(&self) -> impl Iterator<Item = &String> {
        self.bins.get(&Bin::Total).into_iter().flat_map(|m| m.keys())
    }

    /// Sum of `bin` for `unit`, zero when the unit has no contribution.
    pub fn get(&self, bin: Bin, unit: &str) -> f64 {
        self.bins
            .get(&bin)
            .and_then(|m| m.get(unit))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Sum every observation into its bin.
pub fn bin_observations(observations: &[Observation], ages: &AgeVocabulary) -> BinnedCounts {
    let mut counts = BinnedCounts::default();
    let mut aggregate: BTreeMap<String, f64> = BTreeMap::new();
    let mut fallback_total: BTreeMap<String, f64> = BTreeMap::new();

    for obs in observations {
        let unit = &obs.reporting_unit;
        match classify(obs, ages) {
            Placement::Aggregate => {
                *aggregate.entry(unit.clone()).or_insert(0.0) += obs.value;
            }
            Placement::Binned { bin, in_total } => {
                if let Some(bin) = bin {
                    *counts
                        .bins
                        .entry(bin)
                        .or_default()
                        .entry(unit.clone())
                        .or_insert(0.0) += obs.value;
                }
                if in_total {
                    *fallback_total.entry(unit.clone()).or_insert(0.0) += obs.value;
                }
            }
            Placement::Ignored => counts.ignored += 1,
        }
    }

    // the published aggregate wins over the reconstructed one
    let mut total = fallback_total;
    total.extend(aggregate);
    counts.bins.insert(Bin::Total, total);

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(unit: &str, sex: &str, age: &str, value: f64) -> Observation {
        Observation::new(unit, "2024-05", value)
            .with_sex(Sex::from_code(sex))
            .with_age(age)
    }

    #[test]
    fn test_aggregate_row_is_total() {
        let ages = AgeVocabulary::default();
        let input = vec![
            obs("X", "T", "Y_LT18", 10.0),
            obs("X", "T", "Y_GE65", 5.0),
            obs("X", "F", "Y25-29", 20.0),
            obs("X", "M", "Y25-29", 15.0),
            obs("X", "T", "TOTAL", 50.0),
        ];
        let counts = bin_observations(&input, &ages);

        assert_eq!(counts.get(Bin::Total, "X"), 50.0);
        assert_eq!(counts.get(Bin::Children, "X"), 10.0);
        assert_eq!(counts.get(Bin::Elderly, "X"), 5.0);
        assert_eq!(counts.get(Bin::WomenAdult, "X"), 20.0);
        assert_eq!(counts.get(Bin::MenAdult, "X"), 15.0);
        assert_eq!(counts.get(Bin::UnknownAge, "X"), 0.0);
    }

    #[test]
    fn test_total_reconstructed_without_aggregate_row() {
        let ages = AgeVocabulary::default();
        let input = vec![
            obs("Y", "T", "Y_LT18", 10.0),
            obs("Y", "T", "Y18-34", 30.0),
            obs("Y", "T", "Y_GE65", 5.0),
            obs("Y", "T", "UNK", 7.0),
        ];
        let counts = bin_observations(&input, &ages);

        assert_eq!(counts.get(Bin::Total, "Y"), 45.0);
        assert_eq!(counts.get(Bin::UnknownAge, "Y"), 7.0);
    }

    #[test]
    fn test_female_minors_not_adult() {
        let ages = AgeVocabulary::default();
        let input = vec![
            obs("X", "F", "Y_LT18", 4.0),
            obs("X", "F", "Y_GE65", 2.0),
            obs("X", "F", "UNK", 1.0),
            obs("X", "F", "TOTAL", 40.0),
            obs("X", "F", "Y35-64", 9.0),
        ];
        let counts = bin_observations(&input, &ages);

        assert_eq!(counts.get(Bin::WomenAdult, "X"), 9.0);
        assert_eq!(counts.ignored, 4);
    }

    #[test]
    fn test_unknown_sex_ignored() {
        let ages = AgeVocabulary::default();
        let placement = classify(&obs("X", "UNK", "Y18-34", 3.0), &ages);
        assert_eq!(placement, Placement::Ignored);
    }

    #[test]
    fn test_missing_age_is_aggregate() {
        let ages = AgeVocabulary::default();
        let row = Observation::new("Z", "2024-05", 8.0).with_sex(Sex::Total);
        assert_eq!(classify(&row, &ages), Placement::Aggregate);

        let counts = bin_observations(&[row], &ages);
        assert_eq!(counts.units().collect::<Vec<_>>(), vec!["Z"]);
        assert_eq!(counts.get(Bin::Total, "Z"), 8.0);
    }

    #[test]
    fn test_bin_names() {
        let names: Vec<&str> = Bin::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            vec!["total", "children", "elderly", "women_adult", "men_adult", "unknown_age"]
        );
    }
}
