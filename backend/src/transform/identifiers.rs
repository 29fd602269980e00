//! National statistical codes to ISO3, and ISO3 to map positions.
//!
//! Eurostat reports Greece as `EL` and the United Kingdom as `UK`; both the
//! legacy and the ISO2 spelling map to the same ISO3 code.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::UnmappedIdentifierWarning;

/// Immutable national code -> canonical ISO3 lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    codes: BTreeMap<String, String>,
}

impl IdentifierMap {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            codes: pairs
                .iter()
                .map(|(national, iso3)| (national.to_string(), iso3.to_string()))
                .collect(),
        }
    }

    /// Case-insensitive on the national code.
    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.codes
            .get(code.trim().to_uppercase().as_str())
            .map(|s| s.as_str())
    }

    /// Re-key `rows` by canonical id.
    ///
    /// Rows collapsing onto one id are combined with `merge`. Unmapped codes
    /// are dropped and returned as a warning.
    pub fn map_keys<V, F>(
        &self,
        dataset: &str,
        rows: BTreeMap<String, V>,
        mut merge: F,
    ) -> (BTreeMap<String, V>, Option<UnmappedIdentifierWarning>)
    where
        F: FnMut(&mut V, V),
    {
        let mut mapped: BTreeMap<String, V> = BTreeMap::new();
        let mut unmapped: BTreeSet<String> = BTreeSet::new();

        for (code, value) in rows {
            match self.lookup(&code) {
                Some(iso3) => match mapped.get_mut(iso3) {
                    Some(existing) => merge(existing, value),
                    None => {
                        mapped.insert(iso3.to_string(), value);
                    }
                },
                None => {
                    unmapped.insert(code);
                }
            }
        }

        let warning = (!unmapped.is_empty()).then(|| UnmappedIdentifierWarning {
            dataset: dataset.to_string(),
            codes: unmapped.into_iter().collect(),
        });
        (mapped, warning)
    }
}

/// Eurostat `geo` codes of the European destination countries.
pub static EUROSTAT_GEO: Lazy<IdentifierMap> = Lazy::new(|| {
    IdentifierMap::from_pairs(&[
        ("AT", "AUT"), ("BE", "BEL"), ("BG", "BGR"), ("HR", "HRV"),
        ("CY", "CYP"), ("CZ", "CZE"), ("DE", "DEU"), ("DK", "DNK"),
        ("EE", "EST"), ("ES", "ESP"), ("FI", "FIN"), ("FR", "FRA"),
        ("GR", "GRC"), ("EL", "GRC"), ("HU", "HUN"), ("IE", "IRL"),
        ("IS", "ISL"), ("IT", "ITA"), ("LT", "LTU"), ("LU", "LUX"),
        ("LV", "LVA"), ("MT", "MLT"), ("NL", "NLD"), ("NO", "NOR"),
        ("PL", "POL"), ("PT", "PRT"), ("RO", "ROU"), ("SE", "SWE"),
        ("SI", "SVN"), ("SK", "SVK"), ("CH", "CHE"), ("UK", "GBR"),
        ("GB", "GBR"), ("AL", "ALB"), ("BA", "BIH"), ("RS", "SRB"),
        ("ME", "MNE"), ("MK", "MKD"), ("MD", "MDA"), ("UA", "UKR"),
        ("LI", "LIE"),
    ])
});

/// ISO3 -> approximate country centroid `(lat, lon)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentroidTable {
    points: BTreeMap<&'static str, (f64, f64)>,
}

impl CentroidTable {
    pub fn get(&self, iso3: &str) -> Option<(f64, f64)> {
        self.points.get(iso3).copied()
    }
}

pub static COUNTRY_CENTROIDS: Lazy<CentroidTable> = Lazy::new(|| CentroidTable {
    points: [
        ("AUT", (47.52, 14.55)), ("BEL", (50.50, 4.47)), ("BGR", (42.73, 25.49)),
        ("HRV", (45.10, 15.20)), ("CYP", (35.10, 33.40)), ("CZE", (49.82, 15.47)),
        ("DEU", (51.17, 10.45)), ("DNK", (56.26, 9.50)), ("EST", (58.60, 25.01)),
        ("ESP", (40.46, -3.75)), ("FIN", (61.92, 25.75)), ("FRA", (46.60, 2.21)),
        ("GRC", (39.07, 21.82)), ("HUN", (47.16, 19.50)), ("IRL", (53.14, -8.00)),
        ("ISL", (64.96, -19.02)), ("ITA", (41.87, 12.57)), ("LTU", (55.17, 23.88)),
        ("LUX", (49.81, 6.13)), ("LVA", (56.88, 24.60)), ("MLT", (35.94, 14.38)),
        ("NLD", (52.13, 5.29)), ("NOR", (60.47, 8.47)), ("POL", (51.92, 19.15)),
        ("PRT", (39.40, -8.22)), ("ROU", (45.94, 24.97)), ("SWE", (60.13, 18.64)),
        ("SVN", (46.15, 14.99)), ("SVK", (48.67, 19.70)), ("CHE", (46.82, 8.23)),
        ("GBR", (55.38, -3.44)), ("ALB", (41.15, 20.17)), ("BIH", (44.30, 17.60)),
        ("SRB", (44.02, 21.01)), ("MNE", (42.75, 19.27)), ("MKD", (41.60, 21.75)),
        ("MDA", (47.41, 28.37)), ("UKR", (49.00, 31.00)),
    ]
    .into_iter()
    .collect(),
});

/// Countries drawn on the map, checked by the coverage step.
pub const MAP_COUNTRIES: &[&str] = &[
    "ALB", "AUT", "BIH", "BEL", "BGR", "CHE", "CYP", "CZE", "DEU", "DNK", "EST", "GRC", "ESP",
    "FIN", "FRA", "HRV", "HUN", "IRL", "ISL", "ITA", "LTU", "LUX", "LVA", "MNE", "MKD", "MLT",
    "NLD", "NOR", "POL", "PRT", "ROU", "SRB", "SWE", "SVN", "SVK", "MDA", "UKR",
];
