//! Canonical field resolution.
//!
//! Extract vintages spell the same column differently (`geo`, `GEO`,
//! `TIME_PERIOD`, `time`, ...). A [`FieldSpec`] lists the accepted spellings
//! of one canonical field; [`resolve`] maps every spec to exactly one source
//! column or reports the first mandatory field it could not place.
//!
//! Matching is exact on trimmed, lowercased names. There is no positional or
//! fuzzy fallback.

use std::collections::BTreeMap;

use crate::diagnostics::log_info_indent;
use crate::error::SchemaError;

pub const CITIZEN: &str = "citizen";
pub const SEX: &str = "sex";
pub const AGE: &str = "age";
pub const GEO: &str = "geo";
pub const TIME: &str = "time_period";
pub const VALUE: &str = "obs_value";
pub const UNIT: &str = "unit";
pub const DURATION: &str = "duration";
pub const REASON: &str = "reason";

pub const DEST_ISO3: &str = "dest_iso3";
pub const TOTAL_REFUGEES: &str = "total_refugees";
pub const GDP_PC: &str = "gdp_pc";
pub const LAT: &str = "lat";
pub const LON: &str = "lon";

/// Accepted spellings of one canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Tried in order after the canonical name itself
    pub aliases: &'static [&'static str],
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases, required: true }
    }

    pub const fn optional(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases, required: false }
    }

    /// Candidate spellings in matching order.
    pub fn candidates(&self) -> Vec<&'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied()).collect()
    }
}

/// Fields of the asylum/temporary-protection flow extract (`migr_asytpsm`).
pub const FLOW_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(CITIZEN, &[]),
    FieldSpec::required(SEX, &[]),
    FieldSpec::required(AGE, &[]),
    FieldSpec::required(GEO, &[]),
    FieldSpec::required(TIME, &[]),
    FieldSpec::required(VALUE, &[]),
    FieldSpec::required(UNIT, &[]),
];

/// Fields of the valid residence permit extract (`migr_resvalid`).
pub const PERMIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(CITIZEN, &[]),
    FieldSpec::required(GEO, &[]),
    FieldSpec::required(TIME, &["time"]),
    FieldSpec::required(VALUE, &["value"]),
    FieldSpec::required(UNIT, &[]),
    FieldSpec::optional(DURATION, &[]),
    FieldSpec::optional(REASON, &[]),
    FieldSpec::optional(SEX, &[]),
    FieldSpec::optional(AGE, &[]),
];

/// Fields of the GDP per capita extract (`sdg_08_10`).
pub const GDP_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(GEO, &[]),
    FieldSpec::required(TIME, &[]),
    FieldSpec::required(VALUE, &[]),
    FieldSpec::required(UNIT, &[]),
];

/// Columns of a flows table written by an earlier run.
pub const UPSTREAM_FLOW_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(DEST_ISO3, &[]),
    FieldSpec::required(TOTAL_REFUGEES, &[]),
    FieldSpec::optional(LAT, &["latitude"]),
    FieldSpec::optional(LON, &["longitude", "lng"]),
];

/// Columns of a GDP table written by an earlier run.
pub const UPSTREAM_GDP_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(DEST_ISO3, &[]),
    FieldSpec::required(GDP_PC, &[]),
];

/// Where a canonical field lives in the source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    /// Header as written in the source
    pub source: String,
}

/// Canonical field -> source column, for the fields that were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSchema {
    columns: BTreeMap<&'static str, ResolvedColumn>,
}

impl ResolvedSchema {
    pub fn has(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn column(&self, field: &str) -> Option<&ResolvedColumn> {
        self.columns.get(field)
    }

    /// Cell of `field` in `row`; `None` when the field is not present.
    pub fn value<'a>(&self, row: &'a [String], field: &str) -> Option<&'a str> {
        self.columns
            .get(field)
            .and_then(|col| row.get(col.index))
            .map(|s| s.as_str())
    }

    /// Cell of `field` in `row`, `None` when the field is absent or the cell is blank.
    pub fn non_empty<'a>(&self, row: &'a [String], field: &str) -> Option<&'a str> {
        self.value(row, field).filter(|s| !s.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ResolvedColumn)> {
        self.columns.iter().map(|(k, v)| (*k, v))
    }

    /// Log `field <- source column` for every resolved field.
    pub fn log_mapping(&self) {
        for (field, col) in self.iter() {
            log_info_indent(format!("{:<14} <- {}", field, col.source), 1);
        }
    }
}

/// Resolve every spec against `headers`.
///
/// # Example
/// ```
/// use flowmetrics::transform::schema::{resolve, FieldSpec};
///
/// let headers = vec!["GEO ".to_string(), "TIME_PERIOD".to_string()];
/// let specs = [
///     FieldSpec::required("geo", &[]),
///     FieldSpec::required("time_period", &["time"]),
///     FieldSpec::optional("sex", &[]),
/// ];
/// let schema = resolve(&headers, &specs).unwrap();
///
/// assert_eq!(schema.column("geo").unwrap().index, 0);
/// assert!(!schema.has("sex"));
/// ```
pub fn resolve(headers: &[String], specs: &[FieldSpec]) -> Result<ResolvedSchema, SchemaError> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
    let mut columns = BTreeMap::new();

    for spec in specs {
        match find_column(&normalized, spec) {
            Some(index) => {
                columns.insert(
                    spec.name,
                    ResolvedColumn {
                        index,
                        source: headers[index].clone(),
                    },
                );
            }
            None if spec.required => {
                return Err(SchemaError {
                    field: spec.name.to_string(),
                    tried: spec.candidates().iter().map(|c| c.to_string()).collect(),
                });
            }
            None => {}
        }
    }

    Ok(ResolvedSchema { columns })
}

fn find_column(normalized: &[String], spec: &FieldSpec) -> Option<usize> {
    spec.candidates().into_iter().find_map(|candidate| {
        let target = normalize(candidate);
        normalized.iter().position(|h| *h == target)
    })
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_case_insensitive_match() {
        let h = headers(&["DATAFLOW", "citizen", "SEX", "Age", " geo ", "TIME_PERIOD", "OBS_VALUE", "unit"]);
        let schema = resolve(&h, FLOW_FIELDS).unwrap();

        assert_eq!(schema.column(SEX).unwrap().index, 2);
        assert_eq!(schema.column(GEO).unwrap().source, " geo ");
        assert_eq!(schema.column(VALUE).unwrap().index, 6);
    }

    #[test]
    fn test_alias_match() {
        let h = headers(&["CITIZEN", "GEO", "TIME", "value", "UNIT"]);
        let schema = resolve(&h, PERMIT_FIELDS).unwrap();

        assert_eq!(schema.column(TIME).unwrap().source, "TIME");
        assert_eq!(schema.column(VALUE).unwrap().source, "value");
    }

    #[test]
    fn test_canonical_name_preferred_over_alias() {
        let h = headers(&["time", "TIME_PERIOD"]);
        let specs = [FieldSpec::required(TIME, &["time"])];
        let schema = resolve(&h, &specs).unwrap();

        assert_eq!(schema.column(TIME).unwrap().index, 1);
    }

    #[test]
    fn test_optional_fields_absent() {
        let h = headers(&["citizen", "geo", "TIME_PERIOD", "OBS_VALUE", "unit"]);
        let schema = resolve(&h, PERMIT_FIELDS).unwrap();

        assert!(!schema.has(SEX));
        assert!(!schema.has(AGE));
        assert!(!schema.has(DURATION));

        let row = headers(&["UA", "PL", "2023", "10", "PER"]);
        assert_eq!(schema.value(&row, SEX), None);
        assert_eq!(schema.value(&row, GEO), Some("PL"));
    }

    #[test]
    fn test_missing_mandatory_field_named() {
        let h = headers(&["citizen", "sex", "age", "TIME_PERIOD", "OBS_VALUE", "unit"]);
        let err = resolve(&h, FLOW_FIELDS).unwrap_err();

        assert_eq!(err.field, GEO);
        assert!(err.to_string().contains("'geo'"));
    }

    #[test]
    fn test_no_substring_guessing() {
        let h = headers(&["geo_label", "citizenship"]);
        let specs = [FieldSpec::required(GEO, &[])];
        assert!(resolve(&h, &specs).is_err());
    }

    #[test]
    fn test_non_empty_skips_blank_cells() {
        let h = headers(&["geo", "sex"]);
        let specs = [FieldSpec::required(GEO, &[]), FieldSpec::optional(SEX, &[])];
        let schema = resolve(&h, &specs).unwrap();

        let row = headers(&["AT", "  "]);
        assert_eq!(schema.non_empty(&row, SEX), None);
        assert_eq!(schema.non_empty(&row, GEO), Some("AT"));
    }
}
