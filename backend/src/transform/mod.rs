//! Transformation stages.
//!
//! - [`schema`]: canonical field resolution
//! - [`observations`]: raw rows to observations
//! - [`window`]: reporting period selection
//! - [`binner`]: demographic bins
//! - [`aggregator`]: per-unit sums and shares
//! - [`identifiers`]: national codes to ISO3, centroids
//! - [`joiner`]: cross-dataset joins and derived metrics
//! - [`upstream`]: readers for earlier steps' outputs
//! - [`pipeline`]: the steps themselves

pub mod aggregator;
pub mod binner;
pub mod identifiers;
pub mod joiner;
pub mod observations;
pub mod pipeline;
pub mod schema;
pub mod upstream;
pub mod window;

pub use identifiers::{IdentifierMap, COUNTRY_CENTROIDS, EUROSTAT_GEO};
pub use pipeline::*;
