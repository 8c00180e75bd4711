#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core data types for response coverage resolution.
//!
//! These types flow through the whole pipeline: station metadata and
//! isochrone polygons on the way in, coverage records in the middle, and
//! per-area result rows on the way out. Geometry-bearing types use `geo`
//! primitives; rows that cross the CSV boundary derive serde.

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A service-provider origin (e.g. a fire station) as read from the
/// provider metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Unique provider identifier.
    pub origin_id: String,
    /// Whether the origin is crewed full-time (vs. a retained/on-call crew).
    pub is_full_time: bool,
}

/// One ranged travel-time polygon for an origin.
///
/// `time_band` is the upper bound in minutes, drawn from a fixed ascending
/// set (see [`RunConfig::time_bands`]). Bands for a single origin may be
/// nested or overlapping rings; consumers must not assume disjointness.
#[derive(Debug, Clone, PartialEq)]
pub struct Isochrone {
    /// Origin that this polygon belongs to.
    pub origin_id: String,
    /// Upper travel-time bound in minutes.
    pub time_band: u32,
    /// Coverage polygon, in the shared coordinate reference system.
    pub geometry: MultiPolygon<f64>,
}

/// The full isochrone table, tagged with the coordinate reference system it
/// was read in (`None` when the source file declared none).
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneSet {
    /// Coordinate reference system identifier (e.g. "EPSG:27700").
    pub crs: Option<String>,
    /// All isochrone records, in input order.
    pub records: Vec<Isochrone>,
}

/// A representative point for one population area, from the point layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPoint {
    /// Unique area identifier.
    pub area_id: String,
    /// Point-on-surface representative point.
    pub point: Point<f64>,
}

/// The full polygon for one population area, from the polygon layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPolygon {
    /// Unique area identifier.
    pub area_id: String,
    /// Full area boundary.
    pub polygon: MultiPolygon<f64>,
}

/// One input layer of area representative points.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPointLayer {
    /// Coordinate reference system identifier, if declared by the source.
    pub crs: Option<String>,
    /// All rows, in input order.
    pub rows: Vec<AreaPoint>,
}

/// One input layer of area polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaPolygonLayer {
    /// Coordinate reference system identifier, if declared by the source.
    pub crs: Option<String>,
    /// All rows, in input order.
    pub rows: Vec<AreaPolygon>,
}

/// A population area with both geometry representations paired by id.
///
/// Every area has exactly one representative point and exactly one polygon;
/// the pairing step enforces that invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    /// Unique area identifier.
    pub area_id: String,
    /// Point-on-surface representative point.
    pub point: Point<f64>,
    /// Full area boundary.
    pub polygon: MultiPolygon<f64>,
}

/// Paired areas plus the reference system they share.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaSet {
    /// Coordinate reference system identifier, if declared by the sources.
    pub crs: Option<String>,
    /// All areas, in point-layer input order.
    pub areas: Vec<Area>,
}

/// The minimum covering band for one area, with the full tie set.
///
/// `covering_origin_ids` keeps every origin tied at the minimum band, in
/// isochrone input order. It is carried as a genuine list end to end;
/// delimiter-joined strings only ever appear at rendering boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRecord {
    /// Area this record covers.
    pub area_id: String,
    /// Minimum band (minutes) at which the area is reached.
    pub time_band: u32,
    /// All origins tied at `time_band`, in input order, deduplicated.
    pub covering_origin_ids: Vec<String>,
}

impl CoverageRecord {
    /// Number of origins tied at the minimum band.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.covering_origin_ids.len()
    }

    /// The first tied origin, used for provider attribution.
    #[must_use]
    pub fn representative_origin_id(&self) -> Option<&str> {
        self.covering_origin_ids.first().map(String::as_str)
    }

    /// Renders the tie set as a single delimited string, for logs and
    /// human-readable summaries.
    #[must_use]
    pub fn joined_origin_ids(&self, delimiter: &str) -> String {
        self.covering_origin_ids.join(delimiter)
    }
}

/// Which resolution path produced an area's result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPhase {
    /// The area's representative point intersected an isochrone.
    #[serde(rename = "point-matched")]
    PointMatched,
    /// The point missed everything but the full polygon overlapped coverage.
    #[serde(rename = "polygon-fallback-matched")]
    PolygonFallback,
    /// No isochrone reaches the area within the maximum studied band.
    #[serde(rename = "uncovered")]
    Uncovered,
}

impl ResolutionPhase {
    /// Stable string form, matching the output table encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointMatched => "point-matched",
            Self::PolygonFallback => "polygon-fallback-matched",
            Self::Uncovered => "uncovered",
        }
    }
}

/// One row of the final per-area output table.
///
/// Exactly one row exists per input area. The nullable fields are all
/// `None` for uncovered areas; `provider_is_full_time` is additionally
/// `None` when the representative origin has no metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Unique area identifier.
    pub area_id: String,
    /// Which resolution path matched this area.
    pub resolution_phase: ResolutionPhase,
    /// Minimum covering band in minutes; `None` iff uncovered.
    pub time_band_upper_bound: Option<u32>,
    /// First tied origin at the minimum band; `None` iff uncovered.
    pub representative_origin_id: Option<String>,
    /// Crew type of the representative origin; `None` when uncovered or
    /// when the origin has no metadata match.
    pub provider_is_full_time: Option<bool>,
}

/// Caller-supplied run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Coordinate reference system every spatial input must share.
    pub crs: String,
    /// Ascending set of valid time-band upper bounds, in minutes.
    pub time_bands: Vec<u32>,
    /// Delimiter used when tie lists are rendered as strings.
    pub tie_delimiter: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            crs: "EPSG:27700".to_owned(),
            time_bands: vec![3, 5, 8, 10, 12, 15, 30],
            tie_delimiter: " | ".to_owned(),
        }
    }
}

impl RunConfig {
    /// Checks that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the CRS is empty or the band set is empty
    /// or not strictly ascending.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crs.trim().is_empty() {
            return Err(ConfigError::EmptyCrs);
        }
        if self.time_bands.is_empty() {
            return Err(ConfigError::EmptyTimeBands);
        }
        if self.time_bands.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::UnorderedTimeBands {
                bands: self.time_bands.clone(),
            });
        }
        Ok(())
    }

    /// The maximum studied band, i.e. the upper bound beyond which an area
    /// counts as uncovered.
    #[must_use]
    pub fn max_band(&self) -> Option<u32> {
        self.time_bands.last().copied()
    }
}

/// Errors in caller-supplied configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No coordinate reference system was supplied.
    #[error("Configured CRS is empty")]
    EmptyCrs,

    /// The time-band set was empty.
    #[error("Configured time-band set is empty")]
    EmptyTimeBands,

    /// The time-band set was not strictly ascending.
    #[error("Time bands must be strictly ascending, got {bands:?}")]
    UnorderedTimeBands {
        /// The offending band set.
        bands: Vec<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_band(), Some(30));
    }

    #[test]
    fn rejects_empty_crs() {
        let config = RunConfig {
            crs: "  ".to_owned(),
            ..RunConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyCrs));
    }

    #[test]
    fn rejects_empty_band_set() {
        let config = RunConfig {
            time_bands: vec![],
            ..RunConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyTimeBands));
    }

    #[test]
    fn rejects_descending_or_duplicate_bands() {
        for bands in [vec![5, 3], vec![3, 3, 5]] {
            let config = RunConfig {
                time_bands: bands.clone(),
                ..RunConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::UnorderedTimeBands { bands })
            );
        }
    }

    #[test]
    fn phase_strings_match_output_encoding() {
        assert_eq!(ResolutionPhase::PointMatched.as_str(), "point-matched");
        assert_eq!(
            ResolutionPhase::PolygonFallback.as_str(),
            "polygon-fallback-matched"
        );
        assert_eq!(ResolutionPhase::Uncovered.as_str(), "uncovered");
    }

    #[test]
    fn coverage_record_helpers() {
        let record = CoverageRecord {
            area_id: "S01000001".to_owned(),
            time_band: 8,
            covering_origin_ids: vec!["stn-a".to_owned(), "stn-b".to_owned()],
        };
        assert_eq!(record.match_count(), 2);
        assert_eq!(record.representative_origin_id(), Some("stn-a"));
        assert_eq!(record.joined_origin_ids(" | "), "stn-a | stn-b");
    }

    #[test]
    fn empty_tie_set_has_no_representative() {
        let record = CoverageRecord {
            area_id: "S01000002".to_owned(),
            time_band: 5,
            covering_origin_ids: vec![],
        };
        assert_eq!(record.representative_origin_id(), None);
        assert_eq!(record.match_count(), 0);
    }
}
