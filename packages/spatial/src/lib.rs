#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for isochrone coverage queries.
//!
//! Builds an R-tree over every (origin, time band) isochrone polygon at
//! startup and answers "which isochrones reach this area" for both area
//! representations: the cheap representative-point test and the polygon
//! overlap fallback. Intersection is inclusive: an area touching an
//! isochrone boundary counts as covered.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Intersects, MultiPolygon, Validation};
use response_map_coverage_models::{
    Area, AreaPointLayer, AreaPolygonLayer, AreaSet, ConfigError, IsochroneSet, RunConfig,
};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors from index construction, spatial queries, or layer pairing.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Caller-supplied configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A spatial input declared no coordinate reference system.
    #[error("Dataset '{dataset}' has no coordinate reference system")]
    UndefinedCrs {
        /// Which input table is missing its CRS.
        dataset: String,
    },

    /// Two spatial inputs disagree on coordinate reference system.
    #[error("CRS mismatch: expected {expected}, got {found} from '{dataset}'")]
    CrsMismatch {
        /// The reference system every input must share.
        expected: String,
        /// The reference system the offending input declared.
        found: String,
        /// Which input table disagreed.
        dataset: String,
    },

    /// An isochrone carries a band outside the configured band set.
    #[error("Isochrone for origin '{origin_id}' has unknown time band {time_band}")]
    UnknownTimeBand {
        /// Origin the isochrone belongs to.
        origin_id: String,
        /// The unrecognized band value.
        time_band: u32,
    },

    /// A polygon failed validity checks (e.g. self-intersecting rings).
    #[error("Invalid geometry: {label}")]
    InvalidGeometry {
        /// Which record carried the bad geometry.
        label: String,
    },

    /// An area id appeared more than once within one layer.
    #[error("Duplicate area id '{area_id}' in '{dataset}' layer")]
    DuplicateAreaId {
        /// The repeated identifier.
        area_id: String,
        /// Layer the duplicate was found in.
        dataset: String,
    },

    /// An area has a representative point but no polygon.
    #[error("Area '{area_id}' has no polygon record")]
    MissingPolygon {
        /// The unpaired identifier.
        area_id: String,
    },

    /// An area has a polygon but no representative point.
    #[error("Area '{area_id}' has no representative point record")]
    MissingPoint {
        /// The unpaired identifier.
        area_id: String,
    },
}

/// An isochrone polygon stored in the R-tree with its attribution.
struct IsochroneEntry {
    origin_id: String,
    time_band: u32,
    /// Position in the input table; hit lists are ordered by this so that
    /// downstream tie-breaking is deterministic.
    seq: usize,
    envelope: AABB<[f64; 2]>,
    geometry: MultiPolygon<f64>,
}

impl RTreeObject for IsochroneEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Which geometry representation a query runs against.
#[derive(Clone, Copy)]
enum Representation {
    Point,
    Polygon,
}

/// One isochrone that reaches a queried area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsochroneHit {
    /// Origin the covering isochrone belongs to.
    pub origin_id: String,
    /// Upper travel-time bound of the covering isochrone, in minutes.
    pub time_band: u32,
}

/// Pre-built R-tree over every isochrone polygon.
///
/// Constructed once from the immutable isochrone table and queried for both
/// resolution phases. All query inputs must share the CRS the index was
/// built with.
pub struct GeometryIndex {
    crs: String,
    isochrones: RTree<IsochroneEntry>,
}

impl GeometryIndex {
    /// Validates the isochrone table against `config` and bulk-loads the
    /// R-tree.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the config is invalid, the table's CRS
    /// is undefined or differs from the configured one, any band is outside
    /// the configured band set, or any polygon is invalid.
    pub fn build(set: &IsochroneSet, config: &RunConfig) -> Result<Self, GeometryError> {
        config.validate()?;
        let crs = check_crs(&config.crs, set.crs.as_deref(), "isochrones")?;

        let mut entries = Vec::with_capacity(set.records.len());
        for (seq, record) in set.records.iter().enumerate() {
            if !config.time_bands.contains(&record.time_band) {
                return Err(GeometryError::UnknownTimeBand {
                    origin_id: record.origin_id.clone(),
                    time_band: record.time_band,
                });
            }
            if !record.geometry.is_valid() {
                return Err(GeometryError::InvalidGeometry {
                    label: format!(
                        "isochrone origin '{}' band {}",
                        record.origin_id, record.time_band
                    ),
                });
            }
            entries.push(IsochroneEntry {
                origin_id: record.origin_id.clone(),
                time_band: record.time_band,
                seq,
                envelope: compute_envelope(&record.geometry),
                geometry: record.geometry.clone(),
            });
        }

        let isochrones = RTree::bulk_load(entries);
        log::info!("Indexed {} isochrone polygons", isochrones.size());

        Ok(Self {
            crs: crs.to_owned(),
            isochrones,
        })
    }

    /// The coordinate reference system this index was built in.
    #[must_use]
    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// Every isochrone reaching each area's representative point.
    ///
    /// Returns a multimap keyed by `area_id`; only areas with at least one
    /// hit appear. Hits are ordered by isochrone input order. When `subset`
    /// is given, only areas whose id is in it are queried.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::CrsMismatch`] or
    /// [`GeometryError::UndefinedCrs`] if the area set is not in the
    /// index's reference system.
    pub fn intersecting_isochrones_for_points(
        &self,
        areas: &AreaSet,
        subset: Option<&BTreeSet<String>>,
    ) -> Result<BTreeMap<String, Vec<IsochroneHit>>, GeometryError> {
        check_crs(&self.crs, areas.crs.as_deref(), "areas")?;
        Ok(self.collect_hits(areas, subset, Representation::Point))
    }

    /// Every isochrone overlapping each area's full polygon.
    ///
    /// Same contract as
    /// [`intersecting_isochrones_for_points`](Self::intersecting_isochrones_for_points),
    /// with polygon-polygon intersection: any shared boundary or interior
    /// counts.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::CrsMismatch`] or
    /// [`GeometryError::UndefinedCrs`] if the area set is not in the
    /// index's reference system.
    pub fn intersecting_isochrones_for_polygons(
        &self,
        areas: &AreaSet,
        subset: Option<&BTreeSet<String>>,
    ) -> Result<BTreeMap<String, Vec<IsochroneHit>>, GeometryError> {
        check_crs(&self.crs, areas.crs.as_deref(), "areas")?;
        Ok(self.collect_hits(areas, subset, Representation::Polygon))
    }

    /// Shared candidate scan: envelope query first, exact geometry test on
    /// the survivors, hits sorted back into input order.
    fn collect_hits(
        &self,
        areas: &AreaSet,
        subset: Option<&BTreeSet<String>>,
        repr: Representation,
    ) -> BTreeMap<String, Vec<IsochroneHit>> {
        let mut hits_by_area = BTreeMap::new();

        for area in &areas.areas {
            if let Some(ids) = subset
                && !ids.contains(&area.area_id)
            {
                continue;
            }

            let query_env = match repr {
                Representation::Point => AABB::from_point([area.point.x(), area.point.y()]),
                Representation::Polygon => compute_envelope(&area.polygon),
            };

            let mut matched: Vec<&IsochroneEntry> = self
                .isochrones
                .locate_in_envelope_intersecting(&query_env)
                .filter(|entry| match repr {
                    Representation::Point => entry.geometry.intersects(&area.point),
                    Representation::Polygon => entry.geometry.intersects(&area.polygon),
                })
                .collect();
            matched.sort_by_key(|entry| entry.seq);

            if !matched.is_empty() {
                hits_by_area.insert(
                    area.area_id.clone(),
                    matched
                        .into_iter()
                        .map(|entry| IsochroneHit {
                            origin_id: entry.origin_id.clone(),
                            time_band: entry.time_band,
                        })
                        .collect(),
                );
            }
        }

        hits_by_area
    }
}

/// Pairs the point and polygon layers into one [`AreaSet`].
///
/// Enforces the area invariant: exactly one point and one polygon per id,
/// both layers in the same reference system, all polygons valid. Output
/// order follows the point layer.
///
/// # Errors
///
/// Returns [`GeometryError`] on duplicate ids, unpaired ids, CRS
/// disagreement between the layers, or an invalid area polygon.
pub fn pair_area_layers(
    points: &AreaPointLayer,
    polygons: &AreaPolygonLayer,
) -> Result<AreaSet, GeometryError> {
    if points.crs != polygons.crs {
        return Err(GeometryError::CrsMismatch {
            expected: crs_label(points.crs.as_deref()),
            found: crs_label(polygons.crs.as_deref()),
            dataset: "area polygons".to_owned(),
        });
    }

    let mut polygons_by_id = BTreeMap::new();
    for row in &polygons.rows {
        if !row.polygon.is_valid() {
            return Err(GeometryError::InvalidGeometry {
                label: format!("area '{}' polygon", row.area_id),
            });
        }
        if polygons_by_id
            .insert(row.area_id.clone(), row.polygon.clone())
            .is_some()
        {
            return Err(GeometryError::DuplicateAreaId {
                area_id: row.area_id.clone(),
                dataset: "area polygons".to_owned(),
            });
        }
    }

    let mut seen_points = BTreeSet::new();
    let mut areas = Vec::with_capacity(points.rows.len());
    for row in &points.rows {
        if !seen_points.insert(row.area_id.clone()) {
            return Err(GeometryError::DuplicateAreaId {
                area_id: row.area_id.clone(),
                dataset: "area points".to_owned(),
            });
        }
        let polygon =
            polygons_by_id
                .remove(&row.area_id)
                .ok_or_else(|| GeometryError::MissingPolygon {
                    area_id: row.area_id.clone(),
                })?;
        areas.push(Area {
            area_id: row.area_id.clone(),
            point: row.point,
            polygon,
        });
    }

    if let Some(area_id) = polygons_by_id.into_keys().next() {
        return Err(GeometryError::MissingPoint { area_id });
    }

    log::info!("Paired {} areas from point and polygon layers", areas.len());

    Ok(AreaSet {
        crs: points.crs.clone(),
        areas,
    })
}

/// Checks a declared CRS against the expected one.
fn check_crs<'a>(
    expected: &str,
    declared: Option<&'a str>,
    dataset: &str,
) -> Result<&'a str, GeometryError> {
    let found = declared.ok_or_else(|| GeometryError::UndefinedCrs {
        dataset: dataset.to_owned(),
    })?;
    if found == expected {
        Ok(found)
    } else {
        Err(GeometryError::CrsMismatch {
            expected: expected.to_owned(),
            found: found.to_owned(),
            dataset: dataset.to_owned(),
        })
    }
}

fn crs_label(crs: Option<&str>) -> String {
    crs.map_or_else(|| "(undefined)".to_owned(), ToOwned::to_owned)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use geo::{Point, polygon};
    use response_map_coverage_models::{AreaPoint, AreaPolygon, Isochrone};

    use super::*;

    fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: min_x, y: min_y),
            (x: min_x + size, y: min_y),
            (x: min_x + size, y: min_y + size),
            (x: min_x, y: min_y + size),
        ]])
    }

    fn config() -> RunConfig {
        RunConfig::default()
    }

    fn crs() -> Option<String> {
        Some("EPSG:27700".to_owned())
    }

    fn isochrones(records: Vec<Isochrone>) -> IsochroneSet {
        IsochroneSet {
            crs: crs(),
            records,
        }
    }

    fn area(id: &str, x: f64, y: f64) -> Area {
        Area {
            area_id: id.to_owned(),
            point: Point::new(x, y),
            polygon: square(x - 0.5, y - 0.5, 1.0),
        }
    }

    fn area_set(areas: Vec<Area>) -> AreaSet {
        AreaSet { crs: crs(), areas }
    }

    #[test]
    fn point_query_finds_covering_isochrones_in_input_order() {
        let set = isochrones(vec![
            Isochrone {
                origin_id: "stn-b".to_owned(),
                time_band: 8,
                geometry: square(0.0, 0.0, 10.0),
            },
            Isochrone {
                origin_id: "stn-a".to_owned(),
                time_band: 5,
                geometry: square(0.0, 0.0, 10.0),
            },
        ]);
        let index = GeometryIndex::build(&set, &config()).unwrap();

        let areas = area_set(vec![area("A", 5.0, 5.0)]);
        let hits = index
            .intersecting_isochrones_for_points(&areas, None)
            .unwrap();

        let a_hits = &hits["A"];
        assert_eq!(a_hits.len(), 2);
        // Input order, not band order.
        assert_eq!(a_hits[0].origin_id, "stn-b");
        assert_eq!(a_hits[1].origin_id, "stn-a");
    }

    #[test]
    fn boundary_point_counts_as_covered() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 5,
            geometry: square(0.0, 0.0, 10.0),
        }]);
        let index = GeometryIndex::build(&set, &config()).unwrap();

        // Representative point exactly on the isochrone edge.
        let areas = area_set(vec![area("EDGE", 10.0, 5.0)]);
        let hits = index
            .intersecting_isochrones_for_points(&areas, None)
            .unwrap();
        assert!(hits.contains_key("EDGE"));
    }

    #[test]
    fn unmatched_areas_are_absent_from_the_map() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 5,
            geometry: square(0.0, 0.0, 10.0),
        }]);
        let index = GeometryIndex::build(&set, &config()).unwrap();

        let areas = area_set(vec![area("FAR", 100.0, 100.0)]);
        let hits = index
            .intersecting_isochrones_for_points(&areas, None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn polygon_query_catches_partial_overlap_the_point_misses() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 10,
            geometry: square(0.0, 0.0, 10.0),
        }]);
        let index = GeometryIndex::build(&set, &config()).unwrap();

        // Point at x=10.2 is outside; the unit square around it overlaps.
        let areas = area_set(vec![area("B", 10.2, 5.0)]);
        let point_hits = index
            .intersecting_isochrones_for_points(&areas, None)
            .unwrap();
        assert!(point_hits.is_empty());

        let polygon_hits = index
            .intersecting_isochrones_for_polygons(&areas, None)
            .unwrap();
        assert_eq!(polygon_hits["B"].len(), 1);
        assert_eq!(polygon_hits["B"][0].time_band, 10);
    }

    #[test]
    fn subset_restricts_the_query() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 5,
            geometry: square(0.0, 0.0, 100.0),
        }]);
        let index = GeometryIndex::build(&set, &config()).unwrap();

        let areas = area_set(vec![area("A", 5.0, 5.0), area("B", 6.0, 6.0)]);
        let only: BTreeSet<String> = [String::from("B")].into();
        let hits = index
            .intersecting_isochrones_for_points(&areas, Some(&only))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("B"));
    }

    #[test]
    fn rejects_undefined_and_mismatched_crs() {
        let mut set = isochrones(vec![]);
        set.crs = None;
        assert!(matches!(
            GeometryIndex::build(&set, &config()),
            Err(GeometryError::UndefinedCrs { .. })
        ));

        set.crs = Some("EPSG:4326".to_owned());
        assert!(matches!(
            GeometryIndex::build(&set, &config()),
            Err(GeometryError::CrsMismatch { .. })
        ));

        let index = GeometryIndex::build(&isochrones(vec![]), &config()).unwrap();
        assert_eq!(index.crs(), "EPSG:27700");
        let mut areas = area_set(vec![area("A", 0.0, 0.0)]);
        areas.crs = Some("EPSG:4326".to_owned());
        assert!(matches!(
            index.intersecting_isochrones_for_points(&areas, None),
            Err(GeometryError::CrsMismatch { .. })
        ));
    }

    #[test]
    fn rejects_band_outside_configured_set() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 7,
            geometry: square(0.0, 0.0, 1.0),
        }]);
        assert!(matches!(
            GeometryIndex::build(&set, &config()),
            Err(GeometryError::UnknownTimeBand { time_band: 7, .. })
        ));
    }

    // Self-intersecting bow-tie ring.
    fn bow_tie() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ]])
    }

    #[test]
    fn rejects_self_intersecting_isochrone_polygon() {
        let set = isochrones(vec![Isochrone {
            origin_id: "stn-a".to_owned(),
            time_band: 5,
            geometry: bow_tie(),
        }]);
        assert!(matches!(
            GeometryIndex::build(&set, &config()),
            Err(GeometryError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn pairing_rejects_self_intersecting_area_polygon() {
        let points = AreaPointLayer {
            crs: crs(),
            rows: vec![AreaPoint {
                area_id: "A".to_owned(),
                point: Point::new(1.0, 1.0),
            }],
        };
        let polygons = AreaPolygonLayer {
            crs: crs(),
            rows: vec![AreaPolygon {
                area_id: "A".to_owned(),
                polygon: bow_tie(),
            }],
        };
        assert!(matches!(
            pair_area_layers(&points, &polygons),
            Err(GeometryError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn pairs_layers_by_area_id() {
        let points = AreaPointLayer {
            crs: crs(),
            rows: vec![
                AreaPoint {
                    area_id: "A".to_owned(),
                    point: Point::new(1.0, 1.0),
                },
                AreaPoint {
                    area_id: "B".to_owned(),
                    point: Point::new(2.0, 2.0),
                },
            ],
        };
        let polygons = AreaPolygonLayer {
            crs: crs(),
            rows: vec![
                AreaPolygon {
                    area_id: "B".to_owned(),
                    polygon: square(1.5, 1.5, 1.0),
                },
                AreaPolygon {
                    area_id: "A".to_owned(),
                    polygon: square(0.5, 0.5, 1.0),
                },
            ],
        };

        let set = pair_area_layers(&points, &polygons).unwrap();
        assert_eq!(set.areas.len(), 2);
        // Point-layer order wins.
        assert_eq!(set.areas[0].area_id, "A");
        assert_eq!(set.areas[1].area_id, "B");
    }

    #[test]
    fn pairing_rejects_unpaired_and_duplicate_ids() {
        let point_row = AreaPoint {
            area_id: "A".to_owned(),
            point: Point::new(1.0, 1.0),
        };
        let polygon_row = AreaPolygon {
            area_id: "A".to_owned(),
            polygon: square(0.5, 0.5, 1.0),
        };

        let no_polygon = pair_area_layers(
            &AreaPointLayer {
                crs: crs(),
                rows: vec![point_row.clone()],
            },
            &AreaPolygonLayer {
                crs: crs(),
                rows: vec![],
            },
        );
        assert!(matches!(
            no_polygon,
            Err(GeometryError::MissingPolygon { .. })
        ));

        let no_point = pair_area_layers(
            &AreaPointLayer {
                crs: crs(),
                rows: vec![],
            },
            &AreaPolygonLayer {
                crs: crs(),
                rows: vec![polygon_row.clone()],
            },
        );
        assert!(matches!(no_point, Err(GeometryError::MissingPoint { .. })));

        let dup = pair_area_layers(
            &AreaPointLayer {
                crs: crs(),
                rows: vec![point_row.clone(), point_row],
            },
            &AreaPolygonLayer {
                crs: crs(),
                rows: vec![polygon_row],
            },
        );
        assert!(matches!(dup, Err(GeometryError::DuplicateAreaId { .. })));
    }

    #[test]
    fn pairing_rejects_crs_disagreement() {
        let result = pair_area_layers(
            &AreaPointLayer {
                crs: crs(),
                rows: vec![],
            },
            &AreaPolygonLayer {
                crs: Some("EPSG:4326".to_owned()),
                rows: vec![],
            },
        );
        assert!(matches!(result, Err(GeometryError::CrsMismatch { .. })));
    }
}
