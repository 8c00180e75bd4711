//! Two-phase minimum-band coverage resolution.
//!
//! Phase A joins every area's representative point against the isochrone
//! index. Phase B re-joins only the areas Phase A missed, this time with
//! their full polygons, recovering areas whose point-on-surface fell just
//! outside coverage the true boundary still overlaps. Whatever remains is
//! uncovered within the maximum studied band. Each area lands in exactly
//! one of the three buckets.

use std::collections::BTreeSet;

use response_map_coverage_models::{AreaSet, CoverageRecord};
use response_map_spatial::{GeometryError, GeometryIndex, IsochroneHit};

use crate::progress::ProgressCallback;

/// The three disjoint outputs of coverage resolution.
///
/// The `area_id` sets of the three fields are pairwise disjoint and union
/// to the full input area set. All three preserve area input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Areas whose representative point intersected an isochrone.
    pub point_matched: Vec<CoverageRecord>,
    /// Areas recovered by the polygon fallback join.
    pub polygon_fallback: Vec<CoverageRecord>,
    /// Areas no isochrone reaches by either geometry test.
    pub uncovered: Vec<String>,
}

/// Resolves every area to its minimum covering band, or to the uncovered
/// bucket.
///
/// # Errors
///
/// Returns [`GeometryError`] if the area set's reference system does not
/// match the index.
pub fn resolve(
    index: &GeometryIndex,
    areas: &AreaSet,
    progress: &dyn ProgressCallback,
) -> Result<Resolution, GeometryError> {
    let total = areas.areas.len() as u64;
    progress.set_total(total);
    progress.set_message("Resolving coverage (point phase)".to_owned());

    let point_hits = index.intersecting_isochrones_for_points(areas, None)?;

    let mut point_matched = Vec::new();
    let mut unmatched_ids = BTreeSet::new();
    let mut unmatched_order = Vec::new();
    for area in &areas.areas {
        let record = point_hits
            .get(&area.area_id)
            .and_then(|hits| reduce_group(&area.area_id, hits));
        if let Some(record) = record {
            point_matched.push(record);
            progress.inc(1);
        } else {
            unmatched_ids.insert(area.area_id.clone());
            unmatched_order.push(area.area_id.clone());
        }
    }
    log::info!(
        "Point phase matched {} of {} areas",
        point_matched.len(),
        areas.areas.len()
    );

    progress.set_message("Resolving coverage (polygon fallback)".to_owned());
    let polygon_hits = index.intersecting_isochrones_for_polygons(areas, Some(&unmatched_ids))?;

    let mut polygon_fallback = Vec::new();
    let mut uncovered = Vec::new();
    for area_id in unmatched_order {
        let record = polygon_hits
            .get(&area_id)
            .and_then(|hits| reduce_group(&area_id, hits));
        if let Some(record) = record {
            polygon_fallback.push(record);
        } else {
            uncovered.push(area_id);
        }
        progress.inc(1);
    }
    log::info!(
        "Polygon fallback matched {} areas; {} uncovered",
        polygon_fallback.len(),
        uncovered.len()
    );
    progress.finish(format!("Resolved {total} areas"));

    Ok(Resolution {
        point_matched,
        polygon_fallback,
        uncovered,
    })
}

/// Single-pass grouped reduce: minimum band, then the ordered tie set at
/// that band.
///
/// Hits arrive in isochrone input order and that order is preserved in the
/// tie set. An origin whose bands are nested can hit the same area more
/// than once at the minimum band; it is recorded once (first occurrence),
/// which makes the global minimum equivalent to a per-origin minimum
/// followed by a minimum across origins.
fn reduce_group(area_id: &str, hits: &[IsochroneHit]) -> Option<CoverageRecord> {
    let (first, rest) = hits.split_first()?;
    let mut time_band = first.time_band;
    let mut tied = vec![first.origin_id.clone()];

    for hit in rest {
        if hit.time_band < time_band {
            time_band = hit.time_band;
            tied.clear();
            tied.push(hit.origin_id.clone());
        } else if hit.time_band == time_band && !tied.iter().any(|id| *id == hit.origin_id) {
            tied.push(hit.origin_id.clone());
        }
    }

    Some(CoverageRecord {
        area_id: area_id.to_owned(),
        time_band,
        covering_origin_ids: tied,
    })
}
