//! Assembly of the three phase outputs into one result table.
//!
//! Tags each record with its resolution phase and enforces the partition
//! invariant: every input area appears exactly once across the three
//! phases. A violation is a logic defect upstream and halts the run
//! before any output is produced.

use std::collections::BTreeSet;

use response_map_coverage_models::{ResolutionPhase, ResultRow};

use crate::AssemblyError;
use crate::attribute::AttributedRecord;

/// Merges the phase outputs into one row per area.
///
/// Row order is unspecified; consumers must key on `area_id`.
///
/// # Errors
///
/// Returns [`AssemblyError`] if an area id appears twice across the
/// phases, appears in a phase but not in `all_area_ids`, or is missing
/// from every phase.
pub fn assemble(
    point_matched: &[AttributedRecord],
    polygon_fallback: &[AttributedRecord],
    uncovered: &[String],
    all_area_ids: &BTreeSet<String>,
) -> Result<Vec<ResultRow>, AssemblyError> {
    let mut seen = BTreeSet::new();
    let mut rows = Vec::with_capacity(all_area_ids.len());

    for (records, phase) in [
        (point_matched, ResolutionPhase::PointMatched),
        (polygon_fallback, ResolutionPhase::PolygonFallback),
    ] {
        for record in records {
            claim(&record.area_id, &mut seen, all_area_ids)?;
            rows.push(ResultRow {
                area_id: record.area_id.clone(),
                resolution_phase: phase,
                time_band_upper_bound: Some(record.time_band),
                representative_origin_id: record.representative_origin_id.clone(),
                provider_is_full_time: record.provider_is_full_time,
            });
        }
    }

    for area_id in uncovered {
        claim(area_id, &mut seen, all_area_ids)?;
        rows.push(ResultRow {
            area_id: area_id.clone(),
            resolution_phase: ResolutionPhase::Uncovered,
            time_band_upper_bound: None,
            representative_origin_id: None,
            provider_is_full_time: None,
        });
    }

    if let Some(missing) = all_area_ids.difference(&seen).next() {
        return Err(AssemblyError::MissingArea {
            area_id: missing.clone(),
        });
    }

    log::info!(
        "Assembled {} rows ({} point-matched, {} polygon-fallback, {} uncovered)",
        rows.len(),
        point_matched.len(),
        polygon_fallback.len(),
        uncovered.len()
    );

    Ok(rows)
}

/// Marks an area id as produced, rejecting duplicates and ids outside the
/// input set.
fn claim(
    area_id: &str,
    seen: &mut BTreeSet<String>,
    all_area_ids: &BTreeSet<String>,
) -> Result<(), AssemblyError> {
    if !all_area_ids.contains(area_id) {
        return Err(AssemblyError::UnknownArea {
            area_id: area_id.to_owned(),
        });
    }
    if !seen.insert(area_id.to_owned()) {
        return Err(AssemblyError::DuplicateArea {
            area_id: area_id.to_owned(),
        });
    }
    Ok(())
}
