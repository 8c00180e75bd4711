//! Provider attribution for resolved coverage records.
//!
//! Joins each coverage record to provider metadata via its representative
//! origin (the first of the tie set). Missing metadata is a recoverable
//! data-quality gap and becomes a null field, never an error.

use std::collections::BTreeMap;

use response_map_coverage_models::{CoverageRecord, Origin};

/// A coverage record joined to provider metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedRecord {
    /// Area this record covers.
    pub area_id: String,
    /// Minimum covering band in minutes.
    pub time_band: u32,
    /// First tied origin; `None` only for an empty tie set.
    pub representative_origin_id: Option<String>,
    /// Crew type of the representative origin; `None` when there is no
    /// metadata row for it.
    pub provider_is_full_time: Option<bool>,
}

/// Builds the origin lookup table keyed by `origin_id`.
///
/// A repeated id keeps the first row and logs the rest.
#[must_use]
pub fn index_origins(origins: Vec<Origin>) -> BTreeMap<String, Origin> {
    let mut by_id = BTreeMap::new();
    for origin in origins {
        if by_id.contains_key(&origin.origin_id) {
            log::warn!(
                "Duplicate origin metadata row for '{}'; keeping the first",
                origin.origin_id
            );
        } else {
            by_id.insert(origin.origin_id.clone(), origin);
        }
    }
    by_id
}

/// Attributes every coverage record to its representative provider.
///
/// Pure and total: defined for every input, including empty tie sets and
/// origins with no metadata match.
#[must_use]
pub fn attribute(
    records: &[CoverageRecord],
    origins: &BTreeMap<String, Origin>,
) -> Vec<AttributedRecord> {
    records
        .iter()
        .map(|record| {
            let representative = record.representative_origin_id();
            let is_full_time = representative.and_then(|id| {
                let origin = origins.get(id);
                if origin.is_none() {
                    log::debug!("No provider metadata for origin '{id}'");
                }
                origin.map(|o| o.is_full_time)
            });
            AttributedRecord {
                area_id: record.area_id.clone(),
                time_band: record.time_band,
                representative_origin_id: representative.map(ToOwned::to_owned),
                provider_is_full_time: is_full_time,
            }
        })
        .collect()
}
