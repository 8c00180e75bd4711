//! Pipeline orchestration: load, index, resolve, attribute, assemble,
//! write.
//!
//! Each stage logs what it produced; the resolution stage drives an
//! `indicatif` progress bar through the coverage crate's progress trait.

use std::collections::BTreeSet;
use std::error::Error;
use std::time::Instant;

use response_map_cli_utils::{IndicatifProgress, MultiProgress};
use response_map_coverage::assemble::assemble;
use response_map_coverage::attribute::{attribute, index_origins};
use response_map_coverage::resolver;
use response_map_coverage_models::RunConfig;
use response_map_spatial::{GeometryIndex, pair_area_layers};

use crate::Args;

/// Runs the full batch pipeline.
pub fn run(args: &Args, config: &RunConfig, multi: &MultiProgress) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    let started = Instant::now();

    let origins = index_origins(response_map_io::read_origins(&args.origins)?);
    let isochrones = response_map_io::read_isochrones(&args.isochrones)?;
    let points = response_map_io::read_area_points(&args.area_points)?;
    let polygons = response_map_io::read_area_polygons(&args.area_polygons)?;

    let areas = pair_area_layers(&points, &polygons)?;
    let index = GeometryIndex::build(&isochrones, config)?;

    let progress = IndicatifProgress::areas_bar(multi, "Resolving coverage");
    let resolution = resolver::resolve(&index, &areas, progress.as_ref())?;

    for record in resolution
        .point_matched
        .iter()
        .chain(&resolution.polygon_fallback)
    {
        if record.match_count() > 1 {
            log::debug!(
                "Area {} tied at {} min between {}",
                record.area_id,
                record.time_band,
                record.joined_origin_ids(&config.tie_delimiter)
            );
        }
    }

    let point_matched = attribute(&resolution.point_matched, &origins);
    let polygon_fallback = attribute(&resolution.polygon_fallback, &origins);

    let all_area_ids: BTreeSet<String> = areas
        .areas
        .iter()
        .map(|area| area.area_id.clone())
        .collect();
    let rows = assemble(
        &point_matched,
        &polygon_fallback,
        &resolution.uncovered,
        &all_area_ids,
    )?;

    response_map_io::write_results(&args.out, &rows)?;

    log::info!(
        "Coverage run finished in {:.1?}: {} point-matched, {} polygon-fallback, {} uncovered",
        started.elapsed(),
        point_matched.len(),
        polygon_fallback.len(),
        resolution.uncovered.len()
    );

    Ok(())
}
