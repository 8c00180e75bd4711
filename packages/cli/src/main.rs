#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch runner for per-area response coverage.
//!
//! One-shot pipeline over static inputs: load the four tables, build the
//! isochrone index, resolve every area to its minimum covering band (or
//! the uncovered bucket), attribute providers, and write the result CSV.
//!
//! Uses `indicatif-log-bridge` (via [`response_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod pipeline;

use std::path::PathBuf;

use clap::Parser;
use response_map_coverage_models::RunConfig;

/// Compute minimum response travel times for small population areas.
#[derive(Debug, Parser)]
#[command(name = "response-map", version)]
struct Args {
    /// Origin metadata CSV (`origin_id,is_full_time`).
    #[arg(long)]
    origins: PathBuf,

    /// Isochrone GeoJSON FeatureCollection (`origin_id`, `time_band`).
    #[arg(long)]
    isochrones: PathBuf,

    /// Area representative-point GeoJSON layer (`area_id`).
    #[arg(long)]
    area_points: PathBuf,

    /// Area polygon GeoJSON layer (`area_id`).
    #[arg(long)]
    area_polygons: PathBuf,

    /// Output CSV path.
    #[arg(long)]
    out: PathBuf,

    /// Coordinate reference system every spatial input must share.
    #[arg(long, default_value = "EPSG:27700")]
    crs: String,

    /// Ascending time-band upper bounds, in minutes.
    #[arg(long, value_delimiter = ',', default_value = "3,5,8,10,12,15,30")]
    time_bands: Vec<u32>,

    /// Delimiter used when tie lists are rendered in logs.
    #[arg(long, default_value = " | ")]
    tie_delimiter: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = response_map_cli_utils::init_logger();
    let args = Args::parse();

    let config = RunConfig {
        crs: args.crs.clone(),
        time_bands: args.time_bands.clone(),
        tie_delimiter: args.tie_delimiter.clone(),
    };

    pipeline::run(&args, &config, &multi)
}
