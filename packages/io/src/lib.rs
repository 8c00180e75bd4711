#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flat-file table I/O for the coverage pipeline.
//!
//! Reads the four input tables (origin metadata CSV, isochrone GeoJSON,
//! area point and polygon GeoJSON layers) and writes the per-area result
//! CSV. Format concerns stop here: the rest of the pipeline sees only the
//! typed tables from the models crate.
//!
//! GeoJSON layers may declare their reference system through the legacy
//! `crs` foreign member; when present it is carried on the loaded layer,
//! otherwise the layer's CRS is `None` and the spatial index will reject
//! it.

use std::fs;
use std::io::Write;
use std::path::Path;

use geo::{MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};
use response_map_coverage_models::{
    AreaPoint, AreaPointLayer, AreaPolygon, AreaPolygonLayer, Isochrone, IsochroneSet, Origin,
    ResultRow,
};
use thiserror::Error;

/// Errors reading or writing the pipeline's flat-file tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// GeoJSON parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Input did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Reads the origin metadata table (`origin_id,is_full_time` CSV).
///
/// # Errors
///
/// Returns [`TableError`] if the file cannot be read or a row fails to
/// deserialize.
pub fn read_origins(path: &Path) -> Result<Vec<Origin>, TableError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let mut origins = Vec::new();
    for row in reader.deserialize() {
        let origin: Origin = row?;
        origins.push(origin);
    }
    log::info!("Read {} origin metadata rows from {path:?}", origins.len());
    Ok(origins)
}

/// Reads the isochrone table from a GeoJSON `FeatureCollection`.
///
/// Each feature needs `origin_id` (string) and `time_band` (number)
/// properties and a Polygon or MultiPolygon geometry.
///
/// # Errors
///
/// Returns [`TableError`] on unreadable files, non-collection GeoJSON, or
/// features missing the required properties or geometry.
pub fn read_isochrones(path: &Path) -> Result<IsochroneSet, TableError> {
    let set = parse_isochrones(&fs::read_to_string(path)?)?;
    log::info!("Read {} isochrones from {path:?}", set.records.len());
    Ok(set)
}

/// Reads the area representative-point layer from GeoJSON.
///
/// Each feature needs an `area_id` (string) property and a Point geometry.
///
/// # Errors
///
/// Returns [`TableError`] on unreadable files, non-collection GeoJSON, or
/// features missing the required property or geometry.
pub fn read_area_points(path: &Path) -> Result<AreaPointLayer, TableError> {
    let layer = parse_area_points(&fs::read_to_string(path)?)?;
    log::info!("Read {} area points from {path:?}", layer.rows.len());
    Ok(layer)
}

/// Reads the area polygon layer from GeoJSON.
///
/// Each feature needs an `area_id` (string) property and a Polygon or
/// MultiPolygon geometry.
///
/// # Errors
///
/// Returns [`TableError`] on unreadable files, non-collection GeoJSON, or
/// features missing the required property or geometry.
pub fn read_area_polygons(path: &Path) -> Result<AreaPolygonLayer, TableError> {
    let layer = parse_area_polygons(&fs::read_to_string(path)?)?;
    log::info!("Read {} area polygons from {path:?}", layer.rows.len());
    Ok(layer)
}

/// Writes the result table as UTF-8 CSV with a header row.
///
/// Column order is stable: `area_id`, `resolution_phase`,
/// `time_band_upper_bound`, `representative_origin_id`,
/// `provider_is_full_time`. Null fields are written empty.
///
/// # Errors
///
/// Returns [`TableError`] if the file cannot be created or a row fails to
/// serialize.
pub fn write_results(path: &Path, rows: &[ResultRow]) -> Result<(), TableError> {
    let file = fs::File::create(path)?;
    write_results_to(file, rows)?;
    log::info!("Wrote {} result rows to {path:?}", rows.len());
    Ok(())
}

/// Writes result rows to any writer; see [`write_results`].
///
/// # Errors
///
/// Returns [`TableError`] if a row fails to serialize or the writer fails.
pub fn write_results_to<W: Write>(writer: W, rows: &[ResultRow]) -> Result<(), TableError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn parse_isochrones(raw: &str) -> Result<IsochroneSet, TableError> {
    let collection = parse_collection(raw)?;
    let crs = collection_crs(&collection);
    let mut records = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let origin_id = string_property(feature, "origin_id", "isochrone")?;
        let time_band = band_property(feature, "time_band", &origin_id)?;
        let geometry = feature_multipolygon(feature, &format!("isochrone '{origin_id}'"))?;
        records.push(Isochrone {
            origin_id,
            time_band,
            geometry,
        });
    }
    Ok(IsochroneSet { crs, records })
}

fn parse_area_points(raw: &str) -> Result<AreaPointLayer, TableError> {
    let collection = parse_collection(raw)?;
    let crs = collection_crs(&collection);
    let mut rows = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let area_id = string_property(feature, "area_id", "area point")?;
        let point = feature_point(feature, &format!("area point '{area_id}'"))?;
        rows.push(AreaPoint { area_id, point });
    }
    Ok(AreaPointLayer { crs, rows })
}

fn parse_area_polygons(raw: &str) -> Result<AreaPolygonLayer, TableError> {
    let collection = parse_collection(raw)?;
    let crs = collection_crs(&collection);
    let mut rows = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let area_id = string_property(feature, "area_id", "area polygon")?;
        let polygon = feature_multipolygon(feature, &format!("area polygon '{area_id}'"))?;
        rows.push(AreaPolygon { area_id, polygon });
    }
    Ok(AreaPolygonLayer { crs, rows })
}

fn parse_collection(raw: &str) -> Result<FeatureCollection, TableError> {
    match raw.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        other => Err(TableError::Parse {
            message: format!("Expected a FeatureCollection, got {}", geojson_kind(&other)),
        }),
    }
}

const fn geojson_kind(value: &GeoJson) -> &'static str {
    match value {
        GeoJson::Geometry(_) => "a bare geometry",
        GeoJson::Feature(_) => "a single feature",
        GeoJson::FeatureCollection(_) => "a feature collection",
    }
}

/// Extracts the reference system from the legacy `crs` foreign member
/// (`{"crs": {"properties": {"name": "EPSG:27700"}}}`).
fn collection_crs(collection: &FeatureCollection) -> Option<String> {
    collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(JsonValue::as_str)
        .map(ToOwned::to_owned)
}

fn string_property(feature: &Feature, key: &str, label: &str) -> Result<String, TableError> {
    feature
        .properties
        .as_ref()
        .and_then(|properties| properties.get(key))
        .and_then(JsonValue::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| TableError::Parse {
            message: format!("{label} feature is missing string property '{key}'"),
        })
}

/// Reads a time band encoded as either an integer or an integral float
/// (`5` or `5.0`; exporters differ).
fn band_property(feature: &Feature, key: &str, origin_id: &str) -> Result<u32, TableError> {
    feature
        .properties
        .as_ref()
        .and_then(|properties| properties.get(key))
        .and_then(JsonValue::as_f64)
        .and_then(integral_band)
        .ok_or_else(|| TableError::Parse {
            message: format!("Isochrone for '{origin_id}' is missing whole-number '{key}'"),
        })
}

fn integral_band(band: f64) -> Option<u32> {
    if band.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&band) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = band as u32;
        Some(value)
    } else {
        None
    }
}

/// Converts a feature's geometry into a [`MultiPolygon`], accepting both
/// Polygon and MultiPolygon geometry types.
fn feature_multipolygon(feature: &Feature, label: &str) -> Result<MultiPolygon<f64>, TableError> {
    let geometry = feature.geometry.as_ref().ok_or_else(|| TableError::Parse {
        message: format!("{label} has no geometry"),
    })?;
    let converted: geo::Geometry<f64> = geometry.clone().try_into()?;
    match converted {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        _ => Err(TableError::Parse {
            message: format!("{label} is not a Polygon or MultiPolygon"),
        }),
    }
}

fn feature_point(feature: &Feature, label: &str) -> Result<Point<f64>, TableError> {
    let geometry = feature.geometry.as_ref().ok_or_else(|| TableError::Parse {
        message: format!("{label} has no geometry"),
    })?;
    let converted: geo::Geometry<f64> = geometry.clone().try_into()?;
    match converted {
        geo::Geometry::Point(point) => Ok(point),
        _ => Err(TableError::Parse {
            message: format!("{label} is not a Point"),
        }),
    }
}
