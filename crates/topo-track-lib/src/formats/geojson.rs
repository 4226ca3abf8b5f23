//! GeoJSON reader and writer
//!
//! Only FeatureCollections are accepted. Points become waypoints, line
//! strings become segments and polygons become [`Polygon`] overlays. Positions
//! are `[lon, lat]` or `[lon, lat, ele]`.

use super::{ParsedSegment, ParsedTracks, filtered};
use crate::point::{Attributes, GeoPoint, Polygon};
use crate::{BoundingBox, Result, TrackError, TrackPoints};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use std::io::Write;
use std::path::Path;

/// Name of a segment whose feature has none
const UNNAMED: &str = "unnamed";

/// Name of a point feature with neither `name` nor `description`
const BLANK_NAME: &str = " ";

/// Read a GeoJSON file, taking polygon classes from the first of
/// `polygon_fields` present in each feature
pub(crate) fn read_geojson(path: &Path, polygon_fields: &[String]) -> Result<ParsedTracks> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|e| TrackError::malformed(path, e))?;
    parse_geojson_str(text.trim_start_matches('\u{feff}'), path, polygon_fields)
}

pub(crate) fn parse_geojson_str(
    text: &str,
    path: &Path,
    polygon_fields: &[String],
) -> Result<ParsedTracks> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| TrackError::malformed(path, e))?;

    if value.get("type").and_then(serde_json::Value::as_str) != Some("FeatureCollection") {
        return Err(TrackError::malformed(path, "not a FeatureCollection"));
    }
    if value.get("features").is_none() {
        return Err(TrackError::malformed(path, "no features"));
    }

    let collection = match GeoJson::from_json_value(value) {
        Ok(GeoJson::FeatureCollection(collection)) => collection,
        Ok(_) => return Err(TrackError::malformed(path, "not a FeatureCollection")),
        Err(e) => return Err(TrackError::malformed(path, e)),
    };

    let mut parsed = ParsedTracks::default();
    for feature in collection.features {
        add_feature(&mut parsed, feature, polygon_fields);
    }
    Ok(parsed)
}

fn add_feature(parsed: &mut ParsedTracks, feature: Feature, polygon_fields: &[String]) {
    let Some(geometry) = feature.geometry else {
        return;
    };
    let properties = feature.properties.unwrap_or_default();

    match geometry.value {
        Value::Point(position) => {
            if let Some(point) = to_point(&position) {
                parsed.waypoints.push(point.with_name(point_name(&properties)));
            }
        }
        Value::MultiPoint(positions) => {
            let name = point_name(&properties);
            parsed
                .waypoints
                .extend(positions.iter().filter_map(|p| to_point(p)).map(|p| p.with_name(&name)));
        }
        Value::LineString(line) => {
            parsed.segments.push(to_segment(&properties, &line));
        }
        Value::MultiLineString(lines) => {
            parsed
                .segments
                .extend(lines.iter().map(|line| to_segment(&properties, line)));
        }
        Value::Polygon(rings) => {
            parsed.polygons.extend(to_polygon(&properties, &rings, polygon_fields));
        }
        Value::MultiPolygon(polygons) => {
            parsed.polygons.extend(
                polygons
                    .iter()
                    .filter_map(|rings| to_polygon(&properties, rings, polygon_fields)),
            );
        }
        Value::GeometryCollection(_) => {
            tracing::warn!("Skipping GeometryCollection feature");
        }
    }
}

fn to_point(position: &[f64]) -> Option<GeoPoint> {
    match position {
        [lon, lat] => Some(GeoPoint::new(*lat, *lon)),
        [lon, lat, ele, ..] => Some(GeoPoint::new(*lat, *lon).with_elevation(*ele)),
        _ => {
            tracing::warn!("Skipping position with {} values", position.len());
            None
        }
    }
}

/// Scalar property value as a string; null and nested values give `None`
fn scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_property(properties: &JsonObject, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(scalar)
        .filter(|s| !s.is_empty())
}

fn point_name(properties: &JsonObject) -> String {
    non_empty_property(properties, "name")
        .or_else(|| non_empty_property(properties, "description"))
        .unwrap_or_else(|| BLANK_NAME.to_string())
}

fn to_segment(properties: &JsonObject, line: &[Vec<f64>]) -> ParsedSegment {
    let name_key = properties.keys().find(|key| {
        matches!(key.to_ascii_lowercase().as_str(), "name" | "trailname")
            && non_empty_property(properties, key).is_some()
    });
    let label = name_key
        .and_then(|key| non_empty_property(properties, key))
        .or_else(|| non_empty_property(properties, "description"))
        .unwrap_or_else(|| UNNAMED.to_string());

    let attributes: Attributes = properties
        .iter()
        .filter(|(key, _)| Some(*key) != name_key)
        .filter_map(|(key, value)| Some((key.clone(), scalar(value)?)))
        .collect();

    ParsedSegment {
        label,
        attributes: (!attributes.is_empty()).then_some(attributes),
        points: line.iter().filter_map(|p| to_point(p)).collect(),
    }
}

fn to_polygon(
    properties: &JsonObject,
    rings: &[Vec<Vec<f64>>],
    polygon_fields: &[String],
) -> Option<Polygon> {
    let exterior = rings.first()?;
    let class = polygon_fields
        .iter()
        .find_map(|field| properties.get(field).and_then(scalar))
        .unwrap_or_default();
    let name = non_empty_property(properties, "name")
        .or_else(|| non_empty_property(properties, "description"));
    let ring: Vec<(f64, f64)> = exterior
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| (p[0], p[1]))
        .collect();
    if ring.is_empty() {
        return None;
    }
    Some(Polygon::new(class, name, ring))
}

fn position(point: &GeoPoint) -> Vec<f64> {
    match point.ele {
        Some(ele) => vec![point.lon, point.lat, ele],
        None => vec![point.lon, point.lat],
    }
}

fn feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Write `tracks` as a FeatureCollection, keeping only what lies inside
/// `bbox` if given
pub(crate) fn write_geojson<W: Write>(
    tracks: &TrackPoints,
    out: W,
    bbox: Option<&BoundingBox>,
) -> Result<()> {
    let mut features = Vec::new();

    for waypoint in tracks
        .waypoint_points()
        .filter(|p| bbox.is_none_or(|b| b.contains(p.lat, p.lon)))
    {
        let mut properties = JsonObject::new();
        if let Some(name) = &waypoint.name {
            properties.insert("name".into(), name.clone().into());
        }
        features.push(feature(Value::Point(position(waypoint)), properties));
    }

    for segment in tracks.segments() {
        let points = filtered(&segment.points, bbox);
        if points.is_empty() {
            continue;
        }
        let mut properties = JsonObject::new();
        for (key, value) in segment.attributes.into_iter().flatten() {
            properties.insert(key.clone(), value.clone().into());
        }
        if let Some(label) = segment.label {
            properties.insert("name".into(), label.into());
        }
        let line = points.iter().map(|p| position(p)).collect();
        features.push(feature(Value::LineString(line), properties));
    }

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    serde_json::to_writer_pretty(out, &collection)?;
    Ok(())
}
