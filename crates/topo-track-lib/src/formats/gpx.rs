//! GPX reader and GPX 1.1 writer
//!
//! The reader walks the document with `quick_xml` so that a segment name
//! stored as a `<name>` child of `<trkseg>`, and speed extensions in any
//! namespace, survive. Tracks come first, then routes, each `<trkseg>` or
//! `<rte>` becoming one segment. Waypoints are kept separately.

use super::xml::{attribute, has_attribute, read_document, read_text, write_text_element};
use super::{ParsedSegment, ParsedTracks, base_name, filtered};
use crate::point::GeoPoint;
use crate::{BoundingBox, Result, TrackError, TrackPoints};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::io::Write;
use std::path::Path;

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const GPX_SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

/// Default name for a waypoint without one
const WAYPOINT_PLACEHOLDER: &str = "WP";

/// Read a GPX file
pub(crate) fn read_gpx(path: &Path) -> Result<ParsedTracks> {
    let text = read_document(path)?;
    parse_gpx_str(&text, path)
}

/// Parse GPX text; `path` is used for labels and error messages
pub(crate) fn parse_gpx_str(text: &str, path: &Path) -> Result<ParsedTracks> {
    parse_document(text, &base_name(path)).map_err(|err| match err {
        TrackError::Xml(e) => TrackError::malformed(path, e),
        TrackError::Malformed { reason, .. } => TrackError::malformed(path, reason),
        TrackError::SchemaLocation { .. } => TrackError::SchemaLocation {
            path: path.to_path_buf(),
        },
        other => other,
    })
}

fn parse_document(text: &str, file_name: &str) -> Result<ParsedTracks> {
    let mut reader = Reader::from_str(text);
    let mut parsed = ParsedTracks::default();
    let mut routes = Vec::new();
    let mut saw_gpx = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"gpx" => {
                    check_schema_location(&e)?;
                    saw_gpx = true;
                }
                b"trk" => parsed.segments.extend(parse_track(&mut reader, file_name)?),
                b"rte" => routes.extend(parse_route(&mut reader, file_name)?),
                b"wpt" => {
                    if let Some(wp) = parse_point(&mut reader, &e)? {
                        parsed.waypoints.push(named_waypoint(wp));
                    }
                }
                b"metadata" | b"extensions" => {
                    reader.read_to_end(e.name())?;
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"gpx" => {
                    check_schema_location(&e)?;
                    saw_gpx = true;
                }
                b"wpt" => {
                    if let Some(wp) = point_from_attributes(&e)? {
                        parsed.waypoints.push(named_waypoint(wp));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_gpx {
        return Err(TrackError::malformed(file_name, "no <gpx> element"));
    }

    parsed.segments.extend(routes);
    Ok(parsed)
}

/// Reject the common Garmin defect: `xsi:schemaLocation` without a
/// declaration of the `xsi` prefix
fn check_schema_location(gpx: &BytesStart<'_>) -> Result<()> {
    if has_attribute(gpx, b"xsi:schemaLocation") && !has_attribute(gpx, b"xmlns:xsi") {
        return Err(TrackError::SchemaLocation {
            path: Default::default(),
        });
    }
    Ok(())
}

/// Label a segment from the names available, most specific last
fn segment_label(track_name: Option<&str>, segment_name: Option<&str>, file_name: &str) -> String {
    match (track_name, segment_name) {
        (Some(track), Some(segment)) => format!("{track}:{segment}"),
        (None, Some(segment)) => segment.to_string(),
        (Some(track), None) => track.to_string(),
        (None, None) => file_name.to_string(),
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn named_waypoint(mut point: GeoPoint) -> GeoPoint {
    if point.name.is_none() {
        point.name = Some(WAYPOINT_PLACEHOLDER.to_string());
    }
    point
}

/// Parse a `<trk>`, returning one segment per `<trkseg>` that has points
fn parse_track(reader: &mut Reader<&[u8]>, file_name: &str) -> Result<Vec<ParsedSegment>> {
    let mut name = None;
    let mut segments = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => name = non_empty(read_text(reader, &e)?),
                b"trkseg" => segments.push(parse_segment(reader)?),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"trk" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(segments
        .into_iter()
        .filter(|(_, points)| !points.is_empty())
        .map(|(segment_name, points)| ParsedSegment {
            label: segment_label(name.as_deref(), segment_name.as_deref(), file_name),
            attributes: None,
            points,
        })
        .collect())
}

/// Parse a `<trkseg>` into its optional name and its points
fn parse_segment(reader: &mut Reader<&[u8]>) -> Result<(Option<String>, Vec<GeoPoint>)> {
    let mut name = None;
    let mut points = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => points.extend(parse_point(reader, &e)?),
                b"name" => name = non_empty(read_text(reader, &e)?),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) if e.local_name().as_ref() == b"trkpt" => {
                points.extend(point_from_attributes(&e)?)
            }
            Event::End(e) if e.local_name().as_ref() == b"trkseg" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((name, points))
}

/// Parse a `<rte>` into a segment labelled with the route name
fn parse_route(reader: &mut Reader<&[u8]>, file_name: &str) -> Result<Option<ParsedSegment>> {
    let mut name = None;
    let mut points = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"rtept" => points.extend(parse_point(reader, &e)?),
                b"name" => name = non_empty(read_text(reader, &e)?),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) if e.local_name().as_ref() == b"rtept" => {
                points.extend(point_from_attributes(&e)?)
            }
            Event::End(e) if e.local_name().as_ref() == b"rte" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    if points.is_empty() {
        return Ok(None);
    }
    Ok(Some(ParsedSegment {
        label: segment_label(name.as_deref(), None, file_name),
        attributes: None,
        points,
    }))
}

/// Build a point from its `lat`/`lon` attributes, or `None` if they are
/// missing or unparsable
fn point_from_attributes(start: &BytesStart<'_>) -> Result<Option<GeoPoint>> {
    let lat = attribute(start, b"lat")?.and_then(|v| v.trim().parse::<f64>().ok());
    let lon = attribute(start, b"lon")?.and_then(|v| v.trim().parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Some(GeoPoint::new(lat, lon))),
        _ => {
            tracing::warn!(
                "Skipping <{}> without a valid lat/lon",
                String::from_utf8_lossy(start.local_name().as_ref())
            );
            Ok(None)
        }
    }
}

/// Parse a `<trkpt>`, `<rtept>` or `<wpt>` and its children
fn parse_point(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Option<GeoPoint>> {
    let Some(mut point) = point_from_attributes(start)? else {
        reader.read_to_end(start.name())?;
        return Ok(None);
    };
    let end_name = start.name().0.to_vec();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => point.ele = read_text(reader, &e)?.trim().parse().ok(),
                b"time" => point.timestamp = non_empty(read_text(reader, &e)?),
                b"name" => point.name = non_empty(read_text(reader, &e)?),
                b"hdop" => {
                    if let Some(hdop) = non_empty(read_text(reader, &e)?) {
                        point = point.with_attr("hdop", hdop);
                    }
                }
                b"speed" => point.speed = read_text(reader, &e)?.trim().parse().ok(),
                b"extensions" => {
                    if let Some(speed) = find_speed(reader, &e)? {
                        point.speed = Some(speed);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Some(point))
}

/// Look for an element named `speed`, in any namespace and at any depth,
/// inside `<extensions>`
fn find_speed(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Option<f64>> {
    let end_name = start.name().0.to_vec();
    let mut speed = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"speed" => {
                speed = read_text(reader, &e)?.trim().parse().ok().or(speed);
            }
            Event::Start(_) => depth += 1,
            Event::End(e) if depth == 0 && e.name().0 == end_name.as_slice() => break,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(speed)
}

/// Write `tracks` as GPX 1.1, keeping only what lies inside `bbox` if given
///
/// Waypoints come first, then a single `<trk>` with one `<trkseg>` per
/// segment that still has points.
pub(crate) fn write_gpx<W: Write>(
    tracks: &TrackPoints,
    out: W,
    bbox: Option<&BoundingBox>,
) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let creator = format!("topo-track {}", env!("CARGO_PKG_VERSION"));
    let mut gpx = BytesStart::new("gpx");
    gpx.push_attribute(("version", "1.1"));
    gpx.push_attribute(("creator", creator.as_str()));
    gpx.push_attribute(("xmlns", GPX_NAMESPACE));
    gpx.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    gpx.push_attribute(("xsi:schemaLocation", GPX_SCHEMA_LOCATION));
    writer.write_event(Event::Start(gpx))?;

    for waypoint in tracks
        .waypoint_points()
        .filter(|p| bbox.is_none_or(|b| b.contains(p.lat, p.lon)))
    {
        write_point(&mut writer, "wpt", waypoint)?;
    }

    let segments: Vec<_> = tracks
        .segments()
        .into_iter()
        .map(|segment| (segment.label, filtered(&segment.points, bbox)))
        .filter(|(_, points)| !points.is_empty())
        .collect();

    if !segments.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("trk")))?;
        for (label, points) in segments {
            writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
            if let Some(label) = label {
                write_text_element(&mut writer, "name", label)?;
            }
            for point in points {
                write_point(&mut writer, "trkpt", point)?;
            }
            writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("trk")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn write_point<W: Write>(writer: &mut Writer<W>, tag: &str, point: &GeoPoint) -> Result<()> {
    let lat = point.lat.to_string();
    let lon = point.lon.to_string();
    let mut start = BytesStart::new(tag);
    start.push_attribute(("lat", lat.as_str()));
    start.push_attribute(("lon", lon.as_str()));
    writer.write_event(Event::Start(start))?;

    if let Some(ele) = point.ele {
        write_text_element(writer, "ele", &ele.to_string())?;
    }
    if let Some(time) = &point.timestamp {
        write_text_element(writer, "time", time)?;
    }
    if let Some(name) = &point.name {
        write_text_element(writer, "name", name)?;
    }
    if let Some(hdop) = point.attr("hdop") {
        write_text_element(writer, "hdop", hdop)?;
    }
    if let Some(speed) = point.speed {
        writer.write_event(Event::Start(BytesStart::new("extensions")))?;
        write_text_element(writer, "speed", &speed.to_string())?;
        writer.write_event(Event::End(BytesEnd::new("extensions")))?;
    }

    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
