//! KML and KMZ reader
//!
//! Only `<Placemark>`s are read, styles and folders are ignored. A
//! `<LineString>` becomes a track segment and a `<Point>` becomes a
//! waypoint, both named after the placemark.

use super::xml::{attribute, decode_document, read_document, read_text};
use super::{ParsedSegment, ParsedTracks};
use crate::point::GeoPoint;
use crate::{Result, TrackError};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

/// Name given to placemarks that carry none
const UNNAMED: &str = "unnamed";

/// Preferred document inside a KMZ archive
const KMZ_DOCUMENT: &str = "doc.kml";

/// `lon,lat[,ele]` tuples separated by whitespace
static COORDINATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    const NUM: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";
    Regex::new(&format!(r"({NUM})\s*,\s*({NUM})(?:\s*,\s*({NUM}))?")).expect("valid regex")
});

/// Read a plain KML file
pub(crate) fn read_kml(path: &Path) -> Result<ParsedTracks> {
    let text = read_document(path)?;
    parse_kml_str(&text, path)
}

/// Read a KMZ archive, falling back to plain KML if it is not a zip file
pub(crate) fn read_kmz(path: &Path) -> Result<ParsedTracks> {
    let mut archive = match zip::ZipArchive::new(File::open(path)?) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::debug!("{} is not a zip archive ({}), reading as KML", path.display(), err);
            return read_kml(path);
        }
    };

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let document = if names.iter().any(|n| n == KMZ_DOCUMENT) {
        KMZ_DOCUMENT.to_string()
    } else {
        names
            .iter()
            .find(|n| n.to_ascii_lowercase().ends_with(".kml"))
            .cloned()
            .ok_or_else(|| TrackError::malformed(path, "no .kml document in archive"))?
    };
    if names.len() > 1 {
        tracing::warn!(
            "Ignoring files besides {} in {}: {}",
            document,
            path.display(),
            names.join(" ")
        );
    }

    let mut bytes = Vec::new();
    archive.by_name(&document)?.read_to_end(&mut bytes)?;
    let text = decode_document(&bytes).map_err(|reason| TrackError::malformed(path, reason))?;
    parse_kml_str(&text, path)
}

/// Parse KML text; `path` is only used in error messages
pub(crate) fn parse_kml_str(text: &str, path: &Path) -> Result<ParsedTracks> {
    parse_document(text).map_err(|err| match err {
        TrackError::Xml(e) => TrackError::malformed(path, e),
        TrackError::Malformed { reason, .. } => TrackError::malformed(path, reason),
        other => other,
    })
}

fn parse_document(text: &str) -> Result<ParsedTracks> {
    let mut reader = Reader::from_str(text);
    let mut parsed = ParsedTracks::default();
    let mut saw_kml = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"kml" => saw_kml = true,
                b"Placemark" => parse_placemark(&mut reader)?.add_to(&mut parsed),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"kml" => saw_kml = true,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_kml {
        return Err(TrackError::malformed("", "no <kml> element"));
    }
    Ok(parsed)
}

/// Geometry collected from one placemark
#[derive(Debug, Default)]
struct Placemark {
    name: Option<String>,
    trail_name: Option<String>,
    lines: Vec<Vec<GeoPoint>>,
    points: Vec<GeoPoint>,
}

impl Placemark {
    fn add_to(self, parsed: &mut ParsedTracks) {
        let name = self
            .name
            .or(self.trail_name)
            .unwrap_or_else(|| UNNAMED.to_string());

        for points in self.lines.into_iter().filter(|l| !l.is_empty()) {
            parsed.segments.push(ParsedSegment {
                label: name.clone(),
                attributes: None,
                points,
            });
        }
        for point in self.points {
            parsed.waypoints.push(point.with_name(name.clone()));
        }
    }
}

fn parse_placemark(reader: &mut Reader<&[u8]>) -> Result<Placemark> {
    let mut placemark = Placemark::default();
    // Local names of the open elements inside the placemark
    let mut stack: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => {
                    let text = read_text(reader, &e)?;
                    if placemark.name.is_none() {
                        placemark.name = non_empty(&text);
                    }
                }
                b"SimpleData" if stack.iter().any(|n| n == b"ExtendedData") => {
                    let is_trail_name = attribute(&e, b"name")?
                        .is_some_and(|n| n.starts_with("TrailNam"));
                    let text = read_text(reader, &e)?;
                    if is_trail_name && placemark.trail_name.is_none() {
                        placemark.trail_name = non_empty(&text);
                    }
                }
                b"coordinates" => {
                    let text = read_text(reader, &e)?;
                    let geometry = stack.iter().rev().find(|n| {
                        matches!(n.as_slice(), b"LineString" | b"Point" | b"LinearRing")
                    });
                    match geometry.map(Vec::as_slice) {
                        Some(b"LineString") => placemark.lines.push(parse_coordinates(&text)),
                        Some(b"Point") => placemark.points.extend(parse_coordinates(&text)),
                        _ => {}
                    }
                }
                name => stack.push(name.to_vec()),
            },
            Event::End(e) => {
                if e.local_name().as_ref() == b"Placemark" && stack.is_empty() {
                    break;
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(placemark)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse the text of a `<coordinates>` element into points
pub(crate) fn parse_coordinates(text: &str) -> Vec<GeoPoint> {
    COORDINATE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let lon = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let lat = caps.get(2)?.as_str().parse::<f64>().ok()?;
            let mut point = GeoPoint::new(lat, lon);
            point.ele = caps.get(3).and_then(|m| m.as_str().parse().ok());
            Some(point)
        })
        .collect()
}
