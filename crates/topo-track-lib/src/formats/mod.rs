//! Track file readers and writers
//!
//! Readers parse a whole file into [`ParsedTracks`] first and only then
//! commit it to the [`TrackPoints`] model, so a file that fails halfway
//! through leaves the model untouched.
//!
//! # Example
//!
//! ```no_run
//! use topo_track_lib::{TrackPoints, read_track_file};
//!
//! let mut tracks = TrackPoints::new();
//! if let Some(bbox) = read_track_file(&mut tracks, "hike.gpx")? {
//!     println!("read {} points inside {}", tracks.num_points(), bbox);
//! }
//! tracks.save_geojson("hike.geojson", None)?;
//! # Ok::<(), topo_track_lib::TrackError>(())
//! ```

pub mod geojson;
pub mod gpx;
pub mod kml;
mod xml;

use crate::point::{Attributes, GeoPoint, Polygon};
use crate::{BoundingBox, Result, TimestampMode, TrackError, TrackPoints};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Track file formats, recognised by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    Gpx,
    Kml,
    Kmz,
    GeoJson,
}

impl TrackFormat {
    /// Guess the format from the lower-cased file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gpx" => Some(TrackFormat::Gpx),
            "kml" => Some(TrackFormat::Kml),
            "kmz" => Some(TrackFormat::Kmz),
            "json" | "geojson" => Some(TrackFormat::GeoJson),
            _ => None,
        }
    }

    /// Whether [`TrackPoints`] can be written in this format
    pub fn is_writable(self) -> bool {
        matches!(self, TrackFormat::Gpx | TrackFormat::GeoJson)
    }
}

/// One segment as read from a file
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedSegment {
    pub label: String,
    pub attributes: Option<Attributes>,
    pub points: Vec<GeoPoint>,
}

/// Everything read from one file, not yet added to a model
#[derive(Debug, Default)]
pub(crate) struct ParsedTracks {
    pub segments: Vec<ParsedSegment>,
    /// Named points
    pub waypoints: Vec<GeoPoint>,
    pub polygons: Vec<Polygon>,
}

impl ParsedTracks {
    /// Add the parsed file to `tracks`
    ///
    /// # Returns
    /// The bounding box of everything the file contributed, or `None` if it
    /// contributed nothing
    fn commit(self, tracks: &mut TrackPoints, path: &Path) -> Option<BoundingBox> {
        let mut bbox = BoundingBox::new();

        if !self.segments.is_empty() {
            tracks.record_source(path);
        }
        for segment in self.segments {
            tracks.start_segment(segment.label);
            if let Some(attrs) = segment.attributes {
                tracks.add_attributes(attrs);
            }
            for point in segment.points {
                bbox.add_point(point.lat, point.lon);
                tracks.add_point(point, TimestampMode::None);
            }
        }

        if !self.waypoints.is_empty() {
            tracks.add_waypoint_marker(base_name(path));
            for waypoint in self.waypoints {
                bbox.add_point(waypoint.lat, waypoint.lon);
                tracks.add_point(waypoint, TimestampMode::None);
            }
        }

        for polygon in self.polygons {
            bbox.union(&polygon.bbox);
            tracks.add_polygon(polygon);
        }

        (!bbox.is_empty()).then_some(bbox)
    }
}

/// File name without directories, used as a fallback label
pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a track file into `tracks`, choosing the reader by extension
///
/// # Returns
/// * `Ok(Some(bbox))` - the extent of what the file added
/// * `Ok(None)` - the file is valid but holds no tracks, waypoints or polygons
/// * `Err(TrackError::NotFound)` - nothing exists at `path`
/// * `Err(..)` - anything else means the file is not a usable track file
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn read_track_file(
    tracks: &mut TrackPoints,
    path: impl AsRef<Path>,
) -> Result<Option<BoundingBox>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TrackError::NotFound(path.to_path_buf()));
    }
    let format =
        TrackFormat::from_path(path).ok_or_else(|| TrackError::UnknownFormat(path.to_path_buf()))?;

    tracing::debug!("Reading {} as {:?}", path.display(), format);
    let parsed = match format {
        TrackFormat::Gpx => gpx::read_gpx(path)?,
        TrackFormat::Kml => kml::read_kml(path)?,
        TrackFormat::Kmz => kml::read_kmz(path)?,
        TrackFormat::GeoJson => geojson::read_geojson(path, tracks.polygon_fields())?,
    };

    let (segments, waypoints, polygons) = (
        parsed.segments.len(),
        parsed.waypoints.len(),
        parsed.polygons.len(),
    );
    let bbox = parsed.commit(tracks, path);
    tracing::info!(
        "Read {}: {} segments, {} waypoints, {} polygons",
        path.display(),
        segments,
        waypoints,
        polygons
    );
    Ok(bbox)
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackPoints {
    /// Read a track file, see [`read_track_file`]
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<Option<BoundingBox>> {
        read_track_file(self, path)
    }

    /// Write everything, or only what lies inside `bbox`, as GPX 1.1
    pub fn save_gpx(&self, path: impl AsRef<Path>, bbox: Option<&BoundingBox>) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        gpx::write_gpx(self, &mut out, bbox)?;
        out.flush()?;
        tracing::info!("Saved GPX to {}", path.display());
        Ok(())
    }

    /// Write everything, or only what lies inside `bbox`, as a GeoJSON
    /// FeatureCollection
    pub fn save_geojson(&self, path: impl AsRef<Path>, bbox: Option<&BoundingBox>) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        geojson::write_geojson(self, &mut out, bbox)?;
        out.flush()?;
        tracing::info!("Saved GeoJSON to {}", path.display());
        Ok(())
    }

    /// Save as GPX only the points inside the box spanned by two corners,
    /// given in any order
    pub fn save_gpx_in_region(
        &self,
        start_lon: f64,
        start_lat: f64,
        end_lon: f64,
        end_lat: f64,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let bbox = BoundingBox::from_corners(start_lon, start_lat, end_lon, end_lat);
        self.save_gpx(path, Some(&bbox))
    }

    /// Save in the format implied by the extension of `path`
    pub fn save_file(&self, path: impl AsRef<Path>, bbox: Option<&BoundingBox>) -> Result<()> {
        let path = path.as_ref();
        match TrackFormat::from_path(path) {
            Some(TrackFormat::Gpx) => self.save_gpx(path, bbox),
            Some(TrackFormat::GeoJson) => self.save_geojson(path, bbox),
            _ => Err(TrackError::UnknownFormat(path.to_path_buf())),
        }
    }
}

/// Points of a segment that pass the optional box filter
pub(crate) fn filtered<'a>(
    points: &[&'a GeoPoint],
    bbox: Option<&BoundingBox>,
) -> Vec<&'a GeoPoint> {
    points
        .iter()
        .copied()
        .filter(|p| bbox.is_none_or(|b| b.contains(p.lat, p.lon)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TrackFormat::from_path(Path::new("a/b/Hike.GPX")),
            Some(TrackFormat::Gpx)
        );
        assert_eq!(
            TrackFormat::from_path(Path::new("trails.geojson")),
            Some(TrackFormat::GeoJson)
        );
        assert_eq!(
            TrackFormat::from_path(Path::new("trails.json")),
            Some(TrackFormat::GeoJson)
        );
        assert_eq!(
            TrackFormat::from_path(Path::new("doc.kmz")),
            Some(TrackFormat::Kmz)
        );
        assert_eq!(TrackFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(TrackFormat::from_path(Path::new("noext")), None);
        assert!(TrackFormat::Gpx.is_writable());
        assert!(!TrackFormat::Kml.is_writable());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut tracks = TrackPoints::new();
        let err = read_track_file(&mut tracks, "/nonexistent/dir/track.gpx").unwrap_err();
        assert!(err.is_not_found());
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.txt");
        std::fs::write(&path, "hello").unwrap();

        let mut tracks = TrackPoints::new();
        let err = read_track_file(&mut tracks, &path).unwrap_err();
        assert!(matches!(err, TrackError::UnknownFormat(_)));
    }

    #[test]
    fn test_commit_records_source_and_marker() {
        let parsed = ParsedTracks {
            segments: vec![ParsedSegment {
                label: "Morning".into(),
                attributes: None,
                points: vec![GeoPoint::new(35.0, -106.0), GeoPoint::new(35.1, -106.1)],
            }],
            waypoints: vec![GeoPoint::new(35.2, -106.2).with_name("Spring")],
            polygons: Vec::new(),
        };
        let mut tracks = TrackPoints::new();
        let path = PathBuf::from("/tmp/walk.gpx");
        let bbox = parsed.commit(&mut tracks, &path).unwrap();

        assert_eq!(bbox.as_tuple(), (-106.2, 35.0, -106.0, 35.2));
        assert_eq!(tracks.num_points(), 2);
        assert_eq!(tracks.waypoints()[0].segment_label(), Some("walk.gpx"));
        assert_eq!(tracks.filename_for_index(2), Some(path.as_path()));
    }

    #[test]
    fn test_commit_empty_returns_none() {
        let mut tracks = TrackPoints::new();
        let bbox = ParsedTracks::default().commit(&mut tracks, Path::new("empty.gpx"));
        assert!(bbox.is_none());
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_save_file_rejects_kml() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = TrackPoints::new();
        let err = tracks.save_file(dir.path().join("out.kml"), None).unwrap_err();
        assert!(matches!(err, TrackError::UnknownFormat(_)));
    }
}
