//! In-memory model of tracks, waypoints and polygons
//!
//! Track points and waypoints are stored as flat sequences of
//! [`SequenceItem`]s: a segment start marker followed by an optional
//! attribute block and the segment's points. This mirrors the one-pass
//! readers that fill it. [`TrackPoints::segments`] groups the sequence back
//! into labelled segments for consumers.

use crate::point::{Attributes, GeoPoint, Polygon, Segment, SequenceItem};
use crate::{BoundingBox, Result, TrackError};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Label used when a segment has to be created without any name to go on
pub const DEFAULT_SEGMENT_NAME: &str = "Track start";

/// Timestamp format used for synthesized timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Seconds between consecutive synthesized timestamps
const BOGUS_TIMESTAMP_INTERVAL_SECS: i64 = 15;

/// Separator used when two waypoints at the same spot are merged
const WAYPOINT_NAME_SEPARATOR: &str = " / ";

static TRAILING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d+)$").expect("valid regex"));

/// How [`TrackPoints::add_point`] treats the point's timestamp
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Keep whatever the point carries, possibly nothing
    #[default]
    None,
    Explicit(String),
    /// Stamp with the current wall-clock time, e.g. for hand-drawn points
    Now,
}

/// Tracks, waypoints and polygons read from one or more files
#[derive(Debug, Clone)]
pub struct TrackPoints {
    points: Vec<SequenceItem>,
    waypoints: Vec<SequenceItem>,
    polygons: Vec<Polygon>,
    /// Track points and waypoints
    bbox: BoundingBox,
    /// Polygons only, which may cover a much wider area than the tracks
    outer_bbox: BoundingBox,
    /// Point index at which each source file begins
    srcfiles: BTreeMap<usize, PathBuf>,
    /// Single undo slot: (points, waypoints) before the last edit
    saved: Option<(Vec<SequenceItem>, Vec<SequenceItem>)>,
    /// Candidate GeoJSON property names for a polygon's class
    polygon_fields: Vec<String>,
    min_ele: Option<f64>,
    max_ele: Option<f64>,
    max_speed: Option<f64>,
}

impl Default for TrackPoints {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackPoints {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            waypoints: Vec::new(),
            polygons: Vec::new(),
            bbox: BoundingBox::new(),
            outer_bbox: BoundingBox::new(),
            srcfiles: BTreeMap::new(),
            saved: None,
            polygon_fields: vec!["class".to_string()],
            min_ele: None,
            max_ele: None,
            max_speed: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The track sequence, markers and points interleaved
    #[inline]
    pub fn points(&self) -> &[SequenceItem] {
        &self.points
    }

    /// The waypoint sequence
    #[inline]
    pub fn waypoints(&self) -> &[SequenceItem] {
        &self.waypoints
    }

    #[inline]
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Number of track points, not counting markers or attribute blocks
    pub fn num_points(&self) -> usize {
        self.points.iter().filter(|p| p.as_point().is_some()).count()
    }

    /// Number of waypoints, not counting filename markers
    pub fn num_waypoints(&self) -> usize {
        self.waypoints.iter().filter(|p| p.as_point().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.waypoints.is_empty() && self.polygons.is_empty()
    }

    /// Iterate over waypoints, skipping markers
    pub fn waypoint_points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.waypoints.iter().filter_map(SequenceItem::as_point)
    }

    /// (min, max) elevation over every point added so far
    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        Some((self.min_ele?, self.max_ele?))
    }

    pub fn max_speed(&self) -> Option<f64> {
        self.max_speed
    }

    /// Property names tried in order to find a polygon's class
    pub fn polygon_fields(&self) -> &[String] {
        &self.polygon_fields
    }

    pub fn set_polygon_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.polygon_fields = fields.into_iter().map(Into::into).collect();
    }

    /// Bounding box to show: tracks and waypoints if any, else polygons
    pub fn bounds(&self) -> Option<BoundingBox> {
        if !self.bbox.is_empty() {
            return Some(self.bbox);
        }
        if !self.outer_bbox.is_empty() {
            return Some(self.outer_bbox);
        }
        None
    }

    /// Source file that the point at `index` was read from
    pub fn filename_for_index(&self, index: usize) -> Option<&Path> {
        self.srcfiles
            .range(..=index)
            .next_back()
            .map(|(_, path)| path.as_path())
    }

    /// Attribute block of the segment starting at `segment_start`, if any
    pub fn attributes_for(&self, segment_start: usize) -> Option<&Attributes> {
        if !self.points.get(segment_start)?.is_segment_start() {
            return None;
        }
        match self.points.get(segment_start + 1)? {
            SequenceItem::Attributes(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Group the track sequence into labelled segments
    ///
    /// Points that precede any segment start form a leading segment with
    /// no label.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::new();
        let mut current: Option<Segment<'_>> = None;

        for (i, item) in self.points.iter().enumerate() {
            match item {
                SequenceItem::SegmentStart(label) => {
                    if let Some(seg) = current.take() {
                        segments.push(seg);
                    }
                    current = Some(Segment {
                        label: Some(label.as_str()),
                        attributes: None,
                        start_index: Some(i),
                        points: Vec::new(),
                    });
                }
                SequenceItem::Attributes(attrs) => {
                    let seg = current.get_or_insert_with(|| Segment {
                        label: None,
                        attributes: None,
                        start_index: None,
                        points: Vec::new(),
                    });
                    seg.attributes = Some(attrs);
                }
                SequenceItem::Point(point) => {
                    current
                        .get_or_insert_with(|| Segment {
                            label: None,
                            attributes: None,
                            start_index: None,
                            points: Vec::new(),
                        })
                        .points
                        .push(point);
                }
            }
        }
        if let Some(seg) = current {
            segments.push(seg);
        }
        segments
    }

    /// Index of the track point closest to the given coordinates
    ///
    /// Uses flat degree distance, which is fine for picking a point on screen.
    pub fn nearest_point(&self, lat: f64, lon: f64) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_point().map(|p| (i, p)))
            .map(|(i, p)| (i, (p.lat - lat).powi(2) + (p.lon - lon).powi(2)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    /// Add a track point, or a waypoint if the point has a name
    ///
    /// Waypoints at exactly the same coordinates as an existing one are
    /// merged into it, concatenating the names.
    ///
    /// # Returns
    /// The point as stored
    pub fn add_point(&mut self, mut point: GeoPoint, timestamp: TimestampMode) -> GeoPoint {
        match timestamp {
            TimestampMode::None => {}
            TimestampMode::Explicit(ts) => point.timestamp = Some(ts),
            TimestampMode::Now => {
                point.timestamp = Some(chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string())
            }
        }

        self.bbox.add_point(point.lat, point.lon);
        self.note_extents(&point);

        if point.name.is_none() {
            self.points.push(SequenceItem::Point(point.clone()));
            return point;
        }

        let existing = self
            .waypoints
            .iter_mut()
            .filter_map(SequenceItem::as_point_mut)
            .find(|wp| wp.lat == point.lat && wp.lon == point.lon);

        if let Some(wp) = existing {
            let new_name = point.name.unwrap_or_default();
            match wp.name.as_mut() {
                Some(name) if name.split(WAYPOINT_NAME_SEPARATOR).any(|n| n == new_name) => {}
                Some(name) => {
                    name.push_str(WAYPOINT_NAME_SEPARATOR);
                    name.push_str(&new_name);
                }
                None => wp.name = Some(new_name),
            }
            return wp.clone();
        }

        self.waypoints.push(SequenceItem::Point(point.clone()));
        point
    }

    /// Begin a new track segment
    pub fn start_segment(&mut self, label: impl Into<String>) {
        self.points.push(SequenceItem::SegmentStart(label.into()));
    }

    /// Attach attributes to the segment just started
    pub fn add_attributes(&mut self, attrs: Attributes) {
        self.points.push(SequenceItem::Attributes(attrs));
    }

    /// Add a marker to the waypoint sequence, e.g. the name of a source file
    pub fn add_waypoint_marker(&mut self, label: impl Into<String>) {
        self.waypoints.push(SequenceItem::SegmentStart(label.into()));
    }

    pub fn add_polygon(&mut self, polygon: Polygon) {
        self.outer_bbox.union(&polygon.bbox);
        self.polygons.push(polygon);
    }

    /// Remember that points from `path` start at the current end of the track
    pub fn record_source(&mut self, path: &Path) {
        self.srcfiles.insert(self.points.len(), path.to_path_buf());
    }

    /// Reset to an empty model, keeping the polygon field configuration
    pub fn clear(&mut self) {
        let fields = std::mem::take(&mut self.polygon_fields);
        *self = Self::new();
        self.polygon_fields = fields;
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Start a new segment right before `index`
    ///
    /// The new segment is named after the one being split, with a trailing
    /// number incremented (`Day 2` becomes `Day 3`) or ` 2` appended.
    pub fn split_at(&mut self, index: usize) -> Result<()> {
        self.check_index(index, self.points.len() + 1)?;
        self.save_for_undo();

        let prior = self.points[..index]
            .iter()
            .rev()
            .find_map(SequenceItem::segment_label)
            .unwrap_or(DEFAULT_SEGMENT_NAME);
        let name = next_segment_name(prior);
        tracing::debug!("Splitting track at {index} into new segment '{name}'");

        self.points.insert(index, SequenceItem::SegmentStart(name));
        Ok(())
    }

    /// Delete the points of a segment that come before `index`
    ///
    /// The segment start marker is kept. If there is no marker before
    /// `index`, a synthetic one is created.
    pub fn remove_before(&mut self, index: usize) -> Result<()> {
        self.check_index(index, self.points.len())?;
        self.save_for_undo();

        let last_start = self.points[..=index]
            .iter()
            .rposition(SequenceItem::is_segment_start);

        let mut kept = Vec::with_capacity(self.points.len());
        match last_start {
            Some(start) => {
                let resume = index.max(start + 1);
                kept.extend_from_slice(&self.points[..=start]);
                kept.extend_from_slice(&self.points[resume..]);
            }
            None => {
                tracing::warn!("No segment start before point {index}; adding one");
                kept.push(SequenceItem::SegmentStart(DEFAULT_SEGMENT_NAME.to_string()));
                kept.extend_from_slice(&self.points[index..]);
            }
        }
        self.points = kept;
        self.recompute_extents();
        Ok(())
    }

    /// Delete the points of a segment that come after `index`
    ///
    /// The point at `index` and any following segments are kept.
    pub fn remove_after(&mut self, index: usize) -> Result<()> {
        self.check_index(index, self.points.len())?;
        self.save_for_undo();

        let next_start = self.points[index + 1..]
            .iter()
            .position(SequenceItem::is_segment_start)
            .map(|offset| index + 1 + offset);

        match next_start {
            Some(next) => {
                self.points.drain(index + 1..next);
            }
            None => self.points.truncate(index + 1),
        }
        self.recompute_extents();
        Ok(())
    }

    /// Delete the track point at `index`
    ///
    /// Segment markers and attribute blocks can't be deleted this way.
    pub fn remove_point(&mut self, index: usize) -> Result<GeoPoint> {
        let len = self.points.len();
        self.check_index(index, len)?;
        let Some(point) = self.points[index].as_point().cloned() else {
            return Err(TrackError::InvalidIndex { index, len });
        };
        self.save_for_undo();
        self.points.remove(index);
        self.recompute_extents();
        Ok(point)
    }

    /// Delete the waypoint at `index` in the waypoint sequence
    pub fn remove_waypoint(&mut self, index: usize) -> Result<GeoPoint> {
        let len = self.waypoints.len();
        self.check_index(index, len)?;
        let Some(point) = self.waypoints[index].as_point().cloned() else {
            return Err(TrackError::InvalidIndex { index, len });
        };
        self.save_for_undo();
        self.waypoints.remove(index);
        self.recompute_extents();
        Ok(point)
    }

    /// Rename the segment whose start marker is at `index`
    pub fn rename_segment(&mut self, index: usize, label: impl Into<String>) -> Result<()> {
        self.check_index(index, self.points.len())?;
        if !self.points[index].is_segment_start() {
            return Err(TrackError::InvalidIndex {
                index,
                len: self.points.len(),
            });
        }
        self.save_for_undo();
        self.points[index] = SequenceItem::SegmentStart(label.into());
        Ok(())
    }

    /// Rename the waypoint at `index` in the waypoint sequence
    pub fn rename_waypoint(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let len = self.waypoints.len();
        self.check_index(index, len)?;
        if self.waypoints[index].as_point().is_none() {
            return Err(TrackError::InvalidIndex { index, len });
        }
        self.save_for_undo();
        if let Some(wp) = self.waypoints[index].as_point_mut() {
            wp.name = Some(name.into());
        }
        Ok(())
    }

    /// Restore the state before the last edit. Only one level is kept.
    pub fn undo(&mut self) {
        if let Some((points, waypoints)) = self.saved.take() {
            self.points = points;
            self.waypoints = waypoints;
            self.recompute_extents();
        }
    }

    pub fn can_undo(&self) -> bool {
        self.saved.is_some()
    }

    /// Give every track point lacking a timestamp a made-up one
    ///
    /// Timestamps start at the current time and advance 15 seconds per point,
    /// since some GPX consumers refuse tracks without times.
    pub fn add_bogus_timestamps(&mut self) {
        let mut t = chrono::Utc::now();
        let interval = chrono::Duration::seconds(BOGUS_TIMESTAMP_INTERVAL_SECS);
        for point in self.points.iter_mut().filter_map(SequenceItem::as_point_mut) {
            if point.timestamp.is_none() {
                point.timestamp = Some(t.format(TIMESTAMP_FORMAT).to_string());
                t += interval;
            }
        }
    }

    fn save_for_undo(&mut self) {
        self.saved = Some((self.points.clone(), self.waypoints.clone()));
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index >= len {
            return Err(TrackError::InvalidIndex { index, len });
        }
        Ok(())
    }

    fn note_extents(&mut self, point: &GeoPoint) {
        extend_range(&mut self.min_ele, &mut self.max_ele, point.ele);
        extend_max(&mut self.max_speed, point.speed);
    }

    /// Rebuild the running box and ranges after points were removed
    fn recompute_extents(&mut self) {
        let mut bbox = BoundingBox::new();
        let (mut min_ele, mut max_ele, mut max_speed) = (None, None, None);

        let all = self
            .points
            .iter()
            .chain(self.waypoints.iter())
            .filter_map(SequenceItem::as_point);
        for point in all {
            bbox.add_point(point.lat, point.lon);
            extend_range(&mut min_ele, &mut max_ele, point.ele);
            extend_max(&mut max_speed, point.speed);
        }

        self.bbox = bbox;
        self.min_ele = min_ele;
        self.max_ele = max_ele;
        self.max_speed = max_speed;
    }
}

fn extend_range(min: &mut Option<f64>, max: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *min = Some(min.map_or(v, |m| m.min(v)));
        *max = Some(max.map_or(v, |m| m.max(v)));
    }
}

fn extend_max(max: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *max = Some(max.map_or(v, |m| m.max(v)));
    }
}

impl std::fmt::Display for TrackPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<TrackPoints: {} points, {} waypoints, {} polygons>",
            self.num_points(),
            self.num_waypoints(),
            self.polygons.len()
        )
    }
}

/// Name for a segment split off from `prior`
fn next_segment_name(prior: &str) -> String {
    if let Some(caps) = TRAILING_NUMBER_RE.captures(prior) {
        if let Ok(n) = caps[2].parse::<u64>() {
            return format!("{}{}", &caps[1], n + 1);
        }
    }
    format!("{prior} 2")
}
