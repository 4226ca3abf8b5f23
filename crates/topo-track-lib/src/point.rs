//! Points, sequence items and polygons held by [`crate::TrackPoints`]

use crate::BoundingBox;
use geo::{BoundingRect, LineString, Polygon as GeoPolygon};
use std::collections::BTreeMap;

/// Free-form metadata such as `hdop`, or the properties of a GeoJSON feature
pub type Attributes = BTreeMap<String, String>;

/// A single track point or waypoint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters
    pub ele: Option<f64>,
    pub speed: Option<f64>,
    /// Present for waypoints, absent for track points
    pub name: Option<String>,
    /// ISO-8601 timestamp as read from the file
    pub timestamp: Option<String>,
    pub attrs: Option<Attributes>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Default::default()
        }
    }

    pub fn with_elevation(mut self, ele: f64) -> Self {
        self.ele = Some(ele);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs
            .get_or_insert_with(Attributes::new)
            .insert(key.into(), value.into());
        self
    }

    /// Look up an attribute by key
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(key).map(String::as_str)
    }

    /// Elevation in meters, 0 when the file gave none
    #[inline]
    pub fn elevation(&self) -> f64 {
        self.ele.unwrap_or(0.0)
    }

    pub fn is_waypoint(&self) -> bool {
        self.name.is_some()
    }
}

/// One entry of the flat track or waypoint sequence
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceItem {
    /// A new segment begins here, labelled by the string
    SegmentStart(String),
    /// Metadata for the segment whose start immediately precedes it
    Attributes(Attributes),
    Point(GeoPoint),
}

impl SequenceItem {
    #[inline]
    pub fn is_segment_start(&self) -> bool {
        matches!(self, SequenceItem::SegmentStart(_))
    }

    #[inline]
    pub fn is_attributes(&self) -> bool {
        matches!(self, SequenceItem::Attributes(_))
    }

    #[inline]
    pub fn as_point(&self) -> Option<&GeoPoint> {
        match self {
            SequenceItem::Point(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn as_point_mut(&mut self) -> Option<&mut GeoPoint> {
        match self {
            SequenceItem::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn segment_label(&self) -> Option<&str> {
        match self {
            SequenceItem::SegmentStart(label) => Some(label),
            _ => None,
        }
    }
}

/// A segment of the sequence, grouped by [`crate::TrackPoints::segments`]
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    /// Label of the segment start marker, `None` for points before any marker
    pub label: Option<&'a str>,
    pub attributes: Option<&'a Attributes>,
    /// Index of the segment start marker in the sequence
    pub start_index: Option<usize>,
    pub points: Vec<&'a GeoPoint>,
}

/// A named region read from GeoJSON, used as a colored overlay
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Category used for color grouping
    pub class: String,
    pub name: Option<String>,
    /// Exterior ring, x = longitude and y = latitude
    pub ring: GeoPolygon<f64>,
    pub bbox: BoundingBox,
}

impl Polygon {
    /// Build a polygon from a ring of `(lon, lat)` vertices
    pub fn new(class: impl Into<String>, name: Option<String>, ring: Vec<(f64, f64)>) -> Self {
        let ring = GeoPolygon::new(LineString::from(ring), vec![]);
        let bbox = ring
            .bounding_rect()
            .map(BoundingBox::from)
            .unwrap_or_default();
        Self {
            class: class.into(),
            name,
            ring,
            bbox,
        }
    }

    /// Vertices as `(lon, lat)` pairs
    pub fn vertices(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.ring.exterior().coords().map(|c| (c.x, c.y))
    }
}
