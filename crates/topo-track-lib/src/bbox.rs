//! Geographic bounding boxes with sentinel initial values

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

const MINLON_SENTINEL: f64 = 361.0;
const MAXLON_SENTINEL: f64 = -361.0;
const MINLAT_SENTINEL: f64 = 91.0;
const MAXLAT_SENTINEL: f64 = -91.0;

/// Axis-aligned box in longitude/latitude degrees
///
/// A fresh box holds impossible extrema, so "nothing added yet" can be
/// detected with [`BoundingBox::is_empty`] instead of a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minlon: f64,
    pub maxlon: f64,
    pub minlat: f64,
    pub maxlat: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox {
    pub const fn new() -> Self {
        Self {
            minlon: MINLON_SENTINEL,
            maxlon: MAXLON_SENTINEL,
            minlat: MINLAT_SENTINEL,
            maxlat: MAXLAT_SENTINEL,
        }
    }

    /// Build a box from two opposite corners given in any order
    pub fn from_corners(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> Self {
        Self {
            minlon: lon1.min(lon2),
            maxlon: lon1.max(lon2),
            minlat: lat1.min(lat2),
            maxlat: lat1.max(lat2),
        }
    }

    /// True iff every extremum still equals its sentinel
    pub fn is_empty(&self) -> bool {
        self.minlon == MINLON_SENTINEL
            && self.maxlon == MAXLON_SENTINEL
            && self.minlat == MINLAT_SENTINEL
            && self.maxlat == MAXLAT_SENTINEL
    }

    /// Extend the box to include a point
    #[inline]
    pub fn add_point(&mut self, lat: f64, lon: f64) {
        self.minlon = self.minlon.min(lon);
        self.maxlon = self.maxlon.max(lon);
        self.minlat = self.minlat.min(lat);
        self.maxlat = self.maxlat.max(lat);
    }

    /// Extend the box to include another box. Empty boxes are ignored.
    pub fn union(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.minlon = self.minlon.min(other.minlon);
        self.maxlon = self.maxlon.max(other.maxlon);
        self.minlat = self.minlat.min(other.minlat);
        self.maxlat = self.maxlat.max(other.maxlat);
    }

    /// Midpoint of the extrema as (lon, lat), or `None` for an empty box
    pub fn center(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        Some((
            (self.minlon + self.maxlon) / 2.0,
            (self.minlat + self.maxlat) / 2.0,
        ))
    }

    /// Inclusive containment test
    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lon >= self.minlon && lon <= self.maxlon && lat >= self.minlat && lat <= self.maxlat
    }

    pub fn width(&self) -> f64 {
        self.maxlon - self.minlon
    }

    pub fn height(&self) -> f64 {
        self.maxlat - self.minlat
    }

    /// (minlon, minlat, maxlon, maxlat)
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.minlon, self.minlat, self.maxlon, self.maxlat)
    }

    /// Convert to a `geo::Rect` with x = longitude and y = latitude
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(Rect::new(
            Coord {
                x: self.minlon,
                y: self.minlat,
            },
            Coord {
                x: self.maxlon,
                y: self.maxlat,
            },
        ))
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            minlon: rect.min().x,
            maxlon: rect.max().x,
            minlat: rect.min().y,
            maxlat: rect.max().y,
        }
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "BoundingBox(empty)");
        }
        write!(
            f,
            "BoundingBox(lon {:.6}..{:.6}, lat {:.6}..{:.6})",
            self.minlon, self.maxlon, self.minlat, self.maxlat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_box_is_empty() {
        let bbox = BoundingBox::new();
        assert!(bbox.is_empty());
        assert!(bbox.center().is_none());
        assert!(bbox.to_rect().is_none());
    }

    #[test]
    fn test_add_point_and_center() {
        let mut bbox = BoundingBox::new();
        bbox.add_point(35.0, -106.0);
        assert!(!bbox.is_empty());
        assert_eq!(bbox.center(), Some((-106.0, 35.0)));

        bbox.add_point(36.0, -107.0);
        assert_eq!(bbox.as_tuple(), (-107.0, 35.0, -106.0, 36.0));
        assert_eq!(bbox.center(), Some((-106.5, 35.5)));
    }

    #[test]
    fn test_incremental_matches_fold() {
        let points = [(35.1, -106.2), (35.9, -106.9), (34.7, -105.5), (35.0, -106.0)];
        let mut incremental = BoundingBox::new();
        for (i, &(lat, lon)) in points.iter().enumerate() {
            incremental.add_point(lat, lon);
            let folded = points[..=i].iter().fold(BoundingBox::new(), |mut b, &(la, lo)| {
                b.add_point(la, lo);
                b
            });
            assert_eq!(incremental, folded);
        }
    }

    #[test]
    fn test_union() {
        let mut a = BoundingBox::from_corners(-1.0, -1.0, 1.0, 1.0);
        let b = BoundingBox::from_corners(0.0, 0.0, 3.0, 2.0);
        a.union(&b);
        assert_eq!(a.as_tuple(), (-1.0, -1.0, 3.0, 2.0));

        // Unioning an empty box changes nothing
        let before = a;
        a.union(&BoundingBox::new());
        assert_eq!(a, before);

        let mut empty = BoundingBox::new();
        empty.union(&b);
        assert_eq!(empty, b);
    }

    #[test]
    fn test_from_corners_normalizes() {
        let bbox = BoundingBox::from_corners(5.0, 10.0, -5.0, -10.0);
        assert_eq!(bbox.as_tuple(), (-5.0, -10.0, 5.0, 10.0));
        assert!(bbox.contains(0.0, 0.0));
        assert!(bbox.contains(10.0, 5.0));
        assert!(!bbox.contains(10.1, 0.0));
    }

    #[test]
    fn test_rect_conversion() {
        let bbox = BoundingBox::from_corners(-106.5, 35.0, -106.0, 36.0);
        let rect = bbox.to_rect().unwrap();
        assert_eq!(rect.min().x, -106.5);
        assert_eq!(rect.max().y, 36.0);
        assert_eq!(BoundingBox::from(rect), bbox);
    }
}
