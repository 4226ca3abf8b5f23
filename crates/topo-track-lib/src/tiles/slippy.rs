//! Web Mercator "slippy map" tiles, `{zoom}/{x}/{y}{ext}`

use super::{TileId, TilePosition};
use crate::utils::MAX_LATITUDE;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// Slippy tile naming as used by OpenStreetMap-style tile servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippyTiles {
    /// File extension including the dot
    pub ext: String,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl Default for SlippyTiles {
    fn default() -> Self {
        Self {
            ext: ".png".to_string(),
            tile_width: 256,
            tile_height: 256,
        }
    }
}

impl SlippyTiles {
    /// Fractional tile coordinates of `(lon, lat)` at `zoom`
    pub fn fractional_tile(lon: f64, lat: f64, zoom: u32) -> (f64, f64) {
        let n = 2f64.powi(zoom as i32);
        let lat_rad = lat.to_radians();
        let x = (lon + 180.0) / 360.0 * n;
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
        (x, y)
    }

    pub fn coords_to_tile(&self, lon: f64, lat: f64, zoom: u32) -> Option<TilePosition> {
        if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        let n = 1i64 << zoom;
        let (xf, yf) = Self::fractional_tile(lon, lat, zoom);
        let x = (xf.floor() as i64).clamp(0, n - 1);
        let y = (yf.floor() as i64).clamp(0, n - 1);

        Some(TilePosition {
            tile: TileId::Slippy { zoom, x, y },
            x_offset: ((xf - x as f64) * f64::from(self.tile_width)) as i64,
            y_offset: ((yf - y as f64) * f64::from(self.tile_height)) as i64,
        })
    }

    /// `(lon, lat)` of the top-left corner of tile `(x, y)`
    pub fn tile_to_coords(x: i64, y: i64, zoom: u32) -> (f64, f64) {
        let n = 2f64.powi(zoom as i32);
        let lon = x as f64 / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees();
        (lon, lat)
    }

    /// Pixels per degree `(x, y)` at `zoom` around `latitude`
    ///
    /// The y scale varies with latitude, so it is measured over the tile
    /// row containing the latitude.
    pub fn scales(&self, zoom: u32, latitude: f64) -> (f64, f64) {
        let n = 2f64.powi(zoom as i32);
        let xscale = f64::from(self.tile_width) * n / 360.0;

        let lat = latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let (_, yf) = Self::fractional_tile(0.0, lat, zoom);
        let y = yf.floor() as i64;
        let (_, top) = Self::tile_to_coords(0, y, zoom);
        let (_, above) = Self::tile_to_coords(0, y - 1, zoom);
        let yscale = f64::from(self.tile_height) / (above - top);
        (xscale, yscale)
    }

    /// Wrap `x` around the antimeridian; rows past the poles do not exist
    pub(crate) fn wrap(zoom: u32, x: i64, y: i64) -> Option<TileId> {
        let n = 1i64 << zoom;
        if !(0..n).contains(&y) {
            return None;
        }
        Some(TileId::Slippy {
            zoom,
            x: x.rem_euclid(n),
            y,
        })
    }

    pub fn relative_path(&self, zoom: u32, x: i64, y: i64) -> String {
        format!("{zoom}/{x}/{y}{}", self.ext)
    }

    pub fn parse_path(path: &Path) -> Option<TileId> {
        let y = path.file_stem()?.to_str()?.parse().ok()?;
        let x_dir = path.parent()?;
        let x = x_dir.file_name()?.to_str()?.parse().ok()?;
        let zoom = x_dir.parent()?.file_name()?.to_str()?.parse().ok()?;
        Some(TileId::Slippy { zoom, x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_tile() {
        // Los Alamos at zoom 12
        let slippy = SlippyTiles::default();
        let pos = slippy.coords_to_tile(-106.3, 35.88, 12).unwrap();
        assert_eq!(
            pos.tile,
            TileId::Slippy {
                zoom: 12,
                x: 838,
                y: 1610
            }
        );
        assert!((0..256).contains(&pos.x_offset));
        assert!((0..256).contains(&pos.y_offset));
    }

    #[test]
    fn test_round_trip_within_one_tile() {
        let slippy = SlippyTiles::default();
        for &(lon, lat) in &[(-106.3, 35.88), (2.35, 48.85), (151.2, -33.87), (0.0, 0.0)] {
            for zoom in [0, 5, 12, 19] {
                let pos = slippy.coords_to_tile(lon, lat, zoom).unwrap();
                let TileId::Slippy { x, y, .. } = pos.tile else {
                    panic!("not a slippy tile");
                };
                let (tlon, tlat) = SlippyTiles::tile_to_coords(x, y, zoom);
                let (blon, blat) = SlippyTiles::tile_to_coords(x + 1, y + 1, zoom);
                assert!(tlon <= lon && lon <= blon, "lon {lon} not in [{tlon}, {blon}]");
                assert!(blat <= lat && lat <= tlat, "lat {lat} not in [{blat}, {tlat}]");
                assert!(lon - tlon <= 360.0 / 2f64.powi(zoom as i32) + 1e-9);
            }
        }
    }

    #[test]
    fn test_offsets_track_fraction() {
        let slippy = SlippyTiles::default();
        let (x0, _) = SlippyTiles::tile_to_coords(100, 0, 8);
        let (x1, _) = SlippyTiles::tile_to_coords(101, 0, 8);
        let pos = slippy.coords_to_tile(x0 + (x1 - x0) * 0.25, 10.0, 8).unwrap();
        assert_eq!(pos.x_offset, 64);
    }

    #[test]
    fn test_out_of_range() {
        let slippy = SlippyTiles::default();
        assert!(slippy.coords_to_tile(0.0, 89.0, 3).is_none());
        assert!(slippy.coords_to_tile(181.0, 0.0, 3).is_none());
        // The right edge belongs to the last column
        let edge = slippy.coords_to_tile(180.0, 0.0, 3).unwrap();
        assert!(matches!(edge.tile, TileId::Slippy { x: 7, .. }));
    }

    #[test]
    fn test_scales_vary_with_latitude() {
        let slippy = SlippyTiles::default();
        let (x_eq, y_eq) = slippy.scales(12, 0.0);
        let (x_north, y_north) = slippy.scales(12, 60.0);
        assert_relative_eq!(x_eq, 256.0 * 4096.0 / 360.0);
        assert_relative_eq!(x_eq, x_north);
        // Tiles cover fewer degrees of latitude further north
        assert!(y_north > y_eq * 1.5);
    }

    #[test]
    fn test_wrap_and_poles() {
        assert_eq!(
            SlippyTiles::wrap(2, -1, 1),
            Some(TileId::Slippy { zoom: 2, x: 3, y: 1 })
        );
        assert_eq!(
            SlippyTiles::wrap(2, 4, 3),
            Some(TileId::Slippy { zoom: 2, x: 0, y: 3 })
        );
        assert_eq!(SlippyTiles::wrap(2, 0, 4), None);
        assert_eq!(SlippyTiles::wrap(2, 0, -1), None);
    }

    #[test]
    fn test_paths() {
        let slippy = SlippyTiles::default();
        assert_eq!(slippy.relative_path(12, 838, 1612), "12/838/1612.png");
        assert_eq!(
            SlippyTiles::parse_path(Path::new("/home/me/Maps/osm/12/838/1612.png")),
            Some(TileId::Slippy {
                zoom: 12,
                x: 838,
                y: 1612
            })
        );
        assert_eq!(SlippyTiles::parse_path(Path::new("/maps/a/b/c.png")), None);
    }
}
