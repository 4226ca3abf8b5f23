//! Fixed grids of tiles laid out linearly from a top-left origin
//!
//! Used for home-made tile sets where each file is named
//! `{prefix}{a}[-]{b}{ext}`, `a` and `b` being the zero-padded column and row
//! in either order.

use super::{TileId, TilePosition};
use crate::utils::{int_trunc, ohstring};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which grid axis comes first in a tile's file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOrder {
    /// `{prefix}{col}{row}`
    #[default]
    ColumnFirst,
    /// `{prefix}{row}{col}`
    RowFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericGrid {
    #[serde(default)]
    pub prefix: String,
    pub ext: String,
    /// Longitude of the left edge of tile (0, 0)
    pub left_lon: f64,
    /// Latitude of the top edge of tile (0, 0)
    pub top_lat: f64,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Pixels per degree of longitude
    pub xscale: f64,
    /// Pixels per degree of latitude
    pub yscale: f64,
    pub num_digits: usize,
    #[serde(default)]
    pub use_dash: bool,
    #[serde(default)]
    pub axis_order: AxisOrder,
}

impl GenericGrid {
    pub fn coords_to_tile(&self, lon: f64, lat: f64) -> Option<TilePosition> {
        if lon < self.left_lon || lat > self.top_lat {
            return None;
        }
        let x_pixels = (lon - self.left_lon) * self.xscale;
        let y_pixels = (self.top_lat - lat) * self.yscale;
        let col = int_trunc(x_pixels / f64::from(self.tile_width));
        let row = int_trunc(y_pixels / f64::from(self.tile_height));

        Some(TilePosition {
            tile: TileId::Grid { col, row },
            x_offset: (int_trunc(x_pixels) - col * i64::from(self.tile_width)).max(0),
            y_offset: (int_trunc(y_pixels) - row * i64::from(self.tile_height)).max(0),
        })
    }

    /// `(lon, lat)` of the tile's top-left corner
    pub fn tile_to_coords(&self, col: i64, row: i64) -> (f64, f64) {
        (
            self.left_lon + (col * i64::from(self.tile_width)) as f64 / self.xscale,
            self.top_lat - (row * i64::from(self.tile_height)) as f64 / self.yscale,
        )
    }

    pub fn file_name(&self, col: i64, row: i64) -> String {
        let (a, b) = match self.axis_order {
            AxisOrder::ColumnFirst => (col, row),
            AxisOrder::RowFirst => (row, col),
        };
        let dash = if self.use_dash { "-" } else { "" };
        format!(
            "{}{}{}{}{}",
            self.prefix,
            ohstring(a, self.num_digits),
            dash,
            ohstring(b, self.num_digits),
            self.ext
        )
    }

    /// Recover a tile from a file name written by [`Self::file_name`]
    pub fn parse_path(&self, path: &Path) -> Option<TileId> {
        let name = path.file_name()?.to_str()?;
        let numbers = name.strip_prefix(&self.prefix)?.strip_suffix(&self.ext)?;
        let (a, b) = if self.use_dash {
            numbers.split_once('-')?
        } else {
            let split = numbers.len().checked_sub(self.num_digits)?;
            if split == 0 || !numbers.is_char_boundary(split) {
                return None;
            }
            numbers.split_at(split)
        };
        let (a, b): (i64, i64) = (a.parse().ok()?, b.parse().ok()?);
        let (col, row) = match self.axis_order {
            AxisOrder::ColumnFirst => (a, b),
            AxisOrder::RowFirst => (b, a),
        };
        Some(TileId::Grid { col, row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(prefix: &str, num_digits: usize, use_dash: bool, axis_order: AxisOrder) -> GenericGrid {
        GenericGrid {
            prefix: prefix.to_string(),
            ext: ".jpg".to_string(),
            left_lon: -107.0,
            top_lat: 36.0,
            tile_width: 100,
            tile_height: 200,
            xscale: 1000.0,
            yscale: 2000.0,
            num_digits,
            use_dash,
            axis_order,
        }
    }

    #[test]
    fn test_coords_to_tile() {
        let g = grid("", 2, false, AxisOrder::ColumnFirst);
        // 0.35 degrees east is 350 pixels: column 3, 50 pixels in
        // 0.25 degrees south is 500 pixels: row 2, 100 pixels in
        let pos = g.coords_to_tile(-106.65, 35.75).unwrap();
        assert_eq!(pos.tile, TileId::Grid { col: 3, row: 2 });
        assert_eq!((pos.x_offset, pos.y_offset), (50, 100));

        assert!(g.coords_to_tile(-107.1, 35.0).is_none());
        assert!(g.coords_to_tile(-106.0, 36.1).is_none());
    }

    #[test]
    fn test_offset_agrees_with_column_on_rounding_edge() {
        let g = grid("", 2, false, AxisOrder::ColumnFirst);
        // Just short of 350 pixels, which the column already counts as 350
        let pos = g.coords_to_tile(-107.0 + 0.35 - 1e-12, 35.75).unwrap();
        assert_eq!(pos.tile, TileId::Grid { col: 3, row: 2 });
        assert_eq!(pos.x_offset, 50);
        assert!(g.coords_to_tile(-106.0, 36.1).is_none());
    }

    #[test]
    fn test_tile_to_coords() {
        let g = grid("", 2, false, AxisOrder::ColumnFirst);
        let (lon, lat) = g.tile_to_coords(3, 2);
        assert!((lon - -106.7).abs() < 1e-9);
        assert!((lat - 35.8).abs() < 1e-9);
    }

    #[test]
    fn test_all_naming_combinations() {
        let expected = [
            // (prefix, digits, dash, order, name of col 7 row 12)
            ("", 2, false, AxisOrder::ColumnFirst, "0712.jpg"),
            ("", 2, false, AxisOrder::RowFirst, "1207.jpg"),
            ("", 2, true, AxisOrder::ColumnFirst, "07-12.jpg"),
            ("", 2, true, AxisOrder::RowFirst, "12-07.jpg"),
            ("", 3, false, AxisOrder::ColumnFirst, "007012.jpg"),
            ("", 3, false, AxisOrder::RowFirst, "012007.jpg"),
            ("", 3, true, AxisOrder::ColumnFirst, "007-012.jpg"),
            ("", 3, true, AxisOrder::RowFirst, "012-007.jpg"),
            ("map", 2, false, AxisOrder::ColumnFirst, "map0712.jpg"),
            ("map", 2, false, AxisOrder::RowFirst, "map1207.jpg"),
            ("map", 2, true, AxisOrder::ColumnFirst, "map07-12.jpg"),
            ("map", 2, true, AxisOrder::RowFirst, "map12-07.jpg"),
            ("map", 3, false, AxisOrder::ColumnFirst, "map007012.jpg"),
            ("map", 3, false, AxisOrder::RowFirst, "map012007.jpg"),
            ("map", 3, true, AxisOrder::ColumnFirst, "map007-012.jpg"),
            ("map", 3, true, AxisOrder::RowFirst, "map012-007.jpg"),
        ];

        for (prefix, digits, dash, order, name) in expected {
            let g = grid(prefix, digits, dash, order);
            assert_eq!(g.file_name(7, 12), name);
            assert_eq!(
                g.parse_path(&Path::new("/maps").join(name)),
                Some(TileId::Grid { col: 7, row: 12 }),
                "parsing {name}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        let g = grid("map", 2, true, AxisOrder::ColumnFirst);
        assert_eq!(g.parse_path(Path::new("/maps/other07-12.jpg")), None);
        assert_eq!(g.parse_path(Path::new("/maps/map07-12.png")), None);
        assert_eq!(g.parse_path(Path::new("/maps/map0712.jpg")), None);
    }
}
