//! Legacy Topo! quadrangle tiles
//!
//! Each directory `q{lat}{lon}{letter}{digit}` holds one 7.5 minute
//! quadrangle: `lat` and `lon` are whole degrees (longitude written west
//! positive), the letter `a`..`h` counts 7.5 minute steps north and the digit
//! `1`..`8` counts them west. Inside, maplets are named
//! `{prefix}{x:02}{y:02}{ext}` with `x` growing east and `y` growing south,
//! both starting at 1.
//!
//! Only the north-western quarter of the globe (latitude >= 0, longitude
//! <= 0) can be addressed.

use super::{TileId, TilePosition};
use crate::utils::int_trunc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Quadrangles per degree along each axis
const QUADS_PER_DEGREE: i64 = 8;

/// Minutes of arc covered by one quadrangle directory
const QUAD_MINUTES: f64 = 7.5;

/// Map series, named after the minutes of arc a printed sheet covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Series {
    SevenAndHalf,
    Fifteen,
}

impl Series {
    pub fn minutes(self) -> f64 {
        match self {
            Series::SevenAndHalf => 7.5,
            Series::Fifteen => 15.0,
        }
    }

    /// Maplets per quadrangle along each axis
    pub fn grid(self) -> i64 {
        match self {
            Series::SevenAndHalf => 10,
            Series::Fifteen => 5,
        }
    }

    /// Minutes of arc covered by one maplet
    fn maplet_minutes(self) -> f64 {
        QUAD_MINUTES / self.grid() as f64
    }
}

impl TryFrom<f64> for Series {
    type Error = String;

    fn try_from(minutes: f64) -> Result<Self, Self::Error> {
        if minutes == 7.5 {
            Ok(Series::SevenAndHalf)
        } else if minutes == 15.0 {
            Ok(Series::Fifteen)
        } else {
            Err(format!("series must be 7.5 or 15, not {minutes}"))
        }
    }
}

impl From<Series> for f64 {
    fn from(series: Series) -> Self {
        series.minutes()
    }
}

/// One maplet of a quadrangle collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadrantTile {
    pub lat_deg: i32,
    /// Degrees west
    pub lon_deg: i32,
    /// 0 to 7, written `a` to `h`
    pub letter: u8,
    /// 1 to 8
    pub digit: u8,
    pub x: u8,
    pub y: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantTiles {
    pub series: Series,
    pub ser7_prefix: String,
    /// Collections without a 15 minute series cannot zoom
    #[serde(default)]
    pub ser15_prefix: Option<String>,
    pub ext: String,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl QuadrantTiles {
    fn grid(&self) -> i64 {
        self.series.grid()
    }

    fn prefix(&self) -> &str {
        match self.series {
            Series::SevenAndHalf => &self.ser7_prefix,
            Series::Fifteen => self.ser15_prefix.as_deref().unwrap_or(&self.ser7_prefix),
        }
    }

    /// Pixels per degree `(x, y)` for the current series
    pub fn scales(&self) -> (f64, f64) {
        let per_degree = 600.0 / self.series.minutes();
        (
            f64::from(self.tile_width) * per_degree,
            f64::from(self.tile_height) * per_degree,
        )
    }

    /// Switch series: zooming out selects 15 minute maplets, zooming in 7.5
    ///
    /// # Returns
    /// `true` if the series changed
    pub fn zoom(&mut self, amount: i32) -> bool {
        let next = match (self.series, amount.signum()) {
            (Series::SevenAndHalf, -1) if self.ser15_prefix.is_some() => Series::Fifteen,
            (Series::Fifteen, 1) => Series::SevenAndHalf,
            _ => return false,
        };
        tracing::debug!("Switching quadrangle series to {} minutes", next.minutes());
        self.series = next;
        true
    }

    pub fn coords_to_tile(&self, lon: f64, lat: f64) -> Option<TilePosition> {
        if lat < 0.0 || lon > 0.0 || lat >= 90.0 || lon <= -180.0 {
            return None;
        }
        let grid = self.grid();
        let lat_deg = int_trunc(lat);
        let lon_deg = int_trunc(-lon);
        let lat_min = (lat - lat_deg as f64) * 60.0;
        let lon_min = (-lon - lon_deg as f64) * 60.0;

        let letter = int_trunc(lat_min / QUAD_MINUTES).clamp(0, QUADS_PER_DEGREE - 1);
        let digit_index = int_trunc(lon_min / QUAD_MINUTES).clamp(0, QUADS_PER_DEGREE - 1);
        let lat_offset = int_trunc((lat_min - letter as f64 * QUAD_MINUTES) * 10.0
            / self.series.minutes())
        .clamp(0, grid - 1);
        let lon_offset = int_trunc((lon_min - digit_index as f64 * QUAD_MINUTES) * 10.0
            / self.series.minutes())
        .clamp(0, grid - 1);

        let tile = QuadrantTile {
            lat_deg: lat_deg as i32,
            lon_deg: lon_deg as i32,
            letter: letter as u8,
            digit: (digit_index + 1) as u8,
            x: (grid - lon_offset) as u8,
            y: (grid - lat_offset) as u8,
        };

        let (west, north) = self.tile_to_coords(&tile);
        let (xscale, yscale) = self.scales();
        let x_offset = ((lon - west) * xscale) as i64;
        let y_offset = ((north - lat) * yscale) as i64;
        Some(TilePosition {
            tile: TileId::Quadrant(tile),
            x_offset: x_offset.clamp(0, i64::from(self.tile_width) - 1),
            y_offset: y_offset.clamp(0, i64::from(self.tile_height) - 1),
        })
    }

    /// `(lon, lat)` of the maplet's top-left corner
    pub fn tile_to_coords(&self, tile: &QuadrantTile) -> (f64, f64) {
        let grid = self.grid();
        let step = self.series.maplet_minutes();
        let west_minutes = f64::from(tile.digit - 1) * QUAD_MINUTES
            + (grid - i64::from(tile.x) + 1) as f64 * step;
        let north_minutes =
            f64::from(tile.letter) * QUAD_MINUTES + (grid - i64::from(tile.y) + 1) as f64 * step;
        (
            -(f64::from(tile.lon_deg) + west_minutes / 60.0),
            f64::from(tile.lat_deg) + north_minutes / 60.0,
        )
    }

    /// Maplet column and row counted east and south from (0 N, 0 W)
    ///
    /// Both are zero or negative inside the addressable quarter.
    pub fn global_index(&self, tile: &QuadrantTile) -> (i64, i64) {
        let grid = self.grid();
        let per_degree = QUADS_PER_DEGREE * grid;
        let west = i64::from(tile.lon_deg) * per_degree
            + i64::from(tile.digit - 1) * grid
            + (grid - i64::from(tile.x));
        let north = i64::from(tile.lat_deg) * per_degree
            + i64::from(tile.letter) * grid
            + (grid - i64::from(tile.y));
        (-west, -north)
    }

    /// Inverse of [`Self::global_index`], carrying overflowing maplet numbers
    /// into the quadrangle letter and digit and from there into the degrees
    pub fn from_global_index(&self, col: i64, row: i64) -> Option<QuadrantTile> {
        let grid = self.grid();
        let per_degree = QUADS_PER_DEGREE * grid;
        let (west, north) = (-col, -row);
        if west < 0 || north < 0 {
            return None;
        }
        let (lon_deg, lat_deg) = (west / per_degree, north / per_degree);
        if lon_deg >= 180 || lat_deg >= 90 {
            return None;
        }
        let (west, north) = (west % per_degree, north % per_degree);
        Some(QuadrantTile {
            lat_deg: lat_deg as i32,
            lon_deg: lon_deg as i32,
            letter: (north / grid) as u8,
            digit: (west / grid + 1) as u8,
            x: (grid - west % grid) as u8,
            y: (grid - north % grid) as u8,
        })
    }

    pub fn relative_path(&self, tile: &QuadrantTile) -> String {
        format!(
            "q{:02}{:03}{}{}/{}{:02}{:02}{}",
            tile.lat_deg,
            tile.lon_deg,
            char::from(b'a' + tile.letter),
            tile.digit,
            self.prefix(),
            tile.x,
            tile.y,
            self.ext
        )
    }

    pub fn parse_path(&self, path: &Path) -> Option<QuadrantTile> {
        let dir = path.parent()?.file_name()?.to_str()?;
        let stem = path.file_stem()?.to_str()?;
        let dir = dir.strip_prefix('q')?;
        if dir.len() != 7 || !dir.is_ascii() {
            return None;
        }
        let letter = dir.as_bytes()[5].checked_sub(b'a')?;
        let digit = dir[6..].parse::<u8>().ok()?;
        if letter >= QUADS_PER_DEGREE as u8 || !(1..=8).contains(&digit) {
            return None;
        }

        let numbers = stem.strip_prefix(self.prefix())?;
        if numbers.len() != 4 || !numbers.is_ascii() {
            return None;
        }
        let x = numbers[..2].parse::<u8>().ok()?;
        let y = numbers[2..].parse::<u8>().ok()?;
        let grid = 1..=self.grid() as u8;
        if !grid.contains(&x) || !grid.contains(&y) {
            return None;
        }

        Some(QuadrantTile {
            lat_deg: dir[..2].parse().ok()?,
            lon_deg: dir[2..5].parse().ok()?,
            letter,
            digit,
            x,
            y,
        })
    }
}
