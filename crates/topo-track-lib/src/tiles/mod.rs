//! Tile addressing for raster map collections
//!
//! A [`TileScheme`] maps geographic coordinates to tile identifiers, file
//! paths and download URLs, and walks from a tile to its neighbours. Three
//! layouts are supported:
//!
//! - [`GenericGrid`]: home-made grids named `{prefix}{a}[-]{b}{ext}`
//! - [`SlippyTiles`]: web Mercator `{zoom}/{x}/{y}` tiles as served by OpenStreetMap
//! - [`QuadrantTiles`]: the legacy Topo! quadrangle directories
//!
//! [`TileCollection`] adds the per-collection state: on-disk root, zoom and
//! the pixel-per-degree scales used to lay tiles out on screen.

mod collection;
mod generic;
mod quadrant;
mod slippy;

pub use collection::{PlacedTile, TileCollection, Viewport};
pub use generic::{AxisOrder, GenericGrid};
pub use quadrant::{QuadrantTile, QuadrantTiles, Series};
pub use slippy::SlippyTiles;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error types for tile collections
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Zoom level {requested} is outside 0..={max} for {collection}")]
    ZoomOutOfRange {
        collection: String,
        requested: i64,
        max: u32,
    },

    #[error("Collection {0} has no download URL")]
    NoDownloadUrl(String),

    #[error("Tile {0:?} does not belong to this collection's naming scheme")]
    InvalidTile(TileId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TileError>;

/// Identifies one tile within a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileId {
    /// Column and row counted from the grid's top-left origin
    Grid { col: i64, row: i64 },
    Slippy { zoom: u32, x: i64, y: i64 },
    Quadrant(QuadrantTile),
}

/// A tile plus the pixel offset of a coordinate inside it, from its top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePosition {
    pub tile: TileId,
    pub x_offset: i64,
    pub y_offset: i64,
}

/// The closed set of tile naming schemes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TileScheme {
    Generic(GenericGrid),
    Slippy(SlippyTiles),
    Quadrant(QuadrantTiles),
}

impl TileScheme {
    /// Tile containing `(lon, lat)` at `zoom`, or `None` outside the scheme's
    /// coverage. Only slippy tiles use the zoom level.
    pub fn coords_to_tile(&self, lon: f64, lat: f64, zoom: u32) -> Option<TilePosition> {
        match self {
            TileScheme::Generic(grid) => grid.coords_to_tile(lon, lat),
            TileScheme::Slippy(slippy) => slippy.coords_to_tile(lon, lat, zoom),
            TileScheme::Quadrant(quad) => quad.coords_to_tile(lon, lat),
        }
    }

    /// Coordinates `(lon, lat)` of the tile's top-left corner
    pub fn tile_to_coords(&self, tile: &TileId) -> Option<(f64, f64)> {
        match (self, tile) {
            (TileScheme::Generic(grid), TileId::Grid { col, row }) => {
                Some(grid.tile_to_coords(*col, *row))
            }
            (TileScheme::Slippy(_), TileId::Slippy { zoom, x, y }) => {
                Some(SlippyTiles::tile_to_coords(*x, *y, *zoom))
            }
            (TileScheme::Quadrant(quad), TileId::Quadrant(t)) => Some(quad.tile_to_coords(t)),
            _ => None,
        }
    }

    /// Tile `dx` tiles east and `dy` tiles south of `tile`
    pub fn neighbor(&self, tile: &TileId, dx: i64, dy: i64) -> Option<TileId> {
        let (col, row) = self.global_index(tile)?;
        self.from_global_index(tile, col + dx, row + dy)
    }

    /// Number of tiles `(east, south)` from `from` to `to`
    pub fn tile_difference(&self, from: &TileId, to: &TileId) -> Option<(i64, i64)> {
        let (c1, r1) = self.global_index(from)?;
        let (c2, r2) = self.global_index(to)?;
        Some((c2 - c1, r2 - r1))
    }

    /// Column and row of a tile on an unbounded grid growing east and south
    fn global_index(&self, tile: &TileId) -> Option<(i64, i64)> {
        match (self, tile) {
            (TileScheme::Generic(_), TileId::Grid { col, row }) => Some((*col, *row)),
            (TileScheme::Slippy(_), TileId::Slippy { x, y, .. }) => Some((*x, *y)),
            (TileScheme::Quadrant(quad), TileId::Quadrant(t)) => Some(quad.global_index(t)),
            _ => None,
        }
    }

    fn from_global_index(&self, like: &TileId, col: i64, row: i64) -> Option<TileId> {
        match (self, like) {
            (TileScheme::Generic(_), TileId::Grid { .. }) => {
                (col >= 0 && row >= 0).then_some(TileId::Grid { col, row })
            }
            (TileScheme::Slippy(_), TileId::Slippy { zoom, .. }) => {
                SlippyTiles::wrap(*zoom, col, row)
            }
            (TileScheme::Quadrant(quad), TileId::Quadrant(_)) => {
                quad.from_global_index(col, row).map(TileId::Quadrant)
            }
            _ => None,
        }
    }

    /// Where the tile lives under the collection root
    pub fn path_for(&self, tile: &TileId, root: &Path) -> Option<PathBuf> {
        Some(root.join(self.relative_path(tile)?))
    }

    /// Path of the tile relative to the collection root, with `/` separators
    pub fn relative_path(&self, tile: &TileId) -> Option<String> {
        match (self, tile) {
            (TileScheme::Generic(grid), TileId::Grid { col, row }) => {
                Some(grid.file_name(*col, *row))
            }
            (TileScheme::Slippy(slippy), TileId::Slippy { zoom, x, y }) => {
                Some(slippy.relative_path(*zoom, *x, *y))
            }
            (TileScheme::Quadrant(quad), TileId::Quadrant(t)) => Some(quad.relative_path(t)),
            _ => None,
        }
    }

    /// Recover the tile identifier from a path produced by [`Self::path_for`]
    pub fn parse_path(&self, path: &Path) -> Option<TileId> {
        match self {
            TileScheme::Generic(grid) => grid.parse_path(path),
            TileScheme::Slippy(_) => SlippyTiles::parse_path(path),
            TileScheme::Quadrant(quad) => quad.parse_path(path).map(TileId::Quadrant),
        }
    }

    /// Download URL for the tile
    ///
    /// A template containing `{z}`, `{x}` or `{y}` has them substituted;
    /// any other template is a base URL to which the relative tile path is
    /// appended.
    pub fn url_for(&self, template: &str, tile: &TileId) -> Option<String> {
        let (z, x, y) = match tile {
            TileId::Grid { col, row } => (0, *col, *row),
            TileId::Slippy { zoom, x, y } => (*zoom, *x, *y),
            TileId::Quadrant(t) => (0, i64::from(t.x), i64::from(t.y)),
        };
        let url = template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        if url != template {
            return Some(url);
        }
        let relative = self.relative_path(tile)?;
        Some(format!("{}/{}", template.trim_end_matches('/'), relative))
    }

    /// Tile size in pixels
    pub fn tile_size(&self) -> (u32, u32) {
        match self {
            TileScheme::Generic(grid) => (grid.tile_width, grid.tile_height),
            TileScheme::Slippy(slippy) => (slippy.tile_width, slippy.tile_height),
            TileScheme::Quadrant(quad) => (quad.tile_width, quad.tile_height),
        }
    }
}
