//! Topo Track Library - Track Files and Tiled Map Addressing
//!
//! This library reads GPS track logs in several formats into one editable
//! in-memory model, writes them back out, and maps geographic coordinates to
//! the raster tiles of several map collection layouts, downloading missing
//! tiles one at a time without blocking the caller's thread.
//!
//! # Architecture
//!
//! - **[`TrackPoints`]**: Tracks, waypoints and polygons as flat tagged sequences
//! - **[`formats`]**: GPX, KML/KMZ and GeoJSON readers; GPX and GeoJSON writers
//! - **[`tiles::TileScheme`]**: Generic grid, slippy (web Mercator) and legacy quadrant naming
//! - **[`tiles::TileCollection`]**: Per-collection location, zoom and scale state
//! - **[`fetch::TileFetchEngine`]**: Deduplicated FIFO download queue with a single worker
//! - **[`fetch::TiledMap`]**: Resolves a coordinate to a cached image or a queued download
//! - **[`stats`]**: Distance, climb and moving time for a track
//!
//! # Threading
//!
//! Everything except the network fetch runs on the caller's thread. Each
//! download runs on its own worker thread and hands its result back over a
//! channel, which the caller drains with
//! [`fetch::TileFetchEngine::on_download_complete`].

mod bbox;
pub mod config;
pub mod fetch;
pub mod formats;
mod point;
pub mod stats;
pub mod tiles;
mod track;
pub mod utils;

// Public API exports
pub use bbox::BoundingBox;
pub use formats::{TrackFormat, read_track_file};
pub use point::{Attributes, GeoPoint, Polygon, Segment, SequenceItem};
pub use track::{DEFAULT_SEGMENT_NAME, TIMESTAMP_FORMAT, TimestampMode, TrackPoints};

use std::path::PathBuf;

/// Error types for reading, writing and editing tracks
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not a valid track file: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error(
        "{} has an illegal xsi:schemaLocation (the xsi namespace is never declared). \
         Try changing xsi:schemaLocation to just schemaLocation",
        path.display()
    )]
    SchemaLocation { path: PathBuf },

    #[error("Unknown track file format: {}", .0.display())]
    UnknownFormat(PathBuf),

    #[error("Index {index} out of range for sequence of length {len}")]
    InvalidIndex { index: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl TrackError {
    /// True for conditions where the caller should try another reading of
    /// its argument rather than report a broken file
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackError::NotFound(_))
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TrackError::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;
