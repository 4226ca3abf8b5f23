//! Tile download and cache engine
//!
//! Missing or stale tiles are queued on a [`DownloadQueue`] and fetched one
//! at a time by the [`TileFetchEngine`]. Each fetch runs on its own worker
//! thread, which writes the body to disk, checks that it is an image and
//! reports back over a channel. Everything else happens on the caller's
//! thread when it drains completions with
//! [`TileFetchEngine::on_download_complete`] or awaits
//! [`TileFetchEngine::next_completion`].
//!
//! [`TiledMap`] ties a [`crate::tiles::TileCollection`] to an engine and an
//! image loader, and coalesces redraws through a [`RedrawScheduler`].

mod engine;
mod http;
mod map;
mod queue;
mod redraw;
mod sniff;

pub use engine::{MAX_FAILED_DOWNLOADS, TileEvent, TileFetchEngine};
pub use http::{DEFAULT_TIMEOUT, HttpFetcher};
pub use map::{ResolvedTile, TiledMap};
pub use queue::{DownloadQueue, QueueEntry};
pub use redraw::{DEFAULT_REDRAW_DELAY, RedrawScheduler};
pub use sniff::{ImageCrateLoader, ImageSniffer};

use std::path::Path;

/// Error types for tile downloads
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Downloaded body is not an image ({content_type})")]
    NotAnImage { content_type: String },
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Retrieves the body at a URL
///
/// Shared with the worker threads, hence `Send + Sync`.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Names the MIME type of a downloaded body
pub trait ContentSniffer: Send + Sync {
    fn sniff(&self, bytes: &[u8]) -> String;
}

/// Decodes a tile image from disk
pub trait ImageLoader {
    fn load(&self, path: &Path) -> crate::tiles::Result<image::DynamicImage>;
}
