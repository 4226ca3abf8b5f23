use super::{ImageCrateLoader, ImageLoader, RedrawScheduler, TileEvent, TileFetchEngine};
use crate::tiles::{PlacedTile, TileCollection, TileId, Viewport};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A tile looked up for drawing
#[derive(Debug, Clone)]
pub struct ResolvedTile {
    pub tile: TileId,
    /// `None` until the tile is on disk and decodes
    pub image: Option<DynamicImage>,
    /// Pixel offset of the requested coordinate inside the tile
    pub x_offset: i64,
    pub y_offset: i64,
    pub path: PathBuf,
}

/// A tile collection backed by a download engine
///
/// Looking up a tile returns whatever is cached and queues a download when
/// the cached copy is missing or stale. Completed downloads request a
/// coalesced redraw.
pub struct TiledMap {
    collection: TileCollection,
    engine: TileFetchEngine,
    loader: Box<dyn ImageLoader>,
    redraw: RedrawScheduler,
}

impl TiledMap {
    pub fn new(collection: TileCollection, engine: TileFetchEngine) -> Self {
        Self {
            collection,
            engine,
            loader: Box::new(ImageCrateLoader),
            redraw: RedrawScheduler::default(),
        }
    }

    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_redraw(mut self, redraw: RedrawScheduler) -> Self {
        self.redraw = redraw;
        self
    }

    pub fn collection(&self) -> &TileCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut TileCollection {
        &mut self.collection
    }

    pub fn engine(&self) -> &TileFetchEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TileFetchEngine {
        &mut self.engine
    }

    /// Tile containing `(lon, lat)` at the collection's current zoom
    ///
    /// # Returns
    /// `None` outside the collection's coverage
    pub fn resolve_tile(&mut self, lon: f64, lat: f64) -> Option<ResolvedTile> {
        let position = self.collection.coords_to_tile(lon, lat)?;
        let path = self.collection.path_for(&position.tile).ok()?;
        let image = self.fetch_or_queue(&position.tile, &path);
        Some(ResolvedTile {
            tile: position.tile,
            image,
            x_offset: position.x_offset,
            y_offset: position.y_offset,
            path,
        })
    }

    /// The tile `dx` east and `dy` south of the one stored at `path`
    pub fn next_tile(&mut self, path: &Path, dx: i64, dy: i64) -> Option<ResolvedTile> {
        let tile = self.collection.tile_for_path(path)?;
        let next = self.collection.neighbor(&tile, dx, dy)?;
        self.resolve_id(next)
    }

    /// Every tile covering `view`, with its screen position
    pub fn resolve_view(&mut self, view: &Viewport) -> Vec<(PlacedTile, ResolvedTile)> {
        self.collection
            .visible_tiles(view)
            .into_iter()
            .filter_map(|placed| Some((placed, self.resolve_id(placed.tile)?)))
            .collect()
    }

    fn resolve_id(&mut self, tile: TileId) -> Option<ResolvedTile> {
        let path = self.collection.path_for(&tile).ok()?;
        let image = self.fetch_or_queue(&tile, &path);
        Some(ResolvedTile {
            tile,
            image,
            x_offset: 0,
            y_offset: 0,
            path,
        })
    }

    /// Screen position for a freshly downloaded tile under `view`
    pub fn placement_for_path(&self, path: &Path, view: &Viewport) -> Option<(i64, i64)> {
        let tile = self.collection.tile_for_path(path)?;
        self.collection.placement_for(&tile, view)
    }

    /// Handle finished downloads; each success requests a redraw
    pub fn on_download_complete(&mut self, now: Instant) -> Vec<TileEvent> {
        let events = self.engine.on_download_complete();
        self.request_redraws(&events, now);
        events
    }

    /// Await the in-flight download, then handle it as
    /// [`Self::on_download_complete`] does
    pub async fn next_completion(&mut self) -> Option<Vec<TileEvent>> {
        let events = self.engine.next_completion().await?;
        self.request_redraws(&events, Instant::now());
        Some(events)
    }

    fn request_redraws(&mut self, events: &[TileEvent], now: Instant) {
        if events
            .iter()
            .any(|e| matches!(e, TileEvent::Downloaded { .. }))
        {
            self.redraw.request(now);
        }
    }

    /// `true` once per burst of downloads, when the map should be redrawn
    pub fn poll_redraw(&mut self, now: Instant) -> bool {
        self.redraw.poll(now)
    }

    /// Cached image for `tile`, queueing a download if the cache is missing
    /// or stale
    ///
    /// A stale tile is still returned while its replacement downloads. The
    /// cached file is read before any download of it starts.
    fn fetch_or_queue(&mut self, tile: &TileId, path: &Path) -> Option<DynamicImage> {
        // Being written by the worker right now
        if self.engine.in_flight().is_some_and(|e| e.path == path) {
            return None;
        }
        let image = if path.is_file() {
            self.load_or_discard(path)
        } else {
            None
        };
        if !self.collection.is_fresh(path) {
            match self.collection.url_for(tile) {
                Ok(url) => {
                    tracing::debug!("Need to download {}", path.display());
                    self.engine.queue_download(url, path);
                }
                Err(err) => tracing::debug!("Not downloading {}: {}", path.display(), err),
            }
        }
        image
    }

    /// Decode a cached tile; one that doesn't decode is renamed to `.bad`
    fn load_or_discard(&self, path: &Path) -> Option<DynamicImage> {
        match self.loader.load(path) {
            Ok(image) if image.width() > 0 && image.height() > 0 => Some(image),
            result => {
                if let Err(err) = result {
                    tracing::warn!("Couldn't open {}: {}", path.display(), err);
                }
                let mut bad = path.as_os_str().to_owned();
                bad.push(".bad");
                if let Err(err) = std::fs::rename(path, &bad) {
                    tracing::warn!("Couldn't move aside {}: {}", path.display(), err);
                }
                None
            }
        }
    }
}

impl std::fmt::Debug for TiledMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledMap")
            .field("collection", &self.collection.name)
            .field("engine", &self.engine)
            .field("redraw", &self.redraw)
            .finish()
    }
}
