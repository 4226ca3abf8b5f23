//! A named, on-disk tile collection with its current zoom and scale

use super::{Result, TileError, TileId, TilePosition, TileScheme};
use crate::BoundingBox;
use crate::utils::lat_to_mercator_y;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default slippy zoom level for a new collection and for a single-point fit
pub const DEFAULT_ZOOM: u32 = 12;

/// Highest slippy zoom level served by OpenStreetMap
pub const DEFAULT_MAX_ZOOM: u32 = 19;

/// Latitude used for Mercator scales before any centre is known
const DEFAULT_LATITUDE: f64 = 45.0;

/// Window size, in pixels, that [`TileCollection::zoom_to_bounds`] fits to
const FIT_WIDTH: f64 = 800.0;
const FIT_HEIGHT: f64 = 600.0;

/// Screen area to cover with tiles, centred on a coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lon: f64,
    pub center_lat: f64,
    pub width: u32,
    pub height: u32,
}

/// A tile and the screen position of its top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedTile {
    pub tile: TileId,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone)]
pub struct TileCollection {
    pub name: String,
    pub root: PathBuf,
    pub scheme: TileScheme,
    zoom: u32,
    max_zoom: u32,
    xscale: f64,
    yscale: f64,
    download_url: Option<String>,
    /// Tiles modified before this instant are downloaded again
    reload_before: Option<SystemTime>,
    attribution: Option<String>,
}

impl TileCollection {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, scheme: TileScheme) -> Self {
        let (zoom, max_zoom) = match scheme {
            TileScheme::Slippy(_) => (DEFAULT_ZOOM, DEFAULT_MAX_ZOOM),
            _ => (0, 0),
        };
        let mut collection = Self {
            name: name.into(),
            root: root.into(),
            scheme,
            zoom,
            max_zoom,
            xscale: 0.0,
            yscale: 0.0,
            download_url: None,
            reload_before: None,
            attribution: None,
        };
        collection.update_scales(DEFAULT_LATITUDE);
        collection
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.download_url = (!url.is_empty()).then_some(url);
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: u32) -> Self {
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.min(max_zoom);
        self.update_scales(DEFAULT_LATITUDE);
        self
    }

    /// Start at `zoom`, clamped to the maximum
    pub fn with_zoom(mut self, zoom: u32) -> Self {
        self.zoom = zoom.min(self.max_zoom);
        self.update_scales(DEFAULT_LATITUDE);
        self
    }

    pub fn with_reload_before(mut self, threshold: SystemTime) -> Self {
        self.reload_before = Some(threshold);
        self
    }

    /// Re-download tiles older than `days` days before `now`
    pub fn with_reload_days(self, days: f64, now: SystemTime) -> Self {
        let age = Duration::try_from_secs_f64(days.max(0.0) * 86400.0).unwrap_or(Duration::ZERO);
        let threshold = now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH);
        self.with_reload_before(threshold)
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    pub fn zoom_level(&self) -> u32 {
        self.zoom
    }

    pub fn max_zoom(&self) -> u32 {
        self.max_zoom
    }

    /// Pixels per degree `(x, y)` at the current zoom
    pub fn scales(&self) -> (f64, f64) {
        (self.xscale, self.yscale)
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn reload_before(&self) -> Option<SystemTime> {
        self.reload_before
    }

    pub fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }

    /// Whether the collection's directory is in place
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn update_scales(&mut self, latitude: f64) {
        (self.xscale, self.yscale) = match &self.scheme {
            TileScheme::Generic(grid) => (grid.xscale, grid.yscale),
            TileScheme::Slippy(slippy) => slippy.scales(self.zoom, latitude),
            TileScheme::Quadrant(quad) => quad.scales(),
        };
    }

    /// Zoom in (positive) or out (negative) by `amount` steps
    ///
    /// Quadrant collections switch series instead. Zero only recomputes the
    /// scales for `latitude`.
    pub fn zoom(&mut self, amount: i32, latitude: f64) -> Result<()> {
        if let TileScheme::Quadrant(quad) = &mut self.scheme {
            quad.zoom(amount);
        }
        self.zoom_to(i64::from(self.zoom) + i64::from(amount), latitude)
    }

    /// Jump to zoom level `zoom`; levels outside `0..=max_zoom` are rejected
    pub fn zoom_to(&mut self, zoom: i64, latitude: f64) -> Result<()> {
        if matches!(self.scheme, TileScheme::Slippy(_)) {
            if !(0..=i64::from(self.max_zoom)).contains(&zoom) {
                return Err(TileError::ZoomOutOfRange {
                    collection: self.name.clone(),
                    requested: zoom,
                    max: self.max_zoom,
                });
            }
            self.zoom = zoom as u32;
            tracing::debug!("{}: zoom {}", self.name, self.zoom);
        }
        self.update_scales(latitude);
        Ok(())
    }

    /// Pick the deepest zoom at which `bounds` fits an 800x600 window
    pub fn zoom_to_bounds(&mut self, bounds: &BoundingBox) -> Result<()> {
        let latitude = bounds.center().map_or(DEFAULT_LATITUDE, |(_, lat)| lat);
        if !matches!(self.scheme, TileScheme::Slippy(_)) {
            self.update_scales(latitude);
            return Ok(());
        }

        let xdist = bounds.maxlon - bounds.minlon;
        let ydist = lat_to_mercator_y(bounds.maxlat) - lat_to_mercator_y(bounds.minlat);
        if xdist == 0.0 || ydist == 0.0 {
            tracing::debug!("Single point, using zoom level {}", DEFAULT_ZOOM);
            return self.zoom_to(i64::from(DEFAULT_ZOOM.min(self.max_zoom)), latitude);
        }

        let mult = 256.0 * 100000.0 / 40000000.0;
        for z in 0..=self.max_zoom {
            let pow = 2f64.powi(z as i32);
            if xdist * mult * pow > FIT_WIDTH || ydist * mult * pow > FIT_HEIGHT {
                return self.zoom_to(i64::from(z.saturating_sub(1)), latitude);
            }
        }
        tracing::debug!("Bounds fit at every zoom, using the maximum");
        self.zoom_to(i64::from(self.max_zoom), latitude)
    }

    pub fn coords_to_tile(&self, lon: f64, lat: f64) -> Option<TilePosition> {
        self.scheme.coords_to_tile(lon, lat, self.zoom)
    }

    pub fn tile_to_coords(&self, tile: &TileId) -> Option<(f64, f64)> {
        self.scheme.tile_to_coords(tile)
    }

    pub fn neighbor(&self, tile: &TileId, dx: i64, dy: i64) -> Option<TileId> {
        self.scheme.neighbor(tile, dx, dy)
    }

    pub fn path_for(&self, tile: &TileId) -> Result<PathBuf> {
        self.scheme
            .path_for(tile, &self.root)
            .ok_or(TileError::InvalidTile(*tile))
    }

    pub fn tile_for_path(&self, path: &Path) -> Option<TileId> {
        self.scheme.parse_path(path)
    }

    pub fn url_for(&self, tile: &TileId) -> Result<String> {
        let template = self
            .download_url
            .as_deref()
            .ok_or_else(|| TileError::NoDownloadUrl(self.name.clone()))?;
        self.scheme
            .url_for(template, tile)
            .ok_or(TileError::InvalidTile(*tile))
    }

    /// Whether the tile at `path` is on disk and not older than the reload
    /// threshold
    pub fn is_fresh(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        match (self.reload_before, meta.modified()) {
            (None, _) => true,
            (Some(threshold), Ok(modified)) => modified >= threshold,
            (Some(_), Err(_)) => false,
        }
    }

    /// Upper-left tile of the viewport plus the offset of the viewport's
    /// corner inside it
    fn seed(&self, view: &Viewport) -> Option<TilePosition> {
        if self.xscale <= 0.0 || self.yscale <= 0.0 {
            return None;
        }
        let min_lon = view.center_lon - f64::from(view.width) / self.xscale / 2.0;
        let max_lat = view.center_lat + f64::from(view.height) / self.yscale / 2.0;
        self.coords_to_tile(min_lon, max_lat)
    }

    /// Screen position of `tile`'s top-left corner under `view`
    pub fn placement_for(&self, tile: &TileId, view: &Viewport) -> Option<(i64, i64)> {
        let seed = self.seed(view)?;
        let (dx, dy) = self.scheme.tile_difference(&seed.tile, tile)?;
        let (w, h) = self.scheme.tile_size();
        Some((
            dx * i64::from(w) - seed.x_offset,
            dy * i64::from(h) - seed.y_offset,
        ))
    }

    /// Tiles covering `view`, in rows from the top-left
    ///
    /// Tiles the scheme cannot address (past a grid's origin, beyond the
    /// poles) are left out, leaving a blank cell.
    pub fn visible_tiles(&self, view: &Viewport) -> Vec<PlacedTile> {
        let Some(seed) = self.seed(view) else {
            return Vec::new();
        };
        let (w, h) = self.scheme.tile_size();
        let (w, h) = (i64::from(w.max(1)), i64::from(h.max(1)));

        let mut placed = Vec::new();
        let mut dy = 0;
        while dy * h - seed.y_offset < i64::from(view.height) {
            let mut dx = 0;
            while dx * w - seed.x_offset < i64::from(view.width) {
                if let Some(tile) = self.neighbor(&seed.tile, dx, dy) {
                    placed.push(PlacedTile {
                        tile,
                        x: dx * w - seed.x_offset,
                        y: dy * h - seed.y_offset,
                    });
                }
                dx += 1;
            }
            dy += 1;
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::{QuadrantTiles, Series, SlippyTiles};
    use approx::assert_relative_eq;

    fn osm(root: &Path) -> TileCollection {
        TileCollection::new("OSM", root, TileScheme::Slippy(SlippyTiles::default()))
            .with_download_url("https://tile.openstreetmap.org")
    }

    #[test]
    fn test_defaults() {
        let c = osm(Path::new("/maps/osm"));
        assert_eq!(c.zoom_level(), 12);
        assert_eq!(c.max_zoom(), 19);
        let (xscale, _) = c.scales();
        assert_relative_eq!(xscale, 256.0 * 4096.0 / 360.0);
    }

    #[test]
    fn test_zoom_range() {
        let mut c = osm(Path::new("/maps/osm"));
        c.zoom(2, 35.0).unwrap();
        assert_eq!(c.zoom_level(), 14);
        let err = c.zoom_to(20, 35.0).unwrap_err();
        assert!(matches!(err, TileError::ZoomOutOfRange { requested: 20, max: 19, .. }));
        assert_eq!(c.zoom_level(), 14);
        assert!(c.zoom(-15, 35.0).is_err());
        c.zoom_to(0, 35.0).unwrap();
        assert_eq!(c.zoom_level(), 0);
    }

    #[test]
    fn test_zoom_to_bounds() {
        let mut c = osm(Path::new("/maps/osm"));
        let mut single = BoundingBox::new();
        single.add_point(35.88, -106.3);
        c.zoom_to(3, 35.0).unwrap();
        c.zoom_to_bounds(&single).unwrap();
        assert_eq!(c.zoom_level(), 12);

        // One degree wide: 0.64 * 2^z first exceeds 800 pixels at z 11
        let bounds = BoundingBox::from_corners(-107.0, 35.5, -106.0, 36.0);
        c.zoom_to_bounds(&bounds).unwrap();
        assert_eq!(c.zoom_level(), 10);

        let world = BoundingBox::from_corners(-180.0, -80.0, 180.0, 80.0);
        c.zoom_to_bounds(&world).unwrap();
        assert_eq!(c.zoom_level(), 1);
    }

    #[test]
    fn test_urls_and_paths() {
        let c = osm(Path::new("/maps/osm"));
        let pos = c.coords_to_tile(-106.3, 35.88).unwrap();
        assert_eq!(
            c.path_for(&pos.tile).unwrap(),
            Path::new("/maps/osm/12/838/1610.png")
        );
        assert_eq!(
            c.url_for(&pos.tile).unwrap(),
            "https://tile.openstreetmap.org/12/838/1610.png"
        );
        assert_eq!(
            c.tile_for_path(Path::new("/maps/osm/12/838/1610.png")),
            Some(pos.tile)
        );

        let offline = TileCollection::new("local", "/maps/l", TileScheme::Slippy(SlippyTiles::default()));
        assert!(matches!(
            offline.url_for(&pos.tile),
            Err(TileError::NoDownloadUrl(name)) if name == "local"
        ));
        assert!(matches!(
            c.path_for(&TileId::Grid { col: 0, row: 0 }),
            Err(TileError::InvalidTile(_))
        ));
    }

    #[test]
    fn test_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        let c = osm(dir.path());
        assert!(c.exists());
        assert!(!c.is_fresh(&path));

        std::fs::write(&path, b"png").unwrap();
        assert!(c.is_fresh(&path));

        let now = SystemTime::now();
        let stale = osm(dir.path()).with_reload_before(now + Duration::from_secs(3600));
        assert!(!stale.is_fresh(&path));
        let recent = osm(dir.path()).with_reload_days(1.0, now);
        assert!(recent.is_fresh(&path));
        assert!(!osm(&dir.path().join("missing")).exists());
    }

    #[test]
    fn test_visible_tiles_cover_viewport() {
        let mut c = osm(Path::new("/maps/osm"));
        c.zoom(0, 35.88).unwrap();
        let view = Viewport {
            center_lon: -106.3,
            center_lat: 35.88,
            width: 800,
            height: 600,
        };
        let tiles = c.visible_tiles(&view);
        assert!(!tiles.is_empty());

        let first = tiles[0];
        assert!(first.x <= 0 && first.x > -256);
        assert!(first.y <= 0 && first.y > -256);
        // Every cell overlaps the viewport and the rightmost column reaches its edge
        for t in &tiles {
            assert!(t.x < 800 && t.y < 600);
            assert_eq!(c.placement_for(&t.tile, &view), Some((t.x, t.y)));
        }
        let max_right = tiles.iter().map(|t| t.x + 256).max().unwrap();
        let max_bottom = tiles.iter().map(|t| t.y + 256).max().unwrap();
        assert!(max_right >= 800 && max_bottom >= 600);

        // The centre tile sits where the centre coordinate lands on screen
        let centre = c.coords_to_tile(-106.3, 35.88).unwrap();
        let (x, y) = c.placement_for(&centre.tile, &view).unwrap();
        assert!((x + centre.x_offset - 400).abs() <= 2);
        assert!((y + centre.y_offset - 300).abs() <= 2);
    }

    #[test]
    fn test_quadrant_zoom_switches_series() {
        let scheme = TileScheme::Quadrant(QuadrantTiles {
            series: Series::SevenAndHalf,
            ser7_prefix: "012t".to_string(),
            ser15_prefix: Some("024t".to_string()),
            ext: ".gif".to_string(),
            tile_width: 262,
            tile_height: 328,
        });
        let mut c = TileCollection::new("Topo1", "/maps/topo", scheme);
        assert_relative_eq!(c.scales().0, 262.0 * 80.0);
        c.zoom(-1, 35.0).unwrap();
        assert_relative_eq!(c.scales().0, 262.0 * 40.0);
        assert!(matches!(&c.scheme, TileScheme::Quadrant(q) if q.series == Series::Fifteen));
    }
}
