use crate::settings::{Command, Settings};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use topo_track_lib::config::{Config, ConfigError};
use topo_track_lib::fetch::{FetchError, TileEvent, TileFetchEngine, TiledMap};
use topo_track_lib::stats::{StatsOptions, TrackStats, statistics};
use topo_track_lib::tiles::TileError;
use topo_track_lib::utils::Units;
use topo_track_lib::{BoundingBox, TrackError, TrackPoints};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("None of the input files could be read")]
    NothingRead,

    #[error("Unknown site {0}")]
    UnknownSite(String),

    #[error("Give --lon and --lat, or --site")]
    NoLocation,

    #[error("{lon}, {lat} is outside collection {collection}")]
    OutsideCoverage {
        collection: String,
        lon: f64,
        lat: f64,
    },

    #[error("Couldn't start the async runtime: {0}")]
    Runtime(std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(settings: &Settings) -> Result<()> {
    match &settings.command {
        Command::Info { files } => info(files),
        Command::Convert {
            inputs,
            output,
            bbox,
        } => convert(inputs, output, bbox.as_ref()),
        Command::Stats {
            files,
            metric,
            halfwin,
            beta,
        } => {
            let options = StatsOptions {
                halfwin: *halfwin,
                beta: *beta,
                units: if *metric { Units::Metric } else { Units::Imperial },
                ..StatsOptions::default()
            };
            stats(files, &options)
        }
        Command::Tiles {
            collection,
            site,
            lon,
            lat,
            zoom,
            radius,
            download,
        } => {
            let path = settings.config.clone().unwrap_or_else(Config::default_path);
            let config = Config::load(&path)?;
            let request = TileRequest {
                collection: collection.as_deref(),
                site: site.as_deref(),
                location: lon.zip(*lat),
                zoom: *zoom,
                radius: (*radius).max(0),
            };
            if *download {
                download_tiles(&config, &request)
            } else {
                list_tiles(&config, &request)
            }
        }
    }
}

/// Read every file into one model
///
/// A file that can't be read is logged and skipped, except for the
/// `xsi:schemaLocation` problem, which stops everything so its hint is seen.
fn read_all(files: &[PathBuf]) -> Result<TrackPoints> {
    let mut tracks = TrackPoints::new();
    let mut read = 0;
    for file in files {
        match tracks.read_file(file) {
            Ok(Some(_)) => read += 1,
            Ok(None) => {
                tracing::warn!("{} has no tracks, waypoints or polygons", file.display());
                read += 1;
            }
            Err(err @ TrackError::SchemaLocation { .. }) => return Err(err.into()),
            Err(err) => tracing::error!("{}", err),
        }
    }
    if read == 0 {
        return Err(CliError::NothingRead);
    }
    Ok(tracks)
}

fn info(files: &[PathBuf]) -> Result<()> {
    let tracks = read_all(files)?;
    println!(
        "{} track points, {} waypoints, {} polygons",
        tracks.num_points(),
        tracks.num_waypoints(),
        tracks.polygons().len()
    );
    if let Some(bounds) = tracks.bounds() {
        println!("{bounds}");
        if let Some((lon, lat)) = bounds.center() {
            println!("Center {lon:.6}, {lat:.6}");
        }
    }
    if let Some((min, max)) = tracks.elevation_range() {
        println!("Elevation {min:.1} to {max:.1} m");
    }
    for segment in tracks.segments() {
        println!(
            "  {}: {} points",
            segment.label.unwrap_or("(unlabelled)"),
            segment.points.len()
        );
    }
    Ok(())
}

fn convert(inputs: &[PathBuf], output: &Path, bbox: Option<&BoundingBox>) -> Result<()> {
    let tracks = read_all(inputs)?;
    tracks.save_file(output, bbox)?;
    Ok(())
}

fn stats(files: &[PathBuf], options: &StatsOptions) -> Result<()> {
    let tracks = read_all(files)?;
    let stats = statistics(&tracks, options);
    print!("{}", format_stats(&stats, options.units));
    Ok(())
}

fn format_stats(stats: &TrackStats, units: Units) -> String {
    let (dist, height) = match units {
        Units::Imperial => ("mi", "ft"),
        Units::Metric => ("km", "m"),
    };
    let mut out = format!("Total distance: {:.2} {dist}\n", stats.total_distance);
    out += &format!("Raw total climb: {:.0} {height}\n", stats.raw_climb);
    out += &format!("Smoothed climb: {:.0} {height}\n", stats.smoothed_climb);
    out += &format!("Moving time: {}\n", format_duration(stats.moving_time));
    out += &format!("Stopped time: {}\n", format_duration(stats.stopped_time));
    if let Some(speed) = stats.average_moving_speed {
        out += &format!("Average moving speed: {speed:.2} {dist}/h\n");
    }
    out
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, total / 60 % 60, total % 60)
}

#[derive(Debug, Clone, Copy)]
struct TileRequest<'a> {
    collection: Option<&'a str>,
    site: Option<&'a str>,
    location: Option<(f64, f64)>,
    zoom: Option<u32>,
    radius: i64,
}

/// Build the collection the request names, zoomed for its location
fn prepare_collection(
    config: &Config,
    request: &TileRequest<'_>,
) -> Result<(topo_track_lib::tiles::TileCollection, f64, f64)> {
    let (lon, lat, site_collection, site_zoom) = match (request.site, request.location) {
        (Some(name), _) => {
            let site = config
                .site(name)
                .ok_or_else(|| CliError::UnknownSite(name.to_string()))?;
            (site.lon, site.lat, site.collection.as_deref(), site.zoom)
        }
        (None, Some((lon, lat))) => (lon, lat, None, None),
        (None, None) => return Err(CliError::NoLocation),
    };

    let mut collection = config
        .collection(request.collection.or(site_collection))?
        .build(SystemTime::now());
    match request.zoom.or(site_zoom) {
        Some(zoom) => collection.zoom_to(i64::from(zoom), lat)?,
        None => collection.zoom(0, lat)?,
    }
    if !collection.exists() {
        tracing::warn!(
            "{} has no directory at {}",
            collection.name,
            collection.root.display()
        );
    }
    Ok((collection, lon, lat))
}

fn list_tiles(config: &Config, request: &TileRequest<'_>) -> Result<()> {
    let (collection, lon, lat) = prepare_collection(config, request)?;
    let center = collection
        .coords_to_tile(lon, lat)
        .ok_or_else(|| CliError::OutsideCoverage {
            collection: collection.name.clone(),
            lon,
            lat,
        })?;

    let r = request.radius;
    for dy in -r..=r {
        for dx in -r..=r {
            let Some(tile) = collection.neighbor(&center.tile, dx, dy) else {
                continue;
            };
            let path = collection.path_for(&tile)?;
            let state = if collection.is_fresh(&path) {
                "cached"
            } else if path.is_file() {
                "stale"
            } else {
                "missing"
            };
            println!("{state:8} {}", path.display());
        }
    }
    Ok(())
}

fn download_tiles(config: &Config, request: &TileRequest<'_>) -> Result<()> {
    let (collection, lon, lat) = prepare_collection(config, request)?;
    let name = collection.name.clone();

    // The blocking HTTP client must be built and dropped outside the runtime
    let engine = TileFetchEngine::with_http(config.user_agent.as_deref(), config.timeout())?;
    let mut map = TiledMap::new(collection, engine);

    let center = map
        .resolve_tile(lon, lat)
        .ok_or_else(|| CliError::OutsideCoverage {
            collection: name.clone(),
            lon,
            lat,
        })?;
    let r = request.radius;
    let mut cached = 0;
    for dy in -r..=r {
        for dx in -r..=r {
            let tile = map.next_tile(&center.path, dx, dy);
            if tile.is_some_and(|t| t.image.is_some()) {
                cached += 1;
            }
        }
    }
    tracing::info!(
        "{}: {} tiles usable from cache, {} queued",
        name,
        cached,
        map.engine().queue().len() + usize::from(map.engine().in_flight().is_some())
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(CliError::Runtime)?;
    let (downloaded, failed) = runtime.block_on(async {
        let (mut downloaded, mut failed) = (0usize, 0usize);
        while let Some(events) = map.next_completion().await {
            for event in events {
                match event {
                    TileEvent::Downloaded { .. } => downloaded += 1,
                    TileEvent::Failed { .. } => failed += 1,
                    TileEvent::Abandoned { dropped } => {
                        tracing::warn!("Gave up on {} tiles", dropped)
                    }
                }
            }
            if map.poll_redraw(Instant::now()) {
                tracing::debug!("{} downloaded so far", downloaded);
            }
        }
        (downloaded, failed)
    });
    println!("Downloaded {downloaded} tiles, {failed} failed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Walk</name><trkseg>
    <trkpt lat="35.0" lon="-106.0"><ele>1000</ele><time>2024-05-01T10:00:00Z</time></trkpt>
    <trkpt lat="35.01" lon="-106.0"><ele>1010</ele><time>2024-05-01T10:10:00Z</time></trkpt>
  </trkseg></trk>
</gpx>
"#;

    #[test]
    fn test_read_all_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("walk.gpx");
        std::fs::write(&good, GPX).unwrap();
        let missing = dir.path().join("missing.gpx");

        let tracks = read_all(&[missing.clone(), good]).unwrap();
        assert_eq!(tracks.num_points(), 2);
        assert!(matches!(read_all(&[missing]), Err(CliError::NothingRead)));
    }

    #[test]
    fn test_convert_to_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("walk.gpx");
        std::fs::write(&input, GPX).unwrap();
        let output = dir.path().join("walk.geojson");
        convert(&[input], &output, None).unwrap();

        let mut back = TrackPoints::new();
        back.read_file(&output).unwrap();
        assert_eq!(back.num_points(), 2);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00:00");
        assert_eq!(format_duration(3725.4), "1:02:05");
    }

    #[test]
    fn test_list_tiles_needs_location() {
        let config = Config::default();
        let request = TileRequest {
            collection: None,
            site: None,
            location: None,
            zoom: None,
            radius: 1,
        };
        assert!(matches!(
            list_tiles(&config, &request),
            Err(CliError::NoLocation)
        ));
        let request = TileRequest {
            site: Some("nowhere"),
            ..request
        };
        assert!(matches!(
            list_tiles(&config, &request),
            Err(CliError::UnknownSite(_))
        ));
    }
}
