use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topo_track_lib::BoundingBox;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Topo Track - inspect, convert and summarize GPS tracks, and fill tiled map caches
pub struct Settings {
    /// Tile collection config file [default: ~/.config/topo-track/collections.json]
    #[clap(long, global = true, env = "TOPO_TRACK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print what a set of track files contains
    Info {
        /// GPX, KML, KMZ or GeoJSON files
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Merge track files into one GPX or GeoJSON file
    Convert {
        #[clap(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        /// Output file; the extension picks the format
        #[clap(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Only keep what lies inside minlon,minlat,maxlon,maxlat
        #[clap(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
    },

    /// Distance, climb and moving time
    Stats {
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Kilometers and meters instead of miles and feet
        #[clap(long, default_value = "false")]
        metric: bool,

        /// Half width of the elevation smoothing window, in points
        #[clap(long, default_value = "15")]
        halfwin: usize,

        /// Kaiser window shape (0 = moving average)
        #[clap(long, default_value = "2.0")]
        beta: f64,
    },

    /// List the tiles around a point, optionally downloading missing ones
    Tiles {
        /// Collection name [default: the config's default collection]
        #[clap(short, long)]
        collection: Option<String>,

        /// Saved site to center on, instead of --lon/--lat
        #[clap(short, long, conflicts_with_all = ["lon", "lat"])]
        site: Option<String>,

        #[clap(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,

        #[clap(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,

        #[clap(short, long)]
        zoom: Option<u32>,

        /// Tiles on each side of the center tile
        #[clap(short, long, default_value = "1")]
        radius: i64,

        /// Fetch missing and stale tiles
        #[clap(long, default_value = "false")]
        download: bool,
    },
}

impl Settings {
    /// Parse the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let numbers = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{value}: {e}"))?;
    match numbers.as_slice() {
        [minlon, minlat, maxlon, maxlat] => {
            Ok(BoundingBox::from_corners(*minlon, *minlat, *maxlon, *maxlat))
        }
        _ => Err(format!("{value}: expected minlon,minlat,maxlon,maxlat")),
    }
}
