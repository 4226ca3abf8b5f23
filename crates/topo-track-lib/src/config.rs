//! Tile collection and saved site configuration
//!
//! Read from a JSON file, by default
//! `$XDG_CONFIG_HOME/topo-track/collections.json` or
//! `~/.config/topo-track/collections.json`. A missing file gives the
//! built-in defaults: a single OpenStreetMap collection under
//! `~/Maps/openstreetmap`.

use crate::fetch::DEFAULT_TIMEOUT;
use crate::tiles::{SlippyTiles, TileCollection, TileScheme};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const CONFIG_DIR: &str = "topo-track";
const CONFIG_FILE: &str = "collections.json";

const OSM_NAME: &str = "OpenStreetMap";
const OSM_ROOT: &str = "~/Maps/openstreetmap";
const OSM_URL: &str = "https://tile.openstreetmap.org";
const OSM_ATTRIBUTION: &str = "Map data (c) OpenStreetMap contributors";

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Couldn't read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No tile collection named {0}")]
    UnknownCollection(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection used when none is named
    pub default_collection: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub collections: Vec<CollectionConfig>,
    pub sites: Vec<Site>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_collection: Some(OSM_NAME.to_string()),
            user_agent: Some(format!("topo-track/{}", env!("CARGO_PKG_VERSION"))),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            collections: vec![CollectionConfig {
                name: OSM_NAME.to_string(),
                root: OSM_ROOT.to_string(),
                scheme: TileScheme::Slippy(SlippyTiles::default()),
                download_url: Some(OSM_URL.to_string()),
                zoom: None,
                max_zoom: None,
                reload_days: None,
                attribution: Some(OSM_ATTRIBUTION.to_string()),
            }],
            sites: Vec::new(),
        }
    }
}

/// One tile collection as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Directory holding the tiles; may start with `~`
    pub root: String,
    pub scheme: TileScheme,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub zoom: Option<u32>,
    #[serde(default)]
    pub max_zoom: Option<u32>,
    /// Download tiles again once they are this many days old
    #[serde(default)]
    pub reload_days: Option<f64>,
    #[serde(default)]
    pub attribution: Option<String>,
}

impl CollectionConfig {
    /// Build the collection; `now` anchors the reload threshold
    pub fn build(&self, now: SystemTime) -> TileCollection {
        let mut collection =
            TileCollection::new(&self.name, expand_tilde(&self.root), self.scheme.clone());
        if let Some(max_zoom) = self.max_zoom {
            collection = collection.with_max_zoom(max_zoom);
        }
        if let Some(zoom) = self.zoom {
            collection = collection.with_zoom(zoom);
        }
        if let Some(url) = &self.download_url {
            collection = collection.with_download_url(url);
        }
        if let Some(days) = self.reload_days {
            collection = collection.with_reload_days(days, now);
        }
        if let Some(attribution) = &self.attribution {
            collection = collection.with_attribution(attribution);
        }
        collection
    }
}

/// A named spot to open the map at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub zoom: Option<u32>,
}

impl Config {
    /// Where the config file lives unless told otherwise
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| expand_tilde("~/.config"));
        base.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read the config at `path`, or the defaults if there is no file
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            "Loaded {} collections and {} sites from {}",
            config.collections.len(),
            config.sites.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The collection called `name`, else the default one, else the first
    ///
    /// Names match case-insensitively.
    pub fn collection(&self, name: Option<&str>) -> Result<&CollectionConfig> {
        let wanted = name.or(self.default_collection.as_deref());
        match wanted {
            Some(wanted) => self
                .collections
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(wanted))
                .ok_or_else(|| ConfigError::UnknownCollection(wanted.to_string())),
            None => self
                .collections
                .first()
                .ok_or_else(|| ConfigError::UnknownCollection(String::new())),
        }
    }

    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// Replace a leading `~` with the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || std::env::var_os("HOME").map(PathBuf::from);
    if path == "~" {
        return home().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), home()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
