use super::{ContentSniffer, DownloadQueue, FetchError, Fetcher, QueueEntry};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Failed downloads tolerated before the rest of the queue is abandoned
pub const MAX_FAILED_DOWNLOADS: usize = 10;

/// Text bodies longer than this are logged as a preview only
const MAX_LOGGED_BODY: usize = 240;
const BODY_PREVIEW_CHARS: usize = 100;

/// What happened to a download, as seen from the caller's thread
#[derive(Debug)]
pub enum TileEvent {
    /// The tile is on disk and is an image
    Downloaded { url: String, path: PathBuf },
    /// The tile could not be fetched; it is not retried this session
    Failed {
        url: String,
        path: PathBuf,
        error: FetchError,
    },
    /// Too many failures: the pending downloads were dropped
    Abandoned { dropped: usize },
}

impl TileEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            TileEvent::Downloaded { path, .. } | TileEvent::Failed { path, .. } => Some(path),
            TileEvent::Abandoned { .. } => None,
        }
    }
}

/// Result sent back by a worker thread
#[derive(Debug)]
struct Completion {
    entry: QueueEntry,
    result: Result<(), FetchError>,
}

/// Downloads queued tiles one at a time
///
/// The engine lives on the caller's thread. Each download runs on a
/// detached worker thread that owns only its [`QueueEntry`] and handles to
/// the fetcher and sniffer, and whose one shared write is sending its
/// [`Completion`] back.
pub struct TileFetchEngine {
    queue: DownloadQueue,
    in_flight: Option<QueueEntry>,
    /// Destinations that failed this session
    failed: HashSet<PathBuf>,
    failures: usize,
    cancelled: bool,
    fetcher: Arc<dyn Fetcher>,
    sniffer: Arc<dyn ContentSniffer>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl std::fmt::Debug for TileFetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetchEngine")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight)
            .field("failed", &self.failed.len())
            .field("failures", &self.failures)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl TileFetchEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, sniffer: Arc<dyn ContentSniffer>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            queue: DownloadQueue::new(),
            in_flight: None,
            failed: HashSet::new(),
            failures: 0,
            cancelled: false,
            fetcher,
            sniffer,
            tx,
            rx,
        }
    }

    /// Engine fetching over HTTP and sniffing bodies with the `image` crate
    pub fn with_http(user_agent: Option<&str>, timeout: std::time::Duration) -> super::Result<Self> {
        let fetcher = super::HttpFetcher::new(user_agent, timeout)?;
        Ok(Self::new(Arc::new(fetcher), Arc::new(super::ImageSniffer)))
    }

    /// Queue a tile download, starting it right away if nothing is in flight
    ///
    /// # Returns
    /// `false` if the path already failed this session, is queued or is
    /// being downloaded
    pub fn queue_download(&mut self, url: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.failed.contains(&path) {
            tracing::debug!("{} failed earlier, not retrying", path.display());
            return false;
        }
        if self.in_flight.as_ref().is_some_and(|e| e.path == path) {
            tracing::debug!("{} is already downloading", path.display());
            return false;
        }
        if !self.queue.push(url, path) {
            return false;
        }
        self.cancelled = false;
        self.start_next();
        true
    }

    /// Drop every pending download
    ///
    /// A download already in flight is not interrupted; it completes and is
    /// reported, but nothing starts after it.
    pub fn cancel(&mut self) {
        if !self.queue.is_empty() {
            tracing::info!("Cancelling {} pending downloads", self.queue.len());
        }
        self.queue.clear();
        self.cancelled = true;
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    pub fn in_flight(&self) -> Option<&QueueEntry> {
        self.in_flight.as_ref()
    }

    /// Nothing downloading and nothing queued
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failures
    }

    pub fn has_failed(&self, path: &Path) -> bool {
        self.failed.contains(path)
    }

    /// Handle every completion that has arrived, without blocking
    pub fn on_download_complete(&mut self) -> Vec<TileEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            events.extend(self.complete(completion));
        }
        events
    }

    /// Wait for the in-flight download to finish and handle it
    ///
    /// # Returns
    /// `None` when nothing is in flight
    pub async fn next_completion(&mut self) -> Option<Vec<TileEvent>> {
        self.in_flight.as_ref()?;
        let completion = self.rx.recv().await?;
        Some(self.complete(completion))
    }

    fn complete(&mut self, completion: Completion) -> Vec<TileEvent> {
        let Completion { entry, result } = completion;
        if self.in_flight.as_ref().is_some_and(|e| e.path == entry.path) {
            self.in_flight = None;
        }

        let mut events = Vec::new();
        match result {
            Ok(()) => {
                tracing::info!("Downloaded {}", entry.path.display());
                events.push(TileEvent::Downloaded {
                    url: entry.url,
                    path: entry.path,
                });
            }
            Err(error) => {
                tracing::error!("Couldn't download {}: {}", entry.url, error);
                self.failures += 1;
                self.failed.insert(entry.path.clone());
                events.push(TileEvent::Failed {
                    url: entry.url,
                    path: entry.path,
                    error,
                });
                if self.failures > MAX_FAILED_DOWNLOADS {
                    let dropped = self.queue.len();
                    tracing::error!(
                        "{} failed downloads, abandoning {} queued tiles",
                        self.failures,
                        dropped
                    );
                    self.queue.clear();
                    self.failures = 0;
                    events.push(TileEvent::Abandoned { dropped });
                }
            }
        }

        if self.cancelled {
            self.cancelled = false;
        } else {
            self.start_next();
        }
        events
    }

    fn start_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(entry) = self.queue.pop() else {
            return;
        };
        tracing::debug!("Fetching {} -> {}", entry.url, entry.path.display());

        let fetcher = Arc::clone(&self.fetcher);
        let sniffer = Arc::clone(&self.sniffer);
        let tx = self.tx.clone();
        let job = entry.clone();
        let spawned = std::thread::Builder::new()
            .name("tile-download".to_string())
            .spawn(move || {
                let result = download(&job, fetcher.as_ref(), sniffer.as_ref());
                // The engine may be gone already; nobody is left to tell
                let _ = tx.send(Completion { entry: job, result });
            });

        if let Err(err) = spawned {
            let _ = self.tx.send(Completion {
                entry: entry.clone(),
                result: Err(FetchError::Io(err)),
            });
        }
        self.in_flight = Some(entry);
    }
}

/// Fetch, check and store one tile; runs on the worker thread
fn download(
    entry: &QueueEntry,
    fetcher: &dyn Fetcher,
    sniffer: &dyn ContentSniffer,
) -> Result<(), FetchError> {
    let body = fetcher.fetch(&entry.url)?;

    let content_type = sniffer.sniff(&body);
    if !content_type.starts_with("image/") {
        if content_type.starts_with("text/") {
            let text = String::from_utf8_lossy(&body);
            if text.chars().count() > MAX_LOGGED_BODY {
                let preview: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
                tracing::warn!("{} returned text: {} ...", entry.url, preview);
            } else {
                tracing::warn!("{} returned text: {}", entry.url, text);
            }
        }
        return Err(FetchError::NotAnImage { content_type });
    }

    store(&entry.path, &body).map_err(FetchError::Io)
}

/// Write `body` next to `path` and move it into place, so the cache never
/// holds a partly written tile
fn store(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = std::fs::write(&partial, body).and_then(|()| std::fs::rename(&partial, path));
    if written.is_err() && partial.exists() {
        if let Err(err) = std::fs::remove_file(&partial) {
            tracing::warn!("Couldn't remove {}: {}", partial.display(), err);
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ImageSniffer;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    struct Canned(Vec<u8>);

    impl Fetcher for Canned {
        fn fetch(&self, _url: &str) -> crate::fetch::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_download_keeps_images() {
        let dir = tempfile::tempdir().unwrap();
        let entry = QueueEntry {
            url: "https://tiles/1/2/3.png".to_string(),
            path: dir.path().join("1/2/3.png"),
        };
        download(&entry, &Canned(PNG_MAGIC.to_vec()), &ImageSniffer).unwrap();
        assert_eq!(std::fs::read(&entry.path).unwrap(), PNG_MAGIC);
        assert!(!dir.path().join("1/2/3.png.part").exists());
    }

    #[test]
    fn test_download_removes_text_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let entry = QueueEntry {
            url: "https://tiles/1/2/3.png".to_string(),
            path: dir.path().join("1/2/3.png"),
        };
        let long = "x".repeat(500);
        for body in ["Tile Not Available", long.as_str()] {
            let err = download(&entry, &Canned(body.as_bytes().to_vec()), &ImageSniffer)
                .unwrap_err();
            assert!(matches!(err, FetchError::NotAnImage { ref content_type } if content_type == "text/plain"));
            assert!(!entry.path.exists());
        }
    }

    #[test]
    fn test_failed_store_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the tile should go can't be replaced
        let path = dir.path().join("1/2/3.png");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let entry = QueueEntry {
            url: "https://tiles/1/2/3.png".to_string(),
            path: path.clone(),
        };

        let err = download(&entry, &Canned(PNG_MAGIC.to_vec()), &ImageSniffer).unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
        assert!(path.is_dir());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("1/2"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("3.png")]);
    }

    #[test]
    fn test_queue_rejects_duplicates_of_in_flight() {
        let mut engine =
            TileFetchEngine::new(Arc::new(Canned(PNG_MAGIC.to_vec())), Arc::new(ImageSniffer));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        assert!(engine.queue_download("https://tiles/a.png", &path));
        assert_eq!(engine.in_flight().map(|e| e.path.clone()), Some(path.clone()));
        assert!(!engine.queue_download("https://tiles/a.png", &path));
        assert!(engine.queue().is_empty());
    }
}
