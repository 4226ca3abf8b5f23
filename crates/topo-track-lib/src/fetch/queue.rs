use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// A pending download: where to get the tile and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub url: String,
    pub path: PathBuf,
}

/// FIFO of pending downloads, deduplicated by destination path
#[derive(Debug, Default)]
pub struct DownloadQueue {
    entries: VecDeque<QueueEntry>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a download
    ///
    /// # Returns
    /// `false` if `path` is empty or already queued
    pub fn push(&mut self, url: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if path.as_os_str().is_empty() || self.contains(&path) {
            return false;
        }
        self.entries.push_back(QueueEntry {
            url: url.into(),
            path,
        });
        true
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_by_path() {
        let mut queue = DownloadQueue::new();
        assert!(queue.push("https://a/12/1/2.png", "/maps/12/1/2.png"));
        assert!(!queue.push("https://a/12/1/2.png", "/maps/12/1/2.png"));
        // Same destination from a different mirror is still a duplicate
        assert!(!queue.push("https://b/12/1/2.png", "/maps/12/1/2.png"));
        assert!(!queue.push("https://a/x.png", ""));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = DownloadQueue::new();
        for i in 0..3 {
            queue.push(format!("https://a/{i}.png"), format!("/maps/{i}.png"));
        }
        assert_eq!(queue.peek().map(|e| e.url.as_str()), Some("https://a/0.png"));
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.path).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("/maps/0.png"),
                PathBuf::from("/maps/1.png"),
                PathBuf::from("/maps/2.png")
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = DownloadQueue::new();
        queue.push("u", "/p");
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.push("u", "/p"));
    }
}
