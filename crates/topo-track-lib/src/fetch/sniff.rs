use super::{ContentSniffer, ImageLoader};
use std::path::Path;

/// Recognises image bodies by their magic bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSniffer;

impl ContentSniffer for ImageSniffer {
    fn sniff(&self, bytes: &[u8]) -> String {
        match image::guess_format(bytes) {
            Ok(format) => format.to_mime_type().to_string(),
            Err(_) if std::str::from_utf8(bytes).is_ok() => "text/plain".to_string(),
            Err(_) => "application/octet-stream".to_string(),
        }
    }
}

/// Decodes tiles with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateLoader;

impl ImageLoader for ImageCrateLoader {
    fn load(&self, path: &Path) -> crate::tiles::Result<image::DynamicImage> {
        Ok(image::open(path)?)
    }
}
