//! Device media enumeration and image inspection.

mod directory;

pub use directory::DirectoryMediaSource;

use std::path::{Path, PathBuf};

use crate::Result;

const SUPPORTED_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// One item reported by the device media source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    /// Absolute path of the backing file
    pub path: PathBuf,
    /// Stable media-store identifier
    pub source_id: String,
    /// Last-modified time (Unix ms)
    pub modified_ms: i64,
}

/// One page of a media enumeration, ordered by modification time ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaQuery {
    /// Only entries modified strictly after this time
    pub modified_after: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

/// External enumerable source of device media.
pub trait MediaSource: Send + Sync {
    /// Entries matching `query`, ordered by `(modified_ms, path)` ascending.
    fn enumerate(&self, query: &MediaQuery) -> Result<Vec<MediaEntry>>;
}

/// Size and dimensions of an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// `"{width}x{height}"`
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Whether the extension is one we back up.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(extension))
        })
}

/// MIME type for the upload part.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Inspect a file, returning `None` if it is missing, not a supported
/// extension, or its header does not decode.
pub fn inspect_image(path: &Path) -> Option<ImageInfo> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() || !is_supported_image(path) {
        return None;
    }

    match image::image_dimensions(path) {
        Ok((width, height)) => Some(ImageInfo {
            size_bytes: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            width,
            height,
        }),
        Err(error) => {
            tracing::debug!("Skipping {}: {}", path.display(), error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_png;
    use tempfile::tempdir;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported_image(Path::new("/a/IMG_1.JPG")));
        assert!(is_supported_image(Path::new("b.webp")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("no_extension")));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.JPeG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn inspect_reads_dimensions() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("shot.png");
        write_png(&path, 4, 3);

        let info = inspect_image(&path).unwrap();
        assert_eq!(info.resolution(), "4x3");
        assert!(info.size_bytes > 0);
    }

    #[test]
    fn inspect_skips_missing_and_corrupt_files() {
        let tmp = tempdir().unwrap();
        assert_eq!(inspect_image(&tmp.path().join("gone.jpg")), None);

        let corrupt = tmp.path().join("broken.jpg");
        std::fs::write(&corrupt, b"definitely not a jpeg").unwrap();
        assert_eq!(inspect_image(&corrupt), None);

        let text = tmp.path().join("readme.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert_eq!(inspect_image(&text), None);
    }
}
