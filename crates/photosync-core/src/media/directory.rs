//! Media source backed by a directory tree.

use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

use super::{is_supported_image, MediaEntry, MediaQuery, MediaSource};
use crate::Result;

/// Walks `root` recursively and reports supported images.
///
/// The source id is the path relative to `root`, so it stays stable as long
/// as files are not moved. Entries that cannot be read are skipped.
#[derive(Debug, Clone)]
pub struct DirectoryMediaSource {
    root: PathBuf,
}

impl DirectoryMediaSource {
    /// Create a source for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn to_media_entry(&self, entry: &DirEntry) -> Option<MediaEntry> {
        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            return None;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(error) => {
                tracing::warn!("Skipping {}: {}", entry.path().display(), error);
                return None;
            }
        };

        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
        let path = entry.path().to_path_buf();
        let source_id = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        Some(MediaEntry {
            path,
            source_id,
            modified_ms,
        })
    }
}

impl MediaSource for DirectoryMediaSource {
    fn enumerate(&self, query: &MediaQuery) -> Result<Vec<MediaEntry>> {
        // The walker reports a missing root as a skippable entry.
        fs::metadata(&self.root)?;

        let mut entries: Vec<MediaEntry> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!("Skipping unreadable media entry: {}", error);
                    None
                }
            })
            .filter_map(|entry| self.to_media_entry(&entry))
            .filter(|entry| query.modified_after.map_or(true, |after| entry.modified_ms > after))
            .collect();

        entries.sort_by(|a, b| {
            a.modified_ms
                .cmp(&b.modified_ms)
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok(entries
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{set_modified_ms, write_png};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn query(modified_after: Option<i64>, limit: usize, offset: usize) -> MediaQuery {
        MediaQuery {
            modified_after,
            limit,
            offset,
        }
    }

    #[test]
    fn enumerates_nested_images_in_modification_order() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("2024").join("06");
        fs::create_dir_all(&nested).unwrap();

        write_png(&nested.join("late.png"), 1, 1);
        write_png(&tmp.path().join("early.png"), 1, 1);
        fs::write(tmp.path().join("notes.txt"), b"skip me").unwrap();
        set_modified_ms(&nested.join("late.png"), 2_000_000);
        set_modified_ms(&tmp.path().join("early.png"), 1_000_000);

        let source = DirectoryMediaSource::new(tmp.path());
        let entries = source.enumerate(&query(None, 10, 0)).unwrap();

        let ids: Vec<_> = entries.iter().map(|entry| entry.source_id.as_str()).collect();
        assert_eq!(ids, vec!["early.png", "2024/06/late.png"]);
        assert_eq!(entries[0].modified_ms, 1_000_000);
    }

    #[test]
    fn filters_by_cursor_and_pages() {
        let tmp = tempdir().unwrap();
        for (index, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
            let path = tmp.path().join(name);
            write_png(&path, 1, 1);
            set_modified_ms(&path, 1_000_000 * (i64::try_from(index).unwrap() + 1));
        }
        let source = DirectoryMediaSource::new(tmp.path());

        let newer = source.enumerate(&query(Some(1_000_000), 10, 0)).unwrap();
        assert_eq!(newer.len(), 2);
        assert_eq!(newer[0].source_id, "b.png");

        let second_page = source.enumerate(&query(None, 2, 2)).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].source_id, "c.png");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_does_not_stop_the_walk() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        write_png(&locked.join("hidden.png"), 1, 1);
        write_png(&tmp.path().join("visible.png"), 1, 1);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let entries = DirectoryMediaSource::new(tmp.path()).enumerate(&query(None, 10, 0));
        let readable_anyway = fs::read_dir(&locked).is_ok();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let ids: Vec<_> = entries
            .unwrap()
            .into_iter()
            .map(|entry| entry.source_id)
            .collect();
        if readable_anyway {
            // Superuser ignores directory permissions.
            assert_eq!(ids.len(), 2);
        } else {
            assert_eq!(ids, vec!["visible.png".to_string()]);
        }
    }

    #[cfg(unix)]
    #[test]
    fn broken_and_looping_links_are_skipped() {
        let tmp = tempdir().unwrap();
        let album = tmp.path().join("album");
        fs::create_dir(&album).unwrap();
        write_png(&album.join("kept.png"), 1, 1);
        std::os::unix::fs::symlink(tmp.path().join("gone.png"), album.join("dangling.png"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path(), album.join("loop")).unwrap();

        let entries = DirectoryMediaSource::new(tmp.path())
            .enumerate(&query(None, 10, 0))
            .unwrap();
        let ids: Vec<_> = entries.iter().map(|entry| entry.source_id.as_str()).collect();
        assert_eq!(ids, vec!["album/kept.png"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let source = DirectoryMediaSource::new("/definitely/not/here");
        assert!(source.enumerate(&query(None, 10, 0)).is_err());
    }
}
