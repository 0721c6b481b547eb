use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::error;

/// A regular file directly under the images directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFile {
    pub filename: String,
    pub size_bytes: u64,
    /// Milliseconds since the Unix epoch, 0 when the platform does not report it.
    pub modified_ms: i64,
}

impl ImageFile {
    pub fn from_metadata(filename: String, metadata: &fs::Metadata) -> Self {
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        ImageFile {
            filename,
            size_bytes: metadata.len(),
            modified_ms,
        }
    }
}

/// List the regular files of a flat directory, sorted by name.
///
/// Dotfiles, subdirectories (including the backup directory) and symlinks are
/// skipped. Entries whose metadata can't be read are logged and left out; only
/// failure to read the directory itself is an error.
pub fn list_image_files(dir: &Path) -> io::Result<Vec<ImageFile>> {
    let entries = fs::read_dir(dir).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading directory {}: {}", dir.display(), err),
        )
    })?;

    let mut files: Vec<ImageFile> = entries
        .par_bridge()
        .filter_map(|entry_result| {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Error reading entry in directory {}: {}", dir.display(), err);
                    return None;
                }
            };

            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename.starts_with('.') {
                return None;
            }

            let metadata = match fs::symlink_metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!(
                        "Error getting metadata for {}: {}",
                        entry.path().display(),
                        err
                    );
                    return None;
                }
            };

            if !metadata.file_type().is_file() {
                return None;
            }

            Some(ImageFile::from_metadata(filename, &metadata))
        })
        .collect();

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_only_visible_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"bb").unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(dir.path().join(".backups")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.jpg"), b"c").unwrap();

        let files = list_image_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
        assert_eq!(files[1].size_bytes, 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_image_files(&dir.path().join("absent")).is_err());
    }
}
