//! The images directory: one root, one `.backups` subdirectory, no nesting.

use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::{self, ContentHash};
use crate::scanner::{self, ImageFile};
use dashmap::DashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupReason {
    Orphan,
    Duplicate,
    Migration,
}

impl BackupReason {
    pub fn prefix(&self) -> &'static str {
        match self {
            BackupReason::Orphan => "orphan",
            BackupReason::Duplicate => "duplicate",
            BackupReason::Migration => "migration",
        }
    }
}

/// Hook invoked right before a file is unlinked.
///
/// `backup` is the copy written for it, or `None` when removal skips backups.
pub trait StoreObserver: Send + Sync {
    fn before_remove(&self, _original: &Path, _backup: Option<&Path>) {}
}

pub struct SilentObserver;

impl StoreObserver for SilentObserver {}

pub struct FileStore {
    root: PathBuf,
    backup_dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
    observer: Arc<dyn StoreObserver>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, backup_dir_name: &str) -> Self {
        let root = root.into();
        let backup_dir = root.join(backup_dir_name);
        Self {
            root,
            backup_dir,
            locks: DashMap::new(),
            observer: Arc::new(SilentObserver),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.images_dir.clone(), &config.backup_dir_name)
    }

    pub fn with_observer(mut self, observer: Arc<dyn StoreObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Absolute path of a file in the images directory. Rejects anything that
    /// would escape the flat layout.
    pub fn path_of(&self, filename: &str) -> Result<PathBuf, Error> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(Error::Other(format!("Invalid image filename '{}'", filename)));
        }
        Ok(self.root.join(filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_of(filename)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    pub fn list_image_files(&self) -> Result<Vec<ImageFile>, Error> {
        Ok(scanner::list_image_files(&self.root)?)
    }

    pub fn file_info(&self, filename: &str) -> Result<ImageFile, Error> {
        let metadata = fs::metadata(self.path_of(filename)?)?;
        Ok(ImageFile::from_metadata(filename.to_string(), &metadata))
    }

    pub fn hash(&self, filename: &str) -> Result<ContentHash, Error> {
        Ok(hasher::hash_file(&self.path_of(filename)?)?)
    }

    pub fn ensure_backup_dir(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.backup_dir)?;
        Ok(())
    }

    pub fn list_backups(&self) -> Result<Vec<ImageFile>, Error> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(scanner::list_image_files(&self.backup_dir)?)
    }

    /// Run `op` holding the locks of every name in `names`.
    ///
    /// Locks are taken in name order so two opposite renames can't deadlock.
    /// Entries nobody else is waiting on are dropped afterwards, so the table
    /// only holds names currently in use.
    fn with_locks<T>(&self, names: &[&str], op: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();

        let locks: Vec<Arc<Mutex<()>>> = names
            .iter()
            .map(|name| self.locks.entry(name.to_string()).or_default().clone())
            .collect();
        let guards: Vec<MutexGuard<'_, ()>> = locks
            .iter()
            .map(|lock| lock.lock().unwrap_or_else(|e| e.into_inner()))
            .collect();

        let result = op();

        drop(guards);
        for name in &names {
            // Held by the table and by `locks` only.
            self.locks
                .remove_if(*name, |_, lock| Arc::strong_count(lock) == 2);
        }
        result
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.len()
    }

    /// Copy `filename` into the backup directory as `<reason>_<millis>_<filename>`,
    /// confirm the copy, then delete the original.
    ///
    /// The original is only removed once the backup is on disk with the same
    /// length. A failed delete leaves the backup in place.
    pub fn backup_then_remove(&self, filename: &str, reason: BackupReason) -> Result<PathBuf, Error> {
        let source = self.path_of(filename)?;
        self.with_locks(&[filename], || {
            let source_len = fs::metadata(&source)?.len();
            let backup = self.write_backup_copy(&source, filename, reason)?;

            match fs::metadata(&backup) {
                Ok(m) if m.len() == source_len => {}
                _ => return Err(Error::BackupMissing { path: backup }),
            }

            self.observer.before_remove(&source, Some(&backup));
            if let Err(e) = fs::remove_file(&source) {
                warn!(
                    "Backup written to {} but removing {} failed: {}",
                    backup.display(),
                    source.display(),
                    e
                );
                return Err(e.into());
            }
            debug!("Removed {} (backup {})", filename, backup.display());
            Ok(backup)
        })
    }

    /// Delete without keeping a copy. Only used when backups are disabled.
    pub fn remove_without_backup(&self, filename: &str) -> Result<(), Error> {
        let source = self.path_of(filename)?;
        self.with_locks(&[filename], || {
            self.observer.before_remove(&source, None);
            fs::remove_file(&source)?;
            debug!("Removed {} (no backup)", filename);
            Ok(())
        })
    }

    /// Copy a file into `dest_dir` under a reason-prefixed, timestamped name
    /// without touching the original.
    pub fn backup_copy_into(
        &self,
        filename: &str,
        dest_dir: &Path,
        reason: BackupReason,
    ) -> Result<PathBuf, Error> {
        let source = self.path_of(filename)?;
        fs::create_dir_all(dest_dir)?;
        let target = unique_backup_path(dest_dir, reason, filename);
        fs::copy(&source, &target)?;
        Ok(target)
    }

    fn write_backup_copy(
        &self,
        source: &Path,
        filename: &str,
        reason: BackupReason,
    ) -> Result<PathBuf, Error> {
        self.ensure_backup_dir()?;
        let target = unique_backup_path(&self.backup_dir, reason, filename);
        fs::copy(source, &target)?;
        Ok(target)
    }

    /// Rename within the images directory. Never overwrites: an existing
    /// target yields `Error::Conflict`.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), Error> {
        let from = self.path_of(old)?;
        let to = self.path_of(new)?;
        self.with_locks(&[old, new], || {
            if to.exists() {
                return Err(Error::Conflict { path: to.clone() });
            }
            if !from.is_file() {
                return Err(Error::NotFound(from.display().to_string()));
            }
            fs::rename(&from, &to)?;
            debug!("Renamed {} -> {}", old, new);
            Ok(())
        })
    }

    /// Copy within the images directory, same conflict rule as `rename`.
    pub fn copy(&self, from_name: &str, to_name: &str) -> Result<u64, Error> {
        let from = self.path_of(from_name)?;
        let to = self.path_of(to_name)?;
        self.with_locks(&[from_name, to_name], || {
            if to.exists() {
                return Err(Error::Conflict { path: to.clone() });
            }
            let bytes = fs::copy(&from, &to)?;
            debug!("Copied {} -> {}", from_name, to_name);
            Ok(bytes)
        })
    }

    /// Put a previously saved copy back under `filename`, refusing to overwrite.
    pub fn restore_from(&self, saved: &Path, filename: &str) -> Result<(), Error> {
        let target = self.path_of(filename)?;
        self.with_locks(&[filename], || {
            if target.exists() {
                return Err(Error::Conflict { path: target.clone() });
            }
            if !saved.is_file() {
                return Err(Error::NotFound(saved.display().to_string()));
            }
            fs::copy(saved, &target)?;
            Ok(())
        })
    }
}

fn unique_backup_path(dir: &Path, reason: BackupReason, filename: &str) -> PathBuf {
    let ts = chrono::Utc::now().timestamp_millis();
    let base = format!("{}_{}_{}", reason.prefix(), ts, filename);
    let mut candidate = dir.join(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}_{}_{}", reason.prefix(), ts, n, filename));
        n += 1;
    }
    candidate
}

pub(crate) fn is_not_found(err: &Error) -> bool {
    match err {
        Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
        Error::NotFound(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), ".backups");
        (dir, store)
    }

    #[test]
    fn test_lock_table_empties_after_operations() {
        let (_dir, store) = store();
        fs::write(store.root().join("a.jpg"), b"a").unwrap();
        fs::write(store.root().join("b.jpg"), b"b").unwrap();

        store.rename("a.jpg", "c.jpg").unwrap();
        store.copy("c.jpg", "d.jpg").unwrap();
        assert!(store.rename("c.jpg", "b.jpg").unwrap_err().is_conflict());
        store.backup_then_remove("d.jpg", BackupReason::Orphan).unwrap();

        assert_eq!(store.lock_table_len(), 0);
    }

    #[test]
    fn test_rename_refuses_to_overwrite() {
        let (_dir, store) = store();
        fs::write(store.root().join("a.jpg"), b"a").unwrap();
        fs::write(store.root().join("b.jpg"), b"b").unwrap();

        let err = store.rename("a.jpg", "b.jpg").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(fs::read(store.root().join("b.jpg")).unwrap(), b"b");
        assert!(store.exists("a.jpg"));
    }

    #[test]
    fn test_rename_moves_file() {
        let (_dir, store) = store();
        fs::write(store.root().join("a.jpg"), b"a").unwrap();
        store.rename("a.jpg", "c.jpg").unwrap();
        assert!(!store.exists("a.jpg"));
        assert!(store.exists("c.jpg"));
    }

    #[test]
    fn test_backup_then_remove_keeps_prefixed_copy() {
        let (_dir, store) = store();
        fs::write(store.root().join("old.png"), b"pixels").unwrap();

        let backup = store
            .backup_then_remove("old.png", BackupReason::Orphan)
            .unwrap();
        assert!(!store.exists("old.png"));
        assert_eq!(fs::read(&backup).unwrap(), b"pixels");
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("orphan_"));
        assert!(name.ends_with("_old.png"));
        assert_eq!(backup.parent().unwrap(), store.backup_dir());
    }

    #[test]
    fn test_backup_names_do_not_collide() {
        let (_dir, store) = store();
        fs::write(store.root().join("x.png"), b"1").unwrap();
        let first = store.backup_then_remove("x.png", BackupReason::Duplicate).unwrap();
        fs::write(store.root().join("x.png"), b"2").unwrap();
        let second = store.backup_then_remove("x.png", BackupReason::Duplicate).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"1");
        assert_eq!(fs::read(&second).unwrap(), b"2");
    }

    #[test]
    fn test_path_of_rejects_traversal() {
        let (_dir, store) = store();
        assert!(store.path_of("../etc/passwd").is_err());
        assert!(store.path_of("..").is_err());
        assert!(store.path_of("").is_err());
        assert!(store.path_of("ok.jpg").is_ok());
    }

    #[test]
    fn test_list_backups_is_empty_without_directory() {
        let (_dir, store) = store();
        assert!(store.list_backups().unwrap().is_empty());
    }
}
