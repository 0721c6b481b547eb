//! Point-in-time migration snapshots and operator-driven rollback.
//!
//! A snapshot is a pretty-printed JSON file in the backup directory holding
//! every category record, the full file listing and, for files the migration
//! is about to rename or delete, the location of a saved copy. Snapshots are
//! never deleted by this crate.

use crate::analysis::correction::{CorrectionAction, CorrectionDetail, CorrectionOutcome, CorrectionResult};
use crate::error::Error;
use crate::scanner::ImageFile;
use crate::storage::{CategoryRecord, CategoryRepository};
use crate::store::{BackupReason, FileStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupCounts {
    pub categories: usize,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub modified_ms: i64,
    /// Path of the saved copy relative to the backup directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_copy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupData {
    pub categories: Vec<CategoryRecord>,
    pub files: Vec<BackupFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationBackup {
    pub timestamp: String,
    pub counts: BackupCounts,
    pub data: BackupData,
}

impl MigrationBackup {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn write(&self, path: &Path) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Snapshot records and files, saving copies of `at_risk` files first.
///
/// Returns the path of the JSON artifact.
pub fn create_backup(
    store: &FileStore,
    repo: &dyn CategoryRepository,
    at_risk: &[String],
) -> Result<(PathBuf, MigrationBackup), Error> {
    store.ensure_backup_dir()?;
    let now = chrono::Utc::now();
    let mut stamp = now.format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let mut n = 1;
    while artifact_path(store, &stamp).exists() {
        stamp = format!("{}-{}", now.format("%Y%m%dT%H%M%S%.3fZ"), n);
        n += 1;
    }

    let categories = repo.find_all()?;
    let files = store.list_image_files()?;

    let copies_dir_name = format!("migration_{}", stamp);
    let copies_dir = store.backup_dir().join(&copies_dir_name);
    let at_risk: HashSet<&str> = at_risk.iter().map(String::as_str).collect();

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let saved_copy = if at_risk.contains(file.filename.as_str()) {
            let copy = store.backup_copy_into(&file.filename, &copies_dir, BackupReason::Migration)?;
            let name = copy
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Some(format!("{}/{}", copies_dir_name, name))
        } else {
            None
        };
        entries.push(entry_for(file, saved_copy));
    }

    let backup = MigrationBackup {
        timestamp: now.to_rfc3339(),
        counts: BackupCounts {
            categories: categories.len(),
            files: entries.len(),
        },
        data: BackupData {
            categories,
            files: entries,
        },
    };

    let path = artifact_path(store, &stamp);
    backup.write(&path)?;
    info!(
        "Migration backup written to {} ({} categories, {} files, {} saved copies)",
        path.display(),
        backup.counts.categories,
        backup.counts.files,
        at_risk.len()
    );
    Ok((path, backup))
}

fn artifact_path(store: &FileStore, stamp: &str) -> PathBuf {
    store
        .backup_dir()
        .join(format!("migration_backup_{}.json", stamp))
}

fn entry_for(file: &ImageFile, saved_copy: Option<String>) -> BackupFileEntry {
    BackupFileEntry {
        filename: file.filename.clone(),
        size_bytes: file.size_bytes,
        modified_ms: file.modified_ms,
        saved_copy,
    }
}

/// Snapshot artifacts in the backup directory, oldest first.
pub fn list_backup_artifacts(store: &FileStore) -> Result<Vec<PathBuf>, Error> {
    let mut artifacts: Vec<PathBuf> = store
        .list_backups()?
        .into_iter()
        .filter(|f| f.filename.starts_with("migration_backup_") && f.filename.ends_with(".json"))
        .map(|f| store.backup_dir().join(f.filename))
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

/// Restore every category's image path and every saved file from a snapshot.
///
/// Files created after the snapshot are left alone; a later `cleanup` run
/// reports them as orphans.
pub fn rollback(
    store: &FileStore,
    repo: &dyn CategoryRepository,
    backup_path: &Path,
    dry_run: bool,
) -> Result<CorrectionResult, Error> {
    let backup = MigrationBackup::load(backup_path)?;
    let current: HashMap<String, CategoryRecord> = repo
        .find_all()?
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
    let backup_root = backup_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| store.backup_dir().to_path_buf());

    let mut result = CorrectionResult::new(dry_run);

    for entry in &backup.data.files {
        let Some(saved) = entry.saved_copy.as_deref() else {
            continue;
        };
        if store.exists(&entry.filename) {
            continue;
        }
        let detail = CorrectionDetail::new(CorrectionAction::Restore, None, &entry.filename);
        if dry_run {
            result.record(detail.outcome(CorrectionOutcome::Planned));
            continue;
        }
        match store.restore_from(&backup_root.join(saved), &entry.filename) {
            Ok(()) => result.record(detail.outcome(CorrectionOutcome::Corrected)),
            Err(e) => result.record(detail.outcome(CorrectionOutcome::Failed(e.to_string()))),
        }
    }

    for saved in &backup.data.categories {
        let filename = saved.image_filename().unwrap_or_default();
        let detail = CorrectionDetail::new(CorrectionAction::Repoint, Some(&saved.id), filename);
        let Some(now) = current.get(&saved.id) else {
            result.record(detail.outcome(CorrectionOutcome::Skipped(
                "category no longer exists".to_string(),
            )));
            continue;
        };
        if now.image_path == saved.image_path {
            continue;
        }
        if dry_run {
            result.record(detail.outcome(CorrectionOutcome::Planned));
            continue;
        }
        match repo.update_image_path(&saved.id, saved.image_path.as_deref()) {
            Ok(()) => result.record(detail.outcome(CorrectionOutcome::Corrected)),
            Err(e) => result.record(detail.outcome(CorrectionOutcome::Failed(e.to_string()))),
        }
    }

    if result.error_count > 0 {
        warn!("Rollback finished with {} errors", result.error_count);
    }
    info!(
        "Rollback from {}: {} restored, {} skipped, {} errors",
        backup_path.display(),
        result.corrected_count,
        result.skipped_count,
        result.error_count
    );
    Ok(result)
}

/// Total size of everything in the backup directory, recursively.
pub fn backup_dir_size(store: &FileStore) -> u64 {
    fn walk(dir: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|e| match e.metadata() {
                Ok(m) if m.is_dir() => walk(&e.path()),
                Ok(m) => m.len(),
                Err(_) => 0,
            })
            .sum()
    }
    walk(store.backup_dir())
}
