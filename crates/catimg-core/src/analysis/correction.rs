//! Fixes for each kind of finding.
//!
//! Every operation processes its items one by one and records the outcome of
//! each. Errors for a single item are logged and counted, never returned, so a
//! bad file can't abort the rest of the batch.

use crate::analysis::duplicates::{DuplicateDetector, DuplicateGroup, DuplicateReport};
use crate::analysis::integrity::{Finding, FindingKind, IntegrityChecker, IntegrityReport};
use crate::error::Error;
use crate::naming::{self, ImageName};
use crate::progress::{ProgressReporter, SilentReporter, Stage};
use crate::records::owners_by_filename;
use crate::scanner::ImageFile;
use crate::storage::{CategoryRecord, CategoryRepository};
use crate::store::{self, BackupReason, FileStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
    RemoveOrphan,
    RemoveDuplicate,
    Rename,
    CopyToUniqueName,
    Repoint,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    Corrected,
    /// Dry run: this is what would have been done.
    Planned,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionDetail {
    pub action: CorrectionAction,
    pub category_id: Option<String>,
    pub filename: String,
    pub new_filename: Option<String>,
    pub outcome: CorrectionOutcome,
    pub bytes: u64,
}

impl CorrectionDetail {
    pub(crate) fn new(action: CorrectionAction, category_id: Option<&str>, filename: &str) -> Self {
        Self {
            action,
            category_id: category_id.map(str::to_string),
            filename: filename.to_string(),
            new_filename: None,
            outcome: CorrectionOutcome::Corrected,
            bytes: 0,
        }
    }

    pub(crate) fn renamed_to(mut self, new_filename: &str) -> Self {
        self.new_filename = Some(new_filename.to_string());
        self
    }

    pub(crate) fn bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub(crate) fn outcome(mut self, outcome: CorrectionOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResult {
    pub corrected_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
    pub details: Vec<CorrectionDetail>,
}

impl CorrectionResult {
    pub(crate) fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    pub fn record(&mut self, detail: CorrectionDetail) {
        match &detail.outcome {
            CorrectionOutcome::Corrected | CorrectionOutcome::Planned => {
                self.corrected_count += 1;
                if matches!(
                    detail.action,
                    CorrectionAction::RemoveOrphan | CorrectionAction::RemoveDuplicate
                ) {
                    self.bytes_freed += detail.bytes;
                }
            }
            CorrectionOutcome::Skipped(reason) => {
                warn!("Skipped {}: {}", detail.filename, reason);
                self.skipped_count += 1;
            }
            CorrectionOutcome::Failed(message) => {
                error!("Failed {}: {}", detail.filename, message);
                self.error_count += 1;
            }
        }
        self.details.push(detail);
    }

    pub fn merge(&mut self, other: CorrectionResult) {
        self.corrected_count += other.corrected_count;
        self.skipped_count += other.skipped_count;
        self.error_count += other.error_count;
        self.bytes_freed += other.bytes_freed;
        self.details.extend(other.details);
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAllReport {
    pub missing: CorrectionResult,
    pub renamed: CorrectionResult,
    pub orphans: CorrectionResult,
    pub duplicates: CorrectionResult,
}

impl FixAllReport {
    pub fn total_corrected(&self) -> usize {
        self.missing.corrected_count
            + self.renamed.corrected_count
            + self.orphans.corrected_count
            + self.duplicates.corrected_count
    }

    pub fn total_errors(&self) -> usize {
        self.missing.error_count
            + self.renamed.error_count
            + self.orphans.error_count
            + self.duplicates.error_count
    }
}

pub struct Corrector<'a> {
    store: &'a FileStore,
    repo: &'a dyn CategoryRepository,
    backup: bool,
    dry_run: bool,
    public_prefix: String,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Corrector<'a> {
    pub fn new(store: &'a FileStore, repo: &'a dyn CategoryRepository) -> Self {
        Self {
            store,
            repo,
            backup: true,
            dry_run: false,
            public_prefix: "/images/".to_string(),
            reporter: &SilentReporter,
        }
    }

    pub fn backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn public_prefix(mut self, prefix: &str) -> Self {
        self.public_prefix = prefix.to_string();
        self
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    // ── Orphans ─────────────────────────────────────────────────

    pub fn remove_orphans(&self, orphaned: &[String]) -> CorrectionResult {
        let mut result = CorrectionResult::new(self.dry_run);
        if !self.backup && !self.dry_run && !orphaned.is_empty() {
            warn!("Backups disabled: {} orphaned files will be deleted permanently", orphaned.len());
        }

        for (i, filename) in orphaned.iter().enumerate() {
            let detail = CorrectionDetail::new(CorrectionAction::RemoveOrphan, None, filename);
            result.record(self.remove_file(detail, BackupReason::Orphan));
            self.reporter
                .on_item_processed(Stage::Cleanup, i + 1, orphaned.len());
        }

        info!(
            "Orphan cleanup: {} removed, {} skipped, {} errors, {} bytes freed",
            result.corrected_count, result.skipped_count, result.error_count, result.bytes_freed
        );
        result
    }

    /// Remove the orphans of a scan, keeping the ones held for repair.
    ///
    /// A held file carries the id of a category whose image is missing, so it
    /// is reported as skipped rather than deleted.
    pub fn remove_orphans_from(&self, report: &IntegrityReport) -> CorrectionResult {
        let mut held = CorrectionResult::new(self.dry_run);
        let mut removable = Vec::with_capacity(report.orphaned.len());
        for filename in &report.orphaned {
            match report.held_for_repair(filename) {
                Some(id) => held.record(
                    CorrectionDetail::new(CorrectionAction::RemoveOrphan, Some(id), filename).outcome(
                        CorrectionOutcome::Skipped(format!(
                            "kept for category {} whose image is missing",
                            id
                        )),
                    ),
                ),
                None => removable.push(filename.clone()),
            }
        }

        let mut result = self.remove_orphans(&removable);
        result.merge(held);
        result
    }

    fn remove_file(&self, detail: CorrectionDetail, reason: BackupReason) -> CorrectionDetail {
        let size = match self.store.file_info(&detail.filename) {
            Ok(info) => info.size_bytes,
            Err(e) if store::is_not_found(&e) => {
                return detail.outcome(CorrectionOutcome::Skipped("file no longer exists".to_string()));
            }
            Err(e) => return detail.outcome(CorrectionOutcome::Failed(e.to_string())),
        };
        let detail = detail.bytes(size);

        if self.dry_run {
            return detail.outcome(CorrectionOutcome::Planned);
        }

        let removed = if self.backup {
            self.store
                .backup_then_remove(&detail.filename, reason)
                .map(|backup| debug!("Backed up {} to {}", detail.filename, backup.display()))
        } else {
            self.store.remove_without_backup(&detail.filename)
        };

        match removed {
            Ok(()) => detail.outcome(CorrectionOutcome::Corrected),
            Err(e) => detail.outcome(CorrectionOutcome::Failed(e.to_string())),
        }
    }

    // ── Duplicates ──────────────────────────────────────────────

    /// Keep the newest copy of each group and remove the rest. Copies that a
    /// category still references are kept and reported as skipped.
    pub fn deduplicate(&self, groups: &[DuplicateGroup]) -> CorrectionResult {
        let mut result = CorrectionResult::new(self.dry_run);
        let owners = match self.repo.find_all() {
            Ok(records) => owners_by_filename(&records),
            Err(e) => {
                let message = format!("could not load category records: {}", e);
                for group in groups {
                    for filename in group.files.iter().skip(1) {
                        result.record(
                            CorrectionDetail::new(CorrectionAction::RemoveDuplicate, None, filename)
                                .outcome(CorrectionOutcome::Failed(message.clone())),
                        );
                    }
                }
                return result;
            }
        };

        for (i, group) in groups.iter().enumerate() {
            let mut members = group.members.clone();
            members.sort_by(|a, b| {
                b.modified_ms
                    .cmp(&a.modified_ms)
                    .then_with(|| a.filename.cmp(&b.filename))
            });

            let Some(keep) = members.first() else {
                continue;
            };
            debug!("Keeping newest copy {} of group {}", keep.filename, group.content_hash);

            for member in members.iter().skip(1) {
                let detail =
                    CorrectionDetail::new(CorrectionAction::RemoveDuplicate, None, &member.filename);
                if let Some(ids) = owners.get(&member.filename) {
                    result.record(detail.bytes(member.size_bytes).outcome(
                        CorrectionOutcome::Skipped(format!(
                            "duplicate of {} but referenced by category {}",
                            keep.filename,
                            ids.join(", ")
                        )),
                    ));
                    continue;
                }
                result.record(self.remove_file(detail, BackupReason::Duplicate));
            }
            self.reporter
                .on_item_processed(Stage::Deduplicate, i + 1, groups.len());
        }

        info!(
            "Deduplication: {} removed, {} skipped, {} errors, {} bytes freed",
            result.corrected_count, result.skipped_count, result.error_count, result.bytes_freed
        );
        result
    }

    // ── Non-unique / mismatched names ───────────────────────────

    /// Give each flagged file a fresh unique name for the category that
    /// references it and point the record at it.
    ///
    /// A file still referenced by another category is copied instead of renamed.
    /// If the rename succeeds but the record update fails, the record is left
    /// pointing at the old name and shows up as missing on the next scan.
    pub fn rename_to_unique(&self, findings: &[Finding]) -> CorrectionResult {
        let mut result = CorrectionResult::new(self.dry_run);
        let targets: Vec<&Finding> = findings
            .iter()
            .filter(|f| matches!(f.kind, FindingKind::NonUniqueFormat | FindingKind::IdMismatch))
            .collect();

        let records = match self.repo.find_all() {
            Ok(records) => records,
            Err(e) => {
                let message = format!("could not load category records: {}", e);
                for finding in targets {
                    result.record(
                        CorrectionDetail::new(
                            CorrectionAction::Rename,
                            finding.category_id.as_deref(),
                            finding.filename.as_deref().unwrap_or_default(),
                        )
                        .outcome(CorrectionOutcome::Failed(message.clone())),
                    );
                }
                return result;
            }
        };
        let by_id: HashMap<&str, &CategoryRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut owners = owners_by_filename(&records);

        for (i, finding) in targets.iter().enumerate() {
            let detail = self.rename_one(finding, &by_id, &mut owners);
            result.record(detail);
            self.reporter
                .on_item_processed(Stage::Migrate, i + 1, targets.len());
        }

        info!(
            "Rename to unique format: {} renamed, {} skipped, {} errors",
            result.corrected_count, result.skipped_count, result.error_count
        );
        result
    }

    fn rename_one(
        &self,
        finding: &Finding,
        by_id: &HashMap<&str, &CategoryRecord>,
        owners: &mut HashMap<String, Vec<String>>,
    ) -> CorrectionDetail {
        let filename = finding.filename.as_deref().unwrap_or_default();
        let category_id = finding.category_id.as_deref().unwrap_or_default();
        let shared = owners
            .get(filename)
            .map(|ids| ids.iter().any(|id| id != category_id))
            .unwrap_or(false);
        let action = if shared {
            CorrectionAction::CopyToUniqueName
        } else {
            CorrectionAction::Rename
        };
        let detail = CorrectionDetail::new(action, Some(category_id), filename);

        let Some(record) = by_id.get(category_id) else {
            return detail.outcome(CorrectionOutcome::Skipped("category no longer exists".to_string()));
        };
        if record.image_filename() != Some(filename) {
            return detail.outcome(CorrectionOutcome::Skipped(
                "category image changed since the scan".to_string(),
            ));
        }

        let extension = naming::extension_of(filename).unwrap_or(DEFAULT_EXTENSION);
        let new_filename = match naming::generate(category_id, extension) {
            Ok(name) => name,
            Err(Error::InvalidCategoryId(id)) => {
                return detail.outcome(CorrectionOutcome::Skipped(format!(
                    "category id '{}' can't be encoded in a unique name; requires manual intervention",
                    id
                )));
            }
            Err(e) => return detail.outcome(CorrectionOutcome::Failed(e.to_string())),
        };
        let detail = detail.renamed_to(&new_filename);

        if self.dry_run {
            return detail.outcome(CorrectionOutcome::Planned);
        }

        let moved = if shared {
            self.store.copy(filename, &new_filename).map(|_| ())
        } else {
            self.store.rename(filename, &new_filename)
        };
        match moved {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                return detail.outcome(CorrectionOutcome::Skipped(format!(
                    "target {} already exists",
                    new_filename
                )));
            }
            Err(e) => return detail.outcome(CorrectionOutcome::Failed(e.to_string())),
        }

        let new_path = record.image_path_for(&new_filename, &self.public_prefix);
        if let Err(e) = self.repo.update_image_path(category_id, Some(&new_path)) {
            return detail.outcome(CorrectionOutcome::Failed(format!(
                "file is now {} but updating category {} failed ({}); it will be reported as missing until repaired",
                new_filename, category_id, e
            )));
        }

        if let Some(ids) = owners.get_mut(filename) {
            ids.retain(|id| id != category_id);
        }
        owners
            .entry(new_filename.clone())
            .or_default()
            .push(category_id.to_string());
        debug!("Category {}: {} -> {}", category_id, filename, new_filename);
        detail.outcome(CorrectionOutcome::Corrected)
    }

    // ── Missing files ───────────────────────────────────────────

    /// Re-point records whose file is gone to a file already carrying their
    /// id, left behind by an interrupted migration. Records without such a
    /// file are reported as skipped, never dropped.
    pub fn repair_missing(&self, findings: &[Finding]) -> CorrectionResult {
        let mut result = CorrectionResult::new(self.dry_run);
        let targets: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::Missing)
            .collect();
        if targets.is_empty() {
            return result;
        }

        let loaded = self
            .store
            .list_image_files()
            .and_then(|files| self.repo.find_all().map(|records| (files, records)));
        let (files, records) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                let message = format!("could not scan images or categories: {}", e);
                for finding in targets {
                    result.record(
                        CorrectionDetail::new(
                            CorrectionAction::Repoint,
                            finding.category_id.as_deref(),
                            finding.filename.as_deref().unwrap_or_default(),
                        )
                        .outcome(CorrectionOutcome::Failed(message.clone())),
                    );
                }
                return result;
            }
        };
        let by_id: HashMap<&str, &CategoryRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut owners = owners_by_filename(&records);

        for (i, finding) in targets.iter().enumerate() {
            let detail = self.repair_one(finding, &files, &by_id, &mut owners);
            result.record(detail);
            self.reporter
                .on_item_processed(Stage::Migrate, i + 1, targets.len());
        }

        info!(
            "Missing file repair: {} re-pointed, {} need manual intervention, {} errors",
            result.corrected_count, result.skipped_count, result.error_count
        );
        result
    }

    fn repair_one(
        &self,
        finding: &Finding,
        files: &[ImageFile],
        by_id: &HashMap<&str, &CategoryRecord>,
        owners: &mut HashMap<String, Vec<String>>,
    ) -> CorrectionDetail {
        let filename = finding.filename.as_deref().unwrap_or_default();
        let category_id = finding.category_id.as_deref().unwrap_or_default();
        let detail = CorrectionDetail::new(CorrectionAction::Repoint, Some(category_id), filename);

        let candidate = files
            .iter()
            .filter_map(|f| match ImageName::parse(&f.filename) {
                ImageName::Unique(name) if name.category_id == category_id => {
                    Some((name.timestamp, name.nonce, f.filename.as_str()))
                }
                _ => None,
            })
            .filter(|(_, _, name)| {
                owners
                    .get(*name)
                    .map(|ids| ids.iter().all(|id| id == category_id))
                    .unwrap_or(true)
            })
            .max();

        let Some((_, _, replacement)) = candidate else {
            return detail.outcome(CorrectionOutcome::Skipped(
                "no file for this category on disk; requires manual intervention".to_string(),
            ));
        };
        let detail = detail.renamed_to(replacement);

        if self.dry_run {
            return detail.outcome(CorrectionOutcome::Planned);
        }

        let Some(record) = by_id.get(category_id) else {
            return detail.outcome(CorrectionOutcome::Skipped(
                "category no longer exists".to_string(),
            ));
        };
        let new_path = record.image_path_for(replacement, &self.public_prefix);
        match self.repo.update_image_path(category_id, Some(&new_path)) {
            Ok(()) => {
                owners
                    .entry(replacement.to_string())
                    .or_default()
                    .push(category_id.to_string());
                detail.outcome(CorrectionOutcome::Corrected)
            }
            Err(e) => detail.outcome(CorrectionOutcome::Failed(e.to_string())),
        }
    }

    // ── Everything ──────────────────────────────────────────────

    /// Duplicate groups as they stand once `removed` has been applied.
    ///
    /// Outside a dry run the files are already gone and the groups come from a
    /// fresh scan. In a dry run, files the orphan pass only planned to remove
    /// are dropped here so they aren't counted twice.
    pub fn remaining_groups(
        &self,
        duplicates: &DuplicateReport,
        removed: &CorrectionResult,
    ) -> Vec<DuplicateGroup> {
        if !self.dry_run {
            return duplicates.groups.clone();
        }
        let planned: HashSet<&str> = removed
            .details
            .iter()
            .filter(|d| d.outcome == CorrectionOutcome::Planned)
            .map(|d| d.filename.as_str())
            .collect();
        duplicates.without_files(&planned)
    }

    /// Rescan before each step so every fix sees the effects of the previous one.
    pub fn fix_all(&self) -> Result<FixAllReport, Error> {
        let checker = IntegrityChecker::new(self.store, self.repo);

        let report = checker.check()?;
        let missing = self.repair_missing(&report.missing);

        let report = checker.check()?;
        let renamed = self.rename_to_unique(&report.invalid_naming);

        let report = checker.check()?;
        let orphans = self.remove_orphans_from(&report);

        let duplicates_report = DuplicateDetector::new(self.store)
            .with_reporter(self.reporter)
            .detect()?;
        let duplicates = self.deduplicate(&self.remaining_groups(&duplicates_report, &orphans));

        let fix = FixAllReport {
            missing,
            renamed,
            orphans,
            duplicates,
        };
        info!(
            "Fix all: {} corrections, {} errors",
            fix.total_corrected(),
            fix.total_errors()
        );
        Ok(fix)
    }
}
