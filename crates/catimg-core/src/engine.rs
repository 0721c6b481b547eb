use crate::analysis::correction::{
    CorrectionAction, CorrectionDetail, CorrectionOutcome, CorrectionResult, Corrector,
};
use crate::analysis::duplicates::{DuplicateDetector, DuplicateReport};
use crate::analysis::integrity::{IntegrityChecker, IntegrityReport};
use crate::backup;
use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::{ProgressReporter, SilentReporter, Stage};
use crate::storage::CategoryRepository;
use crate::store::FileStore;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub cleanup: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
            cleanup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub integrity: IntegrityReport,
    pub duplicates: DuplicateReport,
    pub planned_renames: usize,
    pub planned_repairs: usize,
    pub planned_removals: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub dry_run: bool,
    pub backup_path: Option<PathBuf>,
    pub analysis: Analysis,
    pub migrated: CorrectionResult,
    pub cleaned: CorrectionResult,
    pub integrity_result: Option<IntegrityReport>,
    pub warnings: Vec<String>,
    pub failures: Vec<StageFailure>,
    #[serde(skip)]
    pub duration: Duration,
}

impl MigrationOutcome {
    /// No stage failed, no item errored, and the final scan is clean.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
            && self.migrated.error_count == 0
            && self.cleaned.error_count == 0
            && self
                .integrity_result
                .as_ref()
                .map(IntegrityReport::is_healthy)
                .unwrap_or(false)
    }
}

/// Drives analyze → backup → migrate → cleanup → verify.
///
/// Only `analyze` aborts the run. A failure in a later stage is recorded and
/// the remaining non-mutating stages still run; mutating stages are skipped
/// once the backup stage has failed. Verification never triggers a rollback.
pub struct MigrationOrchestrator<'a> {
    store: &'a FileStore,
    repo: &'a dyn CategoryRepository,
    options: MigrationOptions,
    public_prefix: String,
    backup_before_delete: bool,
    require_image: bool,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> MigrationOrchestrator<'a> {
    pub fn new(config: &AppConfig, store: &'a FileStore, repo: &'a dyn CategoryRepository) -> Self {
        Self {
            store,
            repo,
            options: MigrationOptions::default(),
            public_prefix: config.public_prefix.clone(),
            backup_before_delete: config.backup_before_delete,
            require_image: config.require_image,
            reporter: &SilentReporter,
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn checker(&self) -> IntegrityChecker<'a> {
        IntegrityChecker::new(self.store, self.repo).require_image(self.require_image)
    }

    fn corrector(&self) -> Corrector<'a> {
        Corrector::new(self.store, self.repo)
            .dry_run(self.options.dry_run)
            .backup(self.backup_before_delete)
            .public_prefix(&self.public_prefix)
            .with_reporter(self.reporter)
    }

    pub fn analyze(&self) -> Result<Analysis, Error> {
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Analyze);
        let integrity = self.checker().check()?;
        let duplicates = DuplicateDetector::new(self.store)
            .with_reporter(self.reporter)
            .detect()?;
        let analysis = Analysis {
            planned_renames: integrity.renamable().count(),
            planned_repairs: integrity.missing.len(),
            planned_removals: if self.options.cleanup {
                integrity.orphaned.len()
            } else {
                0
            },
            integrity,
            duplicates,
        };
        self.reporter
            .on_stage_complete(Stage::Analyze, start.elapsed().as_secs_f64());
        info!(
            "Analysis: {} renames, {} missing to repair, {} orphans to remove",
            analysis.planned_renames, analysis.planned_repairs, analysis.planned_removals
        );
        Ok(analysis)
    }

    /// Files the later stages may rename or delete.
    fn at_risk_files(&self, analysis: &Analysis) -> Vec<String> {
        let mut files: Vec<String> = analysis
            .integrity
            .renamable()
            .filter_map(|f| f.filename.clone())
            .collect();
        if self.options.cleanup {
            files.extend(analysis.integrity.orphaned.iter().cloned());
        }
        files.sort();
        files.dedup();
        files
    }

    pub fn create_backup(&self, analysis: &Analysis) -> Result<PathBuf, Error> {
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Backup);
        let (path, _) = backup::create_backup(self.store, self.repo, &self.at_risk_files(analysis))?;
        self.reporter
            .on_stage_complete(Stage::Backup, start.elapsed().as_secs_f64());
        Ok(path)
    }

    pub fn correct_non_unique_and_mismatched(&self, analysis: &Analysis) -> CorrectionResult {
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Migrate);
        let corrector = self.corrector();
        let mut result = corrector.repair_missing(&analysis.integrity.missing);
        result.merge(corrector.rename_to_unique(&analysis.integrity.invalid_naming));
        self.reporter
            .on_stage_complete(Stage::Migrate, start.elapsed().as_secs_f64());
        result
    }

    /// Remove files that are orphaned now. Outside a dry run this rescans, so
    /// files freed up by the rename stage are included. Orphans carrying the id
    /// of a category whose image is still missing are kept for repair.
    ///
    /// In a dry run nothing has changed yet, so files the migrate stage plans to
    /// re-point records at are taken off the orphan list, and the records it
    /// plans to repair no longer count as missing.
    pub fn cleanup_orphans(
        &self,
        analysis: &Analysis,
        migrated: &CorrectionResult,
    ) -> Result<CorrectionResult, Error> {
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Cleanup);
        let report = if self.options.dry_run {
            let planned: Vec<&CorrectionDetail> = migrated
                .details
                .iter()
                .filter(|d| d.outcome == CorrectionOutcome::Planned)
                .collect();
            let claimed: HashSet<&str> = planned
                .iter()
                .filter_map(|d| d.new_filename.as_deref())
                .collect();
            let repaired: HashSet<&str> = planned
                .iter()
                .filter(|d| d.action == CorrectionAction::Repoint)
                .filter_map(|d| d.category_id.as_deref())
                .collect();

            let mut report = analysis.integrity.clone();
            report.orphaned.retain(|f| !claimed.contains(f.as_str()));
            report.missing.retain(|f| {
                f.category_id
                    .as_deref()
                    .map_or(true, |id| !repaired.contains(id))
            });
            report
        } else {
            self.checker().check()?
        };
        let result = self.corrector().remove_orphans_from(&report);
        self.reporter
            .on_stage_complete(Stage::Cleanup, start.elapsed().as_secs_f64());
        Ok(result)
    }

    pub fn verify_integrity(&self) -> Result<IntegrityReport, Error> {
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Verify);
        let report = self.checker().check()?;
        self.reporter
            .on_stage_complete(Stage::Verify, start.elapsed().as_secs_f64());
        Ok(report)
    }

    pub fn run(&self) -> Result<MigrationOutcome, Error> {
        let start = Instant::now();
        let dry_run = self.options.dry_run;
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        info!(
            "Starting migration (dry run: {}, backup: {}, cleanup: {})",
            dry_run, self.options.backup, self.options.cleanup
        );

        let analysis = self.analyze()?;

        let mut backup_path = None;
        let mut may_mutate = true;
        if dry_run {
            debug!("Dry run: backup stage suppressed");
        } else if self.options.backup {
            match self.create_backup(&analysis) {
                Ok(path) => backup_path = Some(path),
                Err(e) => {
                    error!("Backup failed, skipping mutating stages: {}", e);
                    failures.push(stage_failure(Stage::Backup, &e));
                    may_mutate = false;
                }
            }
        } else {
            let message = "Backup disabled: migration runs without a rollback snapshot".to_string();
            warn!("{}", message);
            warnings.push(message);
        }

        let migrated = if may_mutate {
            self.correct_non_unique_and_mismatched(&analysis)
        } else {
            CorrectionResult {
                dry_run,
                ..Default::default()
            }
        };

        let cleaned = if self.options.cleanup && may_mutate {
            match self.cleanup_orphans(&analysis, &migrated) {
                Ok(result) => result,
                Err(e) => {
                    error!("Cleanup stage failed: {}", e);
                    failures.push(stage_failure(Stage::Cleanup, &e));
                    CorrectionResult {
                        dry_run,
                        ..Default::default()
                    }
                }
            }
        } else {
            CorrectionResult {
                dry_run,
                ..Default::default()
            }
        };

        let integrity_result = match self.verify_integrity() {
            Ok(report) => {
                if !report.is_healthy() && !dry_run {
                    warn!("{} integrity issues remain after migration", report.issue_count());
                }
                Some(report)
            }
            Err(e) => {
                error!("Verify stage failed: {}", e);
                failures.push(stage_failure(Stage::Verify, &e));
                None
            }
        };

        let outcome = MigrationOutcome {
            dry_run,
            backup_path,
            analysis,
            migrated,
            cleaned,
            integrity_result,
            warnings,
            failures,
            duration: start.elapsed(),
        };
        info!(
            "Migration finished in {:.2}s: {} migrated, {} cleaned, {} stage failures",
            outcome.duration.as_secs_f64(),
            outcome.migrated.corrected_count,
            outcome.cleaned.corrected_count,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Standalone cleanup: orphans first, then unreferenced duplicates.
    ///
    /// A dry run reports the same totals a real run would remove: files the
    /// orphan pass plans to delete are left out of the duplicate groups.
    pub fn cleanup(&self) -> Result<(CorrectionResult, CorrectionResult), Error> {
        let report = self.checker().check()?;
        let corrector = self.corrector();
        let orphans = corrector.remove_orphans_from(&report);

        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Deduplicate);
        let found = DuplicateDetector::new(self.store)
            .with_reporter(self.reporter)
            .detect()?;
        let duplicates = corrector.deduplicate(&corrector.remaining_groups(&found, &orphans));
        self.reporter
            .on_stage_complete(Stage::Deduplicate, start.elapsed().as_secs_f64());
        Ok((orphans, duplicates))
    }
}

fn stage_failure(stage: Stage, err: &Error) -> StageFailure {
    StageFailure {
        stage: stage.to_string(),
        message: err.to_string(),
    }
}
