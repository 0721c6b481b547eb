use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyze,
    Hash,
    Backup,
    Migrate,
    Cleanup,
    Deduplicate,
    Verify,
    Rollback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Analyze => "analyze",
            Stage::Hash => "hash",
            Stage::Backup => "backup",
            Stage::Migrate => "migrate",
            Stage::Cleanup => "cleanup",
            Stage::Deduplicate => "deduplicate",
            Stage::Verify => "verify",
            Stage::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_stage_start(&self, _stage: Stage) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_item_processed(&self, _stage: Stage, _processed: usize, _total: usize) {}
    fn on_stage_complete(&self, _stage: Stage, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
