use crate::error::Error;
use crate::hasher::ContentHash;
use crate::progress::{ProgressReporter, SilentReporter, Stage};
use crate::scanner::ImageFile;
use crate::store::FileStore;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub files: Vec<String>,
    pub size_bytes: u64,
    #[serde(skip)]
    pub members: Vec<ImageFile>,
}

impl DuplicateGroup {
    pub fn wasted_bytes(&self) -> u64 {
        self.size_bytes * (self.files.len() as u64).saturating_sub(1)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub total_wasted_bytes: u64,
    pub files_hashed: usize,
    /// Files that could not be read and were left out of grouping.
    pub unreadable: Vec<String>,
}

impl DuplicateReport {
    /// Copies beyond the first in every group.
    pub fn redundant_files(&self) -> usize {
        self.groups.iter().map(|g| g.files.len() - 1).sum()
    }

    /// Groups with `excluded` files taken out. Groups left with a single copy
    /// are no longer duplicates and are dropped.
    pub fn without_files(&self, excluded: &HashSet<&str>) -> Vec<DuplicateGroup> {
        self.groups
            .iter()
            .filter_map(|group| {
                let members: Vec<ImageFile> = group
                    .members
                    .iter()
                    .filter(|m| !excluded.contains(m.filename.as_str()))
                    .cloned()
                    .collect();
                if members.len() < 2 {
                    return None;
                }
                Some(DuplicateGroup {
                    content_hash: group.content_hash.clone(),
                    files: members.iter().map(|m| m.filename.clone()).collect(),
                    size_bytes: group.size_bytes,
                    members,
                })
            })
            .collect()
    }
}

pub struct DuplicateDetector<'a> {
    store: &'a FileStore,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self {
            store,
            reporter: &SilentReporter,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Hash every file once, in parallel, and group identical content.
    pub fn detect(&self) -> Result<DuplicateReport, Error> {
        let files = self.store.list_image_files()?;
        let total = files.len();
        let start = Instant::now();
        self.reporter.on_stage_start(Stage::Hash);

        let hash_to_files: DashMap<ContentHash, Vec<ImageFile>> = DashMap::new();
        let hashed = AtomicUsize::new(0);

        let mut unreadable: Vec<String> = files
            .par_iter()
            .filter_map(|file| {
                let result = self.store.hash(&file.filename);
                let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                self.reporter.on_hash_progress(done, total);
                match result {
                    Ok(hash) => {
                        hash_to_files.entry(hash).or_default().push(file.clone());
                        None
                    }
                    Err(e) => {
                        error!("Error hashing '{}', excluded from duplicate detection: {}", file.filename, e);
                        Some(file.filename.clone())
                    }
                }
            })
            .collect();
        unreadable.sort();

        let mut groups: Vec<DuplicateGroup> = hash_to_files
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(hash, mut members)| {
                members.sort_by(|a, b| a.filename.cmp(&b.filename));
                DuplicateGroup {
                    content_hash: hash.to_string(),
                    files: members.iter().map(|m| m.filename.clone()).collect(),
                    size_bytes: members[0].size_bytes,
                    members,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));

        let total_wasted_bytes = groups.iter().map(DuplicateGroup::wasted_bytes).sum();
        self.reporter
            .on_stage_complete(Stage::Hash, start.elapsed().as_secs_f64());
        info!(
            "Duplicate detection: {} files hashed, {} groups, {} bytes wasted, {} unreadable",
            total - unreadable.len(),
            groups.len(),
            total_wasted_bytes,
            unreadable.len()
        );

        Ok(DuplicateReport {
            groups,
            total_wasted_bytes,
            files_hashed: total - unreadable.len(),
            unreadable,
        })
    }
}
