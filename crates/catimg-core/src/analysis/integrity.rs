use crate::error::Error;
use crate::naming::{self, ImageName};
use crate::records::{referenced_filenames, RecordIndex};
use crate::scanner::ImageFile;
use crate::storage::{CategoryRecord, CategoryRepository};
use crate::store::FileStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Orphaned,
    Missing,
    NonUniqueFormat,
    IdMismatch,
    MissingReference,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingKind::Orphaned => "orphaned",
            FindingKind::Missing => "missing",
            FindingKind::NonUniqueFormat => "non_unique_format",
            FindingKind::IdMismatch => "id_mismatch",
            FindingKind::MissingReference => "missing_reference",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub category_id: Option<String>,
    pub filename: Option<String>,
    pub description: String,
}

impl Finding {
    fn for_record(kind: FindingKind, record: &CategoryRecord, filename: Option<&str>, description: String) -> Self {
        Finding {
            kind,
            category_id: Some(record.id.clone()),
            filename: filename.map(str::to_string),
            description,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub orphaned: Vec<String>,
    pub missing: Vec<Finding>,
    pub invalid_naming: Vec<Finding>,
    /// Categories without any image path.
    pub unassigned: Vec<Finding>,
    /// Referenced files still using the `name_<millis>.<ext>` scheme.
    pub legacy: Vec<String>,
    pub total_files: usize,
    pub total_records: usize,
    pub require_image: bool,
}

impl IntegrityReport {
    pub fn issue_count(&self) -> usize {
        let unassigned = if self.require_image {
            self.unassigned.len()
        } else {
            0
        };
        self.orphaned.len() + self.missing.len() + self.invalid_naming.len() + unassigned
    }

    pub fn is_healthy(&self) -> bool {
        self.issue_count() == 0
    }

    /// Invalid-naming findings that the rename fix can act on.
    pub fn renamable(&self) -> impl Iterator<Item = &Finding> {
        self.invalid_naming.iter().filter(|f| {
            matches!(f.kind, FindingKind::NonUniqueFormat | FindingKind::IdMismatch)
        })
    }

    /// The category whose missing image `filename` could stand in for.
    ///
    /// An unreferenced `cat_<id>_…` file whose id belongs to a record with a
    /// missing finding is what an interrupted rename leaves behind; it must
    /// survive orphan cleanup so the record can be re-pointed to it.
    pub fn held_for_repair(&self, filename: &str) -> Option<&str> {
        let id = naming::extract_category_id(filename)?;
        self.missing
            .iter()
            .filter_map(|f| f.category_id.as_deref())
            .find(|missing_id| *missing_id == id)
    }
}

pub struct IntegrityChecker<'a> {
    store: &'a FileStore,
    records: RecordIndex<'a>,
    require_image: bool,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(store: &'a FileStore, repo: &'a dyn CategoryRepository) -> Self {
        Self {
            store,
            records: RecordIndex::new(repo),
            require_image: false,
        }
    }

    pub fn require_image(mut self, require: bool) -> Self {
        self.require_image = require;
        self
    }

    /// Scan the directory and the category records from scratch.
    pub fn check(&self) -> Result<IntegrityReport, Error> {
        let files = self.store.list_image_files()?;
        let records = self.records.load_all()?;
        let report = evaluate(&files, &records, self.require_image);
        info!(
            "Integrity check: {} files, {} categories, {} orphaned, {} missing, {} invalid naming",
            report.total_files,
            report.total_records,
            report.orphaned.len(),
            report.missing.len(),
            report.invalid_naming.len(),
        );
        Ok(report)
    }
}

/// Compare a directory listing against the category records.
///
/// A record lands in at most one of `missing` / `invalid_naming`: naming is
/// only judged for files that exist.
pub fn evaluate(files: &[ImageFile], records: &[CategoryRecord], require_image: bool) -> IntegrityReport {
    let on_disk: HashSet<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    let referenced = referenced_filenames(records);

    let orphaned: Vec<String> = files
        .iter()
        .filter(|f| !referenced.contains(&f.filename))
        .map(|f| f.filename.clone())
        .collect();

    let mut missing = Vec::new();
    let mut invalid_naming = Vec::new();
    let mut unassigned = Vec::new();
    let mut legacy = Vec::new();

    for record in records {
        let Some(filename) = record.image_filename() else {
            unassigned.push(Finding::for_record(
                FindingKind::MissingReference,
                record,
                None,
                format!("Category {} has no image", record.id),
            ));
            continue;
        };

        if !on_disk.contains(filename) {
            missing.push(Finding::for_record(
                FindingKind::Missing,
                record,
                Some(filename),
                format!("Image file '{}' for category {} does not exist", filename, record.id),
            ));
            continue;
        }

        match ImageName::parse(filename) {
            ImageName::Unique(name) if name.category_id == record.id => {}
            ImageName::Unique(name) => {
                invalid_naming.push(Finding::for_record(
                    FindingKind::IdMismatch,
                    record,
                    Some(filename),
                    format!(
                        "File '{}' is named for category {} but belongs to {}",
                        filename, name.category_id, record.id
                    ),
                ));
            }
            parsed => {
                if matches!(parsed, ImageName::Legacy(_)) {
                    legacy.push(filename.to_string());
                }
                invalid_naming.push(Finding::for_record(
                    FindingKind::NonUniqueFormat,
                    record,
                    Some(filename),
                    format!("File '{}' does not use the unique naming format", filename),
                ));
            }
        }
    }

    debug!(
        "Evaluated {} files against {} records ({} unassigned, {} legacy)",
        files.len(),
        records.len(),
        unassigned.len(),
        legacy.len()
    );

    IntegrityReport {
        orphaned,
        missing,
        invalid_naming,
        unassigned,
        legacy,
        total_files: files.len(),
        total_records: records.len(),
        require_image,
    }
}

/// Orphan findings in the same shape as the record-based ones.
pub fn orphan_findings(report: &IntegrityReport) -> Vec<Finding> {
    report
        .orphaned
        .iter()
        .map(|f| Finding {
            kind: FindingKind::Orphaned,
            category_id: None,
            filename: Some(f.clone()),
            description: format!("File '{}' is not referenced by any category", f),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "507f1f77bcf86cd799439011";
    const ID_B: &str = "507f1f77bcf86cd799439012";

    fn file(name: &str) -> ImageFile {
        ImageFile {
            filename: name.to_string(),
            size_bytes: 10,
            modified_ms: 0,
        }
    }

    #[test]
    fn test_missing_short_circuits_naming_checks() {
        let records = vec![CategoryRecord::new(ID_A, Some("/images/legacy_123.jpg"))];
        let report = evaluate(&[], &records, false);
        assert_eq!(report.missing.len(), 1);
        assert!(report.invalid_naming.is_empty());
        assert!(report.legacy.is_empty());
    }

    #[test]
    fn test_classifies_each_naming_problem() {
        let mismatched = format!("cat_{}_1700000000000_111111.jpg", ID_B);
        let good = format!("cat_{}_1700000000000_222222.jpg", ID_B);
        let files = vec![file("legacy_1700000000000.jpg"), file(&mismatched), file(&good), file("plain.png")];
        let records = vec![
            CategoryRecord::new(ID_A, Some("/images/legacy_1700000000000.jpg")),
            CategoryRecord::new("aaaaaaaaaaaaaaaaaaaaaaaa", Some(&format!("/images/{}", mismatched))),
            CategoryRecord::new(ID_B, Some(&format!("/images/{}", good))),
            CategoryRecord::new("bbbbbbbbbbbbbbbbbbbbbbbb", Some("plain.png")),
        ];

        let report = evaluate(&files, &records, false);
        assert!(report.orphaned.is_empty());
        assert!(report.missing.is_empty());
        let kinds: Vec<FindingKind> = report.invalid_naming.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FindingKind::NonUniqueFormat,
                FindingKind::IdMismatch,
                FindingKind::NonUniqueFormat
            ]
        );
        assert_eq!(report.legacy, vec!["legacy_1700000000000.jpg".to_string()]);
    }

    #[test]
    fn test_orphan_with_missing_records_id_is_held() {
        let leftover = format!("cat_{}_1700000000000_333333.jpg", ID_A);
        let unrelated = format!("cat_{}_1700000000000_444444.jpg", ID_B);
        let files = vec![file(&leftover), file(&unrelated), file("stray.png")];
        let records = vec![CategoryRecord::new(ID_A, Some("/images/pizza_1699999999999.jpg"))];

        let report = evaluate(&files, &records, false);
        assert_eq!(report.orphaned.len(), 3);
        assert_eq!(report.held_for_repair(&leftover), Some(ID_A));
        assert_eq!(report.held_for_repair(&unrelated), None);
        assert_eq!(report.held_for_repair("stray.png"), None);
    }

    #[test]
    fn test_unassigned_counts_only_when_required() {
        let records = vec![CategoryRecord::new(ID_A, None)];
        let lenient = evaluate(&[], &records, false);
        assert_eq!(lenient.unassigned.len(), 1);
        assert!(lenient.is_healthy());

        let strict = evaluate(&[], &records, true);
        assert!(!strict.is_healthy());
        assert_eq!(strict.unassigned[0].kind, FindingKind::MissingReference);
    }

    #[test]
    fn test_finding_serializes_with_type_tag() {
        let finding = Finding {
            kind: FindingKind::IdMismatch,
            category_id: Some(ID_A.to_string()),
            filename: Some("x.jpg".to_string()),
            description: "d".to_string(),
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "id_mismatch");
        assert_eq!(json["categoryId"], ID_A);
    }
}
