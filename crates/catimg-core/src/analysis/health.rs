use crate::analysis::duplicates::{DuplicateDetector, DuplicateReport};
use crate::analysis::integrity::{IntegrityChecker, IntegrityReport};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::CategoryRepository;
use crate::store::FileStore;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => HealthStatus::Excellent,
            75..=89 => HealthStatus::Good,
            50..=74 => HealthStatus::Fair,
            _ => HealthStatus::Poor,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Fair => "fair",
            HealthStatus::Poor => "poor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub title: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total_files: usize,
    pub total_categories: usize,
    pub orphaned: usize,
    pub missing: usize,
    pub invalid_naming: usize,
    pub legacy: usize,
    pub unassigned: usize,
    pub duplicate_groups: usize,
    pub redundant_duplicates: usize,
    pub wasted_bytes: u64,
    pub unreadable: usize,
    pub total_issues: usize,
    pub is_healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub health_score: u8,
    pub status: HealthStatus,
    pub summary: HealthSummary,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: String,
}

/// `max(0, 100 - round(100 * issues / files))`, an empty directory counting as one file.
pub fn health_score(total_issues: usize, total_files: usize) -> u8 {
    let denominator = total_files.max(1) as f64;
    let penalty = (100.0 * total_issues as f64 / denominator).round();
    (100.0 - penalty).max(0.0) as u8
}

impl HealthReport {
    pub fn from_reports(integrity: &IntegrityReport, duplicates: &DuplicateReport) -> Self {
        let redundant = duplicates.redundant_files();
        let total_issues = integrity.issue_count() + redundant;
        let score = health_score(total_issues, integrity.total_files);

        let summary = HealthSummary {
            total_files: integrity.total_files,
            total_categories: integrity.total_records,
            orphaned: integrity.orphaned.len(),
            missing: integrity.missing.len(),
            invalid_naming: integrity.invalid_naming.len(),
            legacy: integrity.legacy.len(),
            unassigned: integrity.unassigned.len(),
            duplicate_groups: duplicates.groups.len(),
            redundant_duplicates: redundant,
            wasted_bytes: duplicates.total_wasted_bytes,
            unreadable: duplicates.unreadable.len(),
            total_issues,
            is_healthy: integrity.is_healthy(),
        };

        HealthReport {
            health_score: score,
            status: HealthStatus::from_score(score),
            recommendations: recommendations(&summary, integrity.require_image),
            summary,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn recommendations(summary: &HealthSummary, require_image: bool) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if summary.missing > 0 {
        out.push(Recommendation {
            priority: Priority::High,
            title: format!("{} categories point at missing images", summary.missing),
            action: "Run `catimg migrate` to re-point records to surviving files; upload new images for the rest".to_string(),
        });
    }
    if summary.unreadable > 0 {
        out.push(Recommendation {
            priority: Priority::High,
            title: format!("{} image files could not be read", summary.unreadable),
            action: "Check file permissions and disk health for the listed files".to_string(),
        });
    }
    if summary.invalid_naming > 0 {
        out.push(Recommendation {
            priority: Priority::Medium,
            title: format!(
                "{} category images use a non-unique or mismatched name ({} legacy)",
                summary.invalid_naming, summary.legacy
            ),
            action: "Run `catimg migrate --dry-run`, review, then `catimg migrate`".to_string(),
        });
    }
    if summary.orphaned > 0 {
        out.push(Recommendation {
            priority: Priority::Medium,
            title: format!("{} image files are not referenced by any category", summary.orphaned),
            action: "Run `catimg cleanup --dry-run`, review, then `catimg cleanup`".to_string(),
        });
    }
    if summary.redundant_duplicates > 0 {
        out.push(Recommendation {
            priority: Priority::Low,
            title: format!(
                "{} duplicate copies waste {} bytes",
                summary.redundant_duplicates, summary.wasted_bytes
            ),
            action: "Run `catimg cleanup` to remove unreferenced duplicates".to_string(),
        });
    }
    if summary.unassigned > 0 {
        out.push(Recommendation {
            priority: if require_image { Priority::Medium } else { Priority::Low },
            title: format!("{} categories have no image", summary.unassigned),
            action: "Upload an image for each category from the admin dashboard".to_string(),
        });
    }

    out.sort_by_key(|r| r.priority);
    out
}

/// Run both scans without mutating anything.
pub fn generate_report(
    store: &FileStore,
    repo: &dyn CategoryRepository,
    require_image: bool,
    reporter: &dyn ProgressReporter,
) -> Result<HealthReport, Error> {
    let integrity = IntegrityChecker::new(store, repo)
        .require_image(require_image)
        .check()?;
    let duplicates = DuplicateDetector::new(store)
        .with_reporter(reporter)
        .detect()?;
    Ok(HealthReport::from_reports(&integrity, &duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_for_two_orphans_out_of_ten() {
        assert_eq!(health_score(2, 10), 80);
        assert_eq!(HealthStatus::from_score(80), HealthStatus::Good);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(health_score(0, 0), 100);
        assert_eq!(health_score(0, 50), 100);
        assert_eq!(health_score(30, 10), 0);
        assert_eq!(health_score(3, 0), 0);
        // 1/3 rounds to 33
        assert_eq!(health_score(1, 3), 67);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(HealthStatus::from_score(100), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(90), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(75), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(74), HealthStatus::Fair);
        assert_eq!(HealthStatus::from_score(49), HealthStatus::Poor);
    }

    #[test]
    fn test_report_from_scan_results() {
        let integrity = IntegrityReport {
            orphaned: vec!["a.jpg".to_string(), "b.jpg".to_string()],
            total_files: 10,
            total_records: 8,
            ..Default::default()
        };
        let report = HealthReport::from_reports(&integrity, &DuplicateReport::default());
        assert_eq!(report.health_score, 80);
        assert_eq!(report.status, HealthStatus::Good);
        assert_eq!(report.summary.total_issues, 2);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].priority, Priority::Medium);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["healthScore"], 80);
        assert_eq!(json["status"], "good");
    }
}
