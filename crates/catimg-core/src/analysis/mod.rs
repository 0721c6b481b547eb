pub mod correction;
pub mod duplicates;
pub mod health;
pub mod integrity;

pub use correction::{CorrectionDetail, CorrectionOutcome, CorrectionResult, Corrector, FixAllReport};
pub use duplicates::{DuplicateDetector, DuplicateGroup, DuplicateReport};
pub use health::{HealthReport, HealthStatus, Recommendation};
pub use integrity::{orphan_findings, Finding, FindingKind, IntegrityChecker, IntegrityReport};
