pub mod analysis;
pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod naming;
pub mod progress;
pub mod records;
pub mod scanner;
pub mod storage;
pub mod store;

pub use config::AppConfig;
pub use engine::{MigrationOptions, MigrationOrchestrator, MigrationOutcome};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter, Stage};
pub use records::RecordIndex;
pub use storage::{CategoryRecord, CategoryRepository, Database};
pub use store::FileStore;
