use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "catimg")]
#[command(about = "Category image integrity checks and migrations", long_about = None)]
pub struct Cli {
    /// Images directory (overrides `images_dir` from Config.toml)
    #[arg(long, global = true)]
    pub images_dir: Option<PathBuf>,

    /// Category database file (overrides `database_path`)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for orphaned, missing, misnamed and duplicate images without changing anything
    Analyze {
        #[arg(long)]
        json: bool,
    },
    /// Back up, rename to the unique format, clean up orphans and verify
    Migrate {
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the rollback snapshot
        #[arg(long)]
        no_backup: bool,
        /// Leave orphaned files in place
        #[arg(long)]
        no_cleanup: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run the integrity check; exits non-zero when issues remain
    Verify {
        #[arg(long)]
        json: bool,
    },
    /// Remove orphaned files and unreferenced duplicates (backed up first)
    Cleanup {
        #[arg(long)]
        dry_run: bool,
        /// Delete without writing backup copies
        #[arg(long)]
        no_backup: bool,
    },
    /// Show file, category and backup counts
    Status,
    /// Print the health report
    Report {
        #[arg(long)]
        json: bool,
    },
    /// Restore category image paths and files from a migration backup
    Rollback {
        /// Path to a migration_backup_*.json file
        backup: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print configuration values
    PrintConfig,
}
