mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use catimg_core::analysis::correction::{CorrectionOutcome, CorrectionResult};
use catimg_core::analysis::health::{self, HealthReport};
use catimg_core::analysis::{self, DuplicateReport, IntegrityReport};
use catimg_core::backup;
use catimg_core::naming::ImageName;
use catimg_core::{
    AppConfig, Database, FileStore, MigrationOptions, MigrationOrchestrator, MigrationOutcome,
};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::error;

const EXIT_ISSUES: u8 = 1;
const EXIT_FAILURE: u8 = 2;

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match catimg_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let args = Cli::parse();
    if let Some(dir) = args.images_dir {
        config = config.with_images_dir(dir);
    }
    if let Some(db) = args.database {
        config = config.with_database_path(db);
    }

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return ExitCode::SUCCESS;
    };

    let result = match command {
        Commands::Analyze { json } => run_analyze(&config, json),
        Commands::Migrate {
            dry_run,
            no_backup,
            no_cleanup,
            json,
        } => run_migrate(
            &config,
            MigrationOptions {
                dry_run,
                backup: !no_backup,
                cleanup: !no_cleanup,
            },
            json,
        ),
        Commands::Verify { json } => run_verify(&config, json),
        Commands::Cleanup { dry_run, no_backup } => run_cleanup(&config, dry_run, no_backup),
        Commands::Status => run_status(&config),
        Commands::Report { json } => run_report(&config, json),
        Commands::Rollback { backup, dry_run } => run_rollback(&config, &backup, dry_run),
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {}", err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn open(config: &AppConfig) -> Result<(FileStore, Database), Box<dyn std::error::Error>> {
    let store = FileStore::from_config(config);
    let db = Database::open_with_timeout(
        &config.database_path,
        Duration::from_millis(config.query_timeout_ms),
    )?;
    Ok((store, db))
}

fn exit_for(healthy: bool) -> ExitCode {
    if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_ISSUES)
    }
}

fn run_analyze(config: &AppConfig, json: bool) -> CliResult {
    let (store, db) = open(config)?;
    let reporter = CliReporter::new();
    let orchestrator = MigrationOrchestrator::new(config, &store, &db).with_reporter(&reporter);
    let analysis = orchestrator.analyze()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_integrity(&analysis.integrity);
        print_duplicates(&analysis.duplicates);
        println!();
        println!(
            "Planned: {} renames, {} missing-file repairs, {} orphan removals",
            analysis.planned_renames.to_string().cyan(),
            analysis.planned_repairs.to_string().cyan(),
            analysis.planned_removals.to_string().cyan(),
        );
    }
    Ok(exit_for(analysis.integrity.is_healthy()))
}

fn run_migrate(config: &AppConfig, options: MigrationOptions, json: bool) -> CliResult {
    let (store, db) = open(config)?;
    let reporter = CliReporter::new();
    let outcome = MigrationOrchestrator::new(config, &store, &db)
        .with_options(options)
        .with_reporter(&reporter)
        .run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_migration(&outcome);
    }

    let ok = if outcome.dry_run {
        outcome.failures.is_empty()
    } else {
        outcome.succeeded()
    };
    Ok(exit_for(ok))
}

fn run_verify(config: &AppConfig, json: bool) -> CliResult {
    let (store, db) = open(config)?;
    let orchestrator = MigrationOrchestrator::new(config, &store, &db);
    let report = orchestrator.verify_integrity()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_integrity(&report);
    }
    Ok(exit_for(report.is_healthy()))
}

fn run_cleanup(config: &AppConfig, dry_run: bool, no_backup: bool) -> CliResult {
    let mut config = config.clone();
    if no_backup {
        config.backup_before_delete = false;
    }
    let (store, db) = open(&config)?;
    let reporter = CliReporter::new();
    let (orphans, duplicates) = MigrationOrchestrator::new(&config, &store, &db)
        .with_options(MigrationOptions {
            dry_run,
            ..Default::default()
        })
        .with_reporter(&reporter)
        .cleanup()?;

    print_correction("Orphans", &orphans);
    print_correction("Duplicates", &duplicates);
    Ok(exit_for(orphans.is_clean() && duplicates.is_clean()))
}

fn run_status(config: &AppConfig) -> CliResult {
    let (store, db) = open(config)?;
    let files = store.list_image_files()?;
    let categories = db.find_all_categories()?;
    let backups = store.list_backups()?;
    let artifacts = backup::list_backup_artifacts(&store)?;

    let (mut unique, mut legacy, mut other, mut non_image) = (0, 0, 0, 0);
    for file in &files {
        if !config.is_image_extension(&file.filename) {
            non_image += 1;
        }
        match ImageName::parse(&file.filename) {
            ImageName::Unique(_) => unique += 1,
            ImageName::Legacy(_) => legacy += 1,
            ImageName::Unrecognized => other += 1,
        }
    }
    let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
    let with_image = categories.iter().filter(|c| c.image_filename().is_some()).count();

    println!("{}", "Images".bold());
    println!("  directory:      {}", store.root().display());
    println!("  files:          {} ({} bytes)", files.len(), total_bytes);
    println!("  unique format:  {}", unique.to_string().green());
    println!("  legacy format:  {}", legacy.to_string().yellow());
    println!("  other names:    {}", other.to_string().yellow());
    if non_image > 0 {
        println!("  non-image:      {}", non_image.to_string().red());
    }
    println!("{}", "Categories".bold());
    println!("  total:          {}", categories.len());
    println!("  with image:     {}", with_image);
    println!("  without image:  {}", categories.len() - with_image);
    println!("{}", "Backups".bold());
    println!("  directory:      {}", store.backup_dir().display());
    println!("  files:          {}", backups.len());
    println!("  snapshots:      {}", artifacts.len());
    println!("  total size:     {} bytes", backup::backup_dir_size(&store));
    if let Some(latest) = artifacts.last() {
        println!("  latest:         {}", latest.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_report(config: &AppConfig, json: bool) -> CliResult {
    let (store, db) = open(config)?;
    let reporter = CliReporter::new();
    let report = health::generate_report(&store, &db, config.require_image, &reporter)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_health(&report);
    }
    Ok(exit_for(report.summary.is_healthy))
}

fn run_rollback(config: &AppConfig, backup_path: &Path, dry_run: bool) -> CliResult {
    let (store, db) = open(config)?;
    let result = backup::rollback(&store, &db, backup_path, dry_run)?;
    print_correction("Rollback", &result);
    Ok(exit_for(result.is_clean()))
}

// ── Output ──────────────────────────────────────────────────────

fn print_integrity(report: &IntegrityReport) {
    println!(
        "{} files, {} categories",
        report.total_files, report.total_records
    );
    println!(
        "  orphaned:        {}",
        colored_count(report.orphaned.len())
    );
    for finding in analysis::orphan_findings(report) {
        println!("    {}", finding.description.dimmed());
    }
    println!("  missing:         {}", colored_count(report.missing.len()));
    for finding in &report.missing {
        println!("    {}", finding.description.dimmed());
    }
    println!(
        "  invalid naming:  {} ({} legacy)",
        colored_count(report.invalid_naming.len()),
        report.legacy.len()
    );
    for finding in &report.invalid_naming {
        println!("    [{}] {}", finding.kind, finding.description.dimmed());
    }
    if !report.unassigned.is_empty() {
        println!("  without image:   {}", report.unassigned.len());
    }
    if report.is_healthy() {
        println!("{}", "Healthy".green().bold());
    } else {
        println!(
            "{}",
            format!("{} integrity issues", report.issue_count()).red().bold()
        );
    }
}

fn print_duplicates(report: &DuplicateReport) {
    println!(
        "  duplicates:      {} groups, {} bytes wasted",
        colored_count(report.groups.len()),
        report.total_wasted_bytes
    );
    for group in &report.groups {
        println!(
            "    {} ({} bytes): {}",
            group.content_hash,
            group.size_bytes,
            group.files.join(", ").dimmed()
        );
    }
    if !report.unreadable.is_empty() {
        println!(
            "  unreadable:      {}",
            report.unreadable.len().to_string().red()
        );
    }
}

fn print_correction(label: &str, result: &CorrectionResult) {
    let verb = if result.dry_run { "would fix" } else { "fixed" };
    println!(
        "{}: {} {}, {} skipped, {} errors, {} bytes freed",
        label.bold(),
        verb,
        result.corrected_count.to_string().green(),
        result.skipped_count.to_string().yellow(),
        result.error_count.to_string().red(),
        result.bytes_freed
    );
    for detail in &result.details {
        let target = match &detail.new_filename {
            Some(new) => format!("{} -> {}", detail.filename, new),
            None => detail.filename.clone(),
        };
        match &detail.outcome {
            CorrectionOutcome::Corrected | CorrectionOutcome::Planned => {}
            CorrectionOutcome::Skipped(reason) => {
                println!("    {} {}: {}", "skip".yellow(), target, reason)
            }
            CorrectionOutcome::Failed(message) => {
                println!("    {} {}: {}", "fail".red(), target, message)
            }
        }
    }
}

fn print_migration(outcome: &MigrationOutcome) {
    if outcome.dry_run {
        println!("{}", "DRY RUN: nothing was written".yellow().bold());
    }
    match &outcome.backup_path {
        Some(path) => println!("Backup: {}", path.display()),
        None => println!("Backup: {}", "none".yellow()),
    }
    for warning in &outcome.warnings {
        println!("{} {}", "warning:".yellow(), warning);
    }
    print_correction("Migrated", &outcome.migrated);
    print_correction("Cleaned", &outcome.cleaned);
    for failure in &outcome.failures {
        println!(
            "{} stage {} failed: {}",
            "error:".red(),
            failure.stage,
            failure.message
        );
    }
    if let Some(report) = &outcome.integrity_result {
        println!();
        print_integrity(report);
    }
    println!(
        "Finished in {}",
        format!("{:.2}s", outcome.duration.as_secs_f64()).green()
    );
}

fn print_health(report: &HealthReport) {
    let score = format!("{}", report.health_score);
    let score = match report.health_score {
        90..=100 => score.green(),
        75..=89 => score.cyan(),
        50..=74 => score.yellow(),
        _ => score.red(),
    };
    println!("Health score: {} ({})", score.bold(), report.status);
    let s = &report.summary;
    println!(
        "  {} files, {} categories, {} issues ({} orphaned, {} missing, {} invalid naming, {} redundant duplicates)",
        s.total_files,
        s.total_categories,
        s.total_issues,
        s.orphaned,
        s.missing,
        s.invalid_naming,
        s.redundant_duplicates
    );
    if !report.recommendations.is_empty() {
        println!("{}", "Recommendations".bold());
        for rec in &report.recommendations {
            println!(
                "  [{}] {}\n        {}",
                format!("{:?}", rec.priority).to_lowercase(),
                rec.title,
                rec.action.dimmed()
            );
        }
    }
}

fn colored_count(n: usize) -> ColoredString {
    if n == 0 {
        n.to_string().green()
    } else {
        n.to_string().red()
    }
}
