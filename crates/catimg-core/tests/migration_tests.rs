mod common;

use catimg_core::backup::{self, MigrationBackup};
use catimg_core::naming;
use catimg_core::{MigrationOptions, MigrationOrchestrator};
use common::*;

fn legacy_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.write("pizza_1699999999999.jpg", b"pizza");
    fx.write("sushi_1699999999998.png", b"sushi");
    fx.write("unused_1699999999997.jpg", b"unused");
    fx.category(ID_A, Some("/images/pizza_1699999999999.jpg"));
    fx.category(ID_B, Some("/images/sushi_1699999999998.png"));
    fx
}

#[test]
fn test_dry_run_reports_without_writing() {
    let fx = legacy_fixture();
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .with_options(MigrationOptions {
            dry_run: true,
            ..Default::default()
        })
        .run()
        .unwrap();

    assert!(outcome.dry_run);
    assert!(outcome.backup_path.is_none());
    assert_eq!(outcome.analysis.planned_renames, 2);
    assert_eq!(outcome.migrated.corrected_count, 2);
    assert_eq!(outcome.cleaned.corrected_count, 1);
    let verify = outcome.integrity_result.as_ref().unwrap();
    assert!(!verify.is_healthy());
    assert!(!outcome.succeeded());

    assert!(fx.exists("pizza_1699999999999.jpg"));
    assert!(fx.exists("unused_1699999999997.jpg"));
    assert!(fx.backup_files().is_empty());
    assert_eq!(
        fx.image_path_of(ID_A).as_deref(),
        Some("/images/pizza_1699999999999.jpg")
    );
}

#[test]
fn test_full_migration_backs_up_migrates_and_verifies() {
    let fx = legacy_fixture();
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .run()
        .unwrap();

    assert!(outcome.succeeded(), "outcome: {:?}", outcome);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.migrated.corrected_count, 2);
    assert_eq!(outcome.cleaned.corrected_count, 1);

    let a = fx.image_path_of(ID_A).unwrap();
    let a_file = naming::filename_from_image_path(&a);
    assert!(a.starts_with("/images/cat_"));
    assert_eq!(naming::extract_category_id(a_file).as_deref(), Some(ID_A));
    assert!(fx.exists(a_file));
    assert!(!fx.exists("pizza_1699999999999.jpg"));
    assert!(!fx.exists("unused_1699999999997.jpg"));

    let backup_path = outcome.backup_path.clone().unwrap();
    let snapshot = MigrationBackup::load(&backup_path).unwrap();
    assert_eq!(snapshot.counts.categories, 2);
    assert_eq!(snapshot.counts.files, 3);
    assert_eq!(
        snapshot
            .data
            .files
            .iter()
            .filter(|f| f.saved_copy.is_some())
            .count(),
        3
    );
    assert_eq!(
        snapshot.data.categories[0].image_path.as_deref(),
        Some("/images/pizza_1699999999999.jpg")
    );

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&backup_path).unwrap()).unwrap();
    assert!(raw["timestamp"].is_string());
    assert_eq!(raw["counts"]["files"], 3);
    assert!(raw["data"]["categories"][0]["imagePath"].is_string());
}

#[test]
fn test_second_migration_is_a_no_op() {
    let fx = legacy_fixture();
    let orchestrator = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db);
    orchestrator.run().unwrap();

    let again = orchestrator.run().unwrap();
    assert!(again.succeeded());
    assert_eq!(again.migrated.corrected_count, 0);
    assert_eq!(again.cleaned.corrected_count, 0);
}

#[test]
fn test_disabled_backup_warns_but_runs() {
    let fx = legacy_fixture();
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .with_options(MigrationOptions {
            backup: false,
            cleanup: false,
            ..Default::default()
        })
        .run()
        .unwrap();

    assert!(outcome.backup_path.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.migrated.corrected_count, 2);
    assert_eq!(outcome.cleaned.corrected_count, 0);
    // Cleanup was disabled, so the unused file is still an orphan.
    let verify = outcome.integrity_result.unwrap();
    assert_eq!(verify.orphaned, vec!["unused_1699999999997.jpg".to_string()]);
}

#[test]
fn test_rollback_restores_records_and_files() {
    let fx = legacy_fixture();
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .run()
        .unwrap();
    let backup_path = outcome.backup_path.unwrap();

    let preview = backup::rollback(&fx.store, &fx.db, &backup_path, true).unwrap();
    assert_eq!(preview.corrected_count, 5);
    assert!(!fx.exists("pizza_1699999999999.jpg"));

    let result = backup::rollback(&fx.store, &fx.db, &backup_path, false).unwrap();
    assert_eq!(result.error_count, 0);
    assert_eq!(result.corrected_count, 5);
    assert_eq!(
        fx.image_path_of(ID_A).as_deref(),
        Some("/images/pizza_1699999999999.jpg")
    );
    assert_eq!(
        std::fs::read(fx.root().join("pizza_1699999999999.jpg")).unwrap(),
        b"pizza"
    );
    assert!(fx.exists("unused_1699999999997.jpg"));

    let artifacts = backup::list_backup_artifacts(&fx.store).unwrap();
    assert_eq!(artifacts, vec![backup_path]);
}

#[test]
fn test_migration_keeps_renamed_file_when_record_update_fails() {
    let fx = Fixture::new();
    fx.write("pizza_1699999999999.jpg", b"pizza");
    fx.category(ID_A, Some("/images/pizza_1699999999999.jpg"));

    let broken = ReadOnlyRepo(&fx.db);
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &broken)
        .run()
        .unwrap();
    assert_eq!(outcome.migrated.error_count, 1);
    assert_eq!(outcome.cleaned.corrected_count, 0);
    assert_eq!(outcome.cleaned.skipped_count, 1);
    assert!(!outcome.succeeded());

    let renamed = outcome.migrated.details[0].new_filename.clone().unwrap();
    assert!(fx.exists(&renamed));
    let verify = outcome.integrity_result.as_ref().unwrap();
    assert_eq!(verify.missing.len(), 1);
    assert_eq!(verify.held_for_repair(&renamed), Some(ID_A));

    // A later run against a writable database finishes the job.
    let outcome = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .run()
        .unwrap();
    assert!(outcome.succeeded(), "outcome: {:?}", outcome);
    assert_eq!(fx.image_path_of(ID_A), Some(format!("/images/{}", renamed)));
}

#[test]
fn test_cleanup_dry_run_matches_real_run() {
    let fx = Fixture::new();
    let kept = unique_name(ID_A, 1_700_000_000_000, 123_456, "jpg");
    fx.write(&kept, b"kept");
    fx.write("a.jpg", b"same");
    fx.write("b.jpg", b"same");
    fx.category(ID_A, Some(&format!("/images/{}", kept)));

    let (dry_orphans, dry_duplicates) = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .with_options(MigrationOptions {
            dry_run: true,
            ..Default::default()
        })
        .cleanup()
        .unwrap();
    assert!(fx.exists("a.jpg"));
    assert!(fx.exists("b.jpg"));

    let (orphans, duplicates) = MigrationOrchestrator::new(&fx.config, &fx.store, &fx.db)
        .cleanup()
        .unwrap();
    assert_eq!(orphans.corrected_count, 2);
    assert_eq!(orphans.bytes_freed, 8);
    assert_eq!(duplicates.corrected_count, 0);

    assert_eq!(
        dry_orphans.corrected_count + dry_duplicates.corrected_count,
        orphans.corrected_count + duplicates.corrected_count
    );
    assert_eq!(
        dry_orphans.bytes_freed + dry_duplicates.bytes_freed,
        orphans.bytes_freed + duplicates.bytes_freed
    );
    assert!(fx.exists(&kept));
}
