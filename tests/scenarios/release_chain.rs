//! Test: release chain - archive, export, locate, upload

use crate::helpers::*;
use std::path::PathBuf;
use xcpipe::core::config::ConfigOptions;
use xcpipe::core::error::PipelineError;
use xcpipe::core::step::StepKind;
use xcpipe::execution::{ExecutionEvent, LogMode};

/// The archive path chosen for archive is the one export reads and the
/// one the locator searches under
#[tokio::test]
async fn test_release_paths_line_up_and_missing_package_stops_upload() {
    let options = ConfigOptions {
        output_root: Some("./out".to_string()),
        ..release_options(std::path::Path::new("unused"))
    };
    let config = resolve_options(&options);

    // Tools "succeed" but nothing is written, so no package exists
    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    assert_execution_order(&result, &[StepKind::Archive, StepKind::Export]);
    assert_flag(result.spec(StepKind::Archive), "-archivePath", "./out/App.xcarchive");
    assert_flag(result.spec(StepKind::Export), "-archivePath", "./out/App.xcarchive");
    assert_flag(
        result.spec(StepKind::Export),
        "-exportPath",
        "./out/App.xcarchive/Products",
    );

    match &result.error {
        Some(PipelineError::ArtifactNotFound { root, extension, .. }) => {
            assert_eq!(root, &PathBuf::from("./out/App.xcarchive/Products"));
            assert_eq!(extension, "ipa");
        }
        other => panic!("Expected ArtifactNotFound, got {:?}", other),
    }
    assert_failed_at(&result, StepKind::Export);
    assert_eq!(result.run.records.len(), 2);
    assert_eq!(result.exit_code(), 1);
}

#[tokio::test]
async fn test_release_uploads_located_package() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(&config, MockRunner::succeeding()).await;

    assert_run_succeeded(&result);
    assert_execution_order(
        &result,
        &[StepKind::Archive, StepKind::Export, StepKind::Upload],
    );

    let package = dir.path().join("App.xcarchive/Products/App.ipa");
    let upload = result.spec(StepKind::Upload);
    assert_eq!(upload.program, "xcrun");
    assert_flag(upload, "--file", &package.to_string_lossy());
    assert_flag(upload, "--type", "ios");
    assert_flag(upload, "--apiKey", "KEY123");
    assert_flag(upload, "--apiIssuer", "ISSUER-1");
    assert_eq!(
        upload.env,
        vec![("API_PRIVATE_KEYS_DIR".to_string(), "/secrets".to_string())]
    );
    assert_eq!(result.run.artifact, Some(package.clone()));

    assert!(result.events.iter().any(
        |e| matches!(e, ExecutionEvent::ArtifactLocated { path, .. } if *path == package)
    ));
}

#[tokio::test]
async fn test_release_shares_one_log() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(&config, MockRunner::succeeding()).await;

    let expected = dir.path().join("App_release.log");
    let modes: Vec<_> = result.calls.iter().map(|(_, log)| log.mode).collect();
    assert_eq!(modes, vec![LogMode::Truncate, LogMode::Append, LogMode::Append]);
    assert!(result.calls.iter().all(|(_, log)| log.path == expected));
    assert!(result
        .run
        .records
        .iter()
        .all(|r| r.result.log_path == expected));
}

#[tokio::test]
async fn test_macos_release_looks_for_pkg() {
    let dir = output_dir();
    let options = ConfigOptions {
        platform: Some("macOS".to_string()),
        ..release_options(dir.path())
    };
    let config = resolve_options(&options);

    // An .ipa is not a macOS package
    let result = run_with_mock(&config, MockRunner::succeeding()).await;
    assert!(matches!(
        result.error,
        Some(PipelineError::ArtifactNotFound { ref extension, .. }) if extension == "pkg"
    ));

    let result = run_with_mock(
        &config,
        MockRunner::new(vec![
            MockOutcome::Exit(0),
            MockOutcome::ExportPackage("App.pkg"),
            MockOutcome::Exit(0),
        ]),
    )
    .await;
    assert_run_succeeded(&result);
    assert_flag(result.spec(StepKind::Upload), "--type", "macos");
}

#[tokio::test]
async fn test_export_action_stops_after_export() {
    let dir = output_dir();
    let options = ConfigOptions {
        action: Some(xcpipe::core::pipeline::Action::Export),
        ..release_options(dir.path())
    };
    let config = resolve_options(&options);

    let result = run_with_mock(&config, MockRunner::succeeding()).await;

    assert_run_succeeded(&result);
    assert_execution_order(&result, &[StepKind::Archive, StepKind::Export]);
    assert!(result.run.artifact.is_some());
}
