//! Test: failure handling - short-circuiting and exit codes

use crate::helpers::*;
use xcpipe::core::error::{BuildError, PipelineError, EXIT_BUILD, EXIT_SPAWN};
use xcpipe::core::state::RunState;
use xcpipe::core::step::StepKind;
use xcpipe::execution::ExecutionEvent;

/// A three-step chain whose first step fails records exactly one step
#[tokio::test]
async fn test_first_step_failure_runs_nothing_else() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(&config, MockRunner::new(vec![MockOutcome::Exit(65)])).await;

    assert_failed_at(&result, StepKind::Archive);
    assert_execution_order(&result, &[StepKind::Archive]);
    assert_eq!(result.run.records.len(), 1);
    assert_eq!(result.run.records[0].result.status, 65);
    assert_eq!(result.exit_code(), 65);
}

#[tokio::test]
async fn test_failure_message_names_step_command_and_log() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(
        &config,
        MockRunner::new(vec![MockOutcome::Exit(0), MockOutcome::Exit(70)]),
    )
    .await;

    let message = result.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("export failed with exit status 70"), "{}", message);
    assert!(message.contains("-exportArchive"), "{}", message);
    assert!(message.contains("App_release.log"), "{}", message);
    assert_eq!(
        result.run.state,
        RunState::Failed {
            step: Some(StepKind::Export),
            status: Some(70)
        }
    );
}

#[tokio::test]
async fn test_middle_failure_skips_upload() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(
        &config,
        MockRunner::new(vec![MockOutcome::Exit(0), MockOutcome::Exit(1)]),
    )
    .await;

    assert_execution_order(&result, &[StepKind::Archive, StepKind::Export]);
    assert!(result.run.artifact.is_none());
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepFailed { step: StepKind::Export, status: Some(1), .. })));
}

#[tokio::test]
async fn test_spawn_failure_maps_to_127() {
    let dir = output_dir();
    let config = resolve_options(&release_options(dir.path()));

    let result = run_with_mock(&config, MockRunner::new(vec![MockOutcome::SpawnError])).await;

    assert!(matches!(result.error, Some(PipelineError::Executor { step: StepKind::Archive, .. })));
    assert_eq!(result.exit_code(), EXIT_SPAWN);
    assert!(result.run.records.is_empty());
}

#[tokio::test]
async fn test_construction_failure_never_reaches_runner() {
    let dir = output_dir();
    let options = xcpipe::core::config::ConfigOptions {
        action: Some(xcpipe::core::pipeline::Action::MergePlist),
        output_root: Some(dir.path().to_string_lossy().into_owned()),
        merge_output: Some("Merged.plist".to_string()),
        merge_inputs: vec!["Base.plist".to_string()],
        ..Default::default()
    };
    let config = resolve_options(&options);

    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    assert!(matches!(
        result.error,
        Some(PipelineError::Build {
            source: BuildError::InsufficientInputs { count: 1 },
            ..
        })
    ));
    assert_eq!(result.exit_code(), EXIT_BUILD);
    assert!(result.calls.is_empty());
    assert!(result.run.records.is_empty());
}
