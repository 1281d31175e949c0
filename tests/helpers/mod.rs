//! Test utility functions for xcpipe

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use xcpipe::core::config::{resolve, BuiltinDefaults, ConfigOptions, ResolvedConfig};
use xcpipe::core::error::{ExecutorError, PipelineError};
use xcpipe::core::pipeline::Action;
use xcpipe::core::state::{ExecutionResult, PipelineRun, RunState};
use xcpipe::core::step::{StepKind, StepSpec};
use xcpipe::execution::{CommandBuilder, ExecutionEngine, ExecutionEvent, LogTarget, StepRunner};

/// What the mock runner does for one step
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Exit with this status
    Exit(i32),
    /// Exit 0 and drop a package into the export directory
    ExportPackage(&'static str),
    /// Fail to start
    SpawnError,
}

/// Runner that replays outcomes in order and records every call
pub struct MockRunner {
    outcomes: Vec<MockOutcome>,
    calls: Mutex<Vec<(StepSpec, LogTarget)>>,
}

impl MockRunner {
    pub fn new(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every step succeeds; export writes `App.ipa`
    pub fn succeeding() -> Self {
        Self::new(vec![
            MockOutcome::Exit(0),
            MockOutcome::ExportPackage("App.ipa"),
            MockOutcome::Exit(0),
        ])
    }

    pub fn calls(&self) -> Vec<(StepSpec, LogTarget)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for MockRunner {
    async fn run(&self, spec: &StepSpec, log: &LogTarget) -> Result<ExecutionResult, ExecutorError> {
        let outcome = {
            let mut calls = self.calls.lock().unwrap();
            let outcome = self
                .outcomes
                .get(calls.len())
                .cloned()
                .unwrap_or(MockOutcome::Exit(0));
            calls.push((spec.clone(), log.clone()));
            outcome
        };

        let status = match outcome {
            MockOutcome::Exit(status) => status,
            MockOutcome::ExportPackage(name) => {
                let export = spec
                    .value_of("-exportPath")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| panic!("MockRunner: {} has no -exportPath", spec.kind));
                std::fs::create_dir_all(&export).unwrap();
                std::fs::write(export.join(name), "package").unwrap();
                0
            }
            MockOutcome::SpawnError => {
                return Err(ExecutorError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
        };

        Ok(ExecutionResult {
            status,
            log_path: log.path.clone(),
        })
    }
}

/// Result of running an action against a mock runner
pub struct ScenarioResult {
    pub run: PipelineRun,
    pub error: Option<PipelineError>,
    pub calls: Vec<(StepSpec, LogTarget)>,
    pub events: Vec<ExecutionEvent>,
}

impl ScenarioResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.run.succeeded()
    }

    /// Step kinds that were handed to the runner, in order
    pub fn executed(&self) -> Vec<StepKind> {
        self.calls.iter().map(|(spec, _)| spec.kind).collect()
    }

    pub fn spec(&self, kind: StepKind) -> &StepSpec {
        self.calls
            .iter()
            .map(|(spec, _)| spec)
            .find(|spec| spec.kind == kind)
            .unwrap_or_else(|| panic!("Step '{}' was never executed", kind))
    }

    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map(|e| e.exit_code()).unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        match &self.error {
            None => format!("succeeded after {:?}", self.executed()),
            Some(e) => format!("failed after {:?}: {}", self.executed(), e),
        }
    }
}

/// Run a resolved config through the engine with a mock runner
pub async fn run_with_mock(config: &ResolvedConfig, runner: MockRunner) -> ScenarioResult {
    let events = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let engine = ExecutionEngine::new(RunnerRef(&runner), CommandBuilder::default())
        .with_event_handler(move |event| sink.lock().unwrap().push(event));

    let mut run = PipelineRun::new(config.action);
    let error = engine.execute(config, &mut run).await.err();
    drop(engine);

    let events = events.lock().unwrap().clone();
    ScenarioResult {
        run,
        error,
        calls: runner.calls(),
        events,
    }
}

/// Borrowing adapter so the test keeps ownership of the runner
struct RunnerRef<'a>(&'a MockRunner);

#[async_trait]
impl StepRunner for RunnerRef<'_> {
    async fn run(&self, spec: &StepSpec, log: &LogTarget) -> Result<ExecutionResult, ExecutorError> {
        self.0.run(spec, log).await
    }
}

/// Explicit options for a release of scheme `App` into `root`
pub fn release_options(root: &Path) -> ConfigOptions {
    ConfigOptions {
        action: Some(Action::Release),
        scheme: Some("App".to_string()),
        platform: Some("iOS".to_string()),
        output_root: Some(root.to_string_lossy().into_owned()),
        export_options: Some("ExportOptions.plist".to_string()),
        auth_key_path: Some("/secrets/AuthKey_KEY123.p8".to_string()),
        auth_key_id: Some("KEY123".to_string()),
        auth_key_issuer: Some("ISSUER-1".to_string()),
        ..Default::default()
    }
}

/// Resolve explicit options with no fallback sources
pub fn resolve_options(options: &ConfigOptions) -> ResolvedConfig {
    resolve(options, &[], &BuiltinDefaults::default())
        .unwrap_or_else(|e| panic!("Failed to resolve config: {}", e))
}

pub fn output_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

/// Assert the run succeeded
pub fn assert_run_succeeded(result: &ScenarioResult) {
    assert!(
        result.is_success(),
        "Run should have succeeded, but {}",
        result.summary()
    );
}

/// Assert the run failed at `step`
pub fn assert_failed_at(result: &ScenarioResult, step: StepKind) {
    assert!(
        matches!(result.run.state, RunState::Failed { step: Some(s), .. } if s == step),
        "Run should have failed at {}, but state was {:?} ({})",
        step,
        result.run.state,
        result.summary()
    );
}

/// Assert the runner saw exactly these steps, in order
pub fn assert_execution_order(result: &ScenarioResult, expected: &[StepKind]) {
    assert_eq!(
        result.executed(),
        expected,
        "Expected execution order: {:?}\nActual: {:?}",
        expected,
        result.executed()
    );
}

/// Assert `flag` is immediately followed by `value`
pub fn assert_flag(spec: &StepSpec, flag: &str, value: &str) {
    assert_eq!(
        spec.value_of(flag),
        Some(value),
        "Expected {} {:?} in: {}",
        flag,
        value,
        spec.display_command()
    );
}
