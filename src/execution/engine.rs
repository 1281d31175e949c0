//! Main execution engine - runs a pipeline preset step by step

use crate::core::config::ResolvedConfig;
use crate::core::error::{LocateError, PipelineError};
use crate::core::pipeline::Action;
use crate::core::state::{PipelineRun, RunState, StepRecord};
use crate::core::step::{StepContext, StepKind};
use crate::execution::command::CommandBuilder;
use crate::execution::executor::{LogMode, LogTarget, StepRunner};
use crate::execution::locator;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        action: Action,
        total_steps: usize,
    },
    StepStarted {
        step: StepKind,
        index: usize,
        command: String,
        log: PathBuf,
    },
    StepCompleted {
        step: StepKind,
        duration_ms: i64,
    },
    StepFailed {
        step: StepKind,
        status: Option<i32>,
        error: String,
    },
    ArtifactLocated {
        step: StepKind,
        path: PathBuf,
    },
    PipelineCompleted {
        execution_id: Uuid,
        state: RunState,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Sequences the steps of an action
///
/// Steps are built lazily: each one is rendered only after the previous
/// one succeeded, so it can use the paths that step produced.
pub struct ExecutionEngine<R> {
    runner: R,
    builder: CommandBuilder,
    event_handlers: Vec<EventHandler>,
}

impl<R: StepRunner> ExecutionEngine<R> {
    pub fn new(runner: R, builder: CommandBuilder) -> Self {
        Self {
            runner,
            builder,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run every step of the configured action
    pub async fn execute(
        &self,
        config: &ResolvedConfig,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        self.execute_plan(config, config.action.steps(), run).await
    }

    /// Run an explicit step chain
    ///
    /// Stops at the first step that cannot be built, cannot start or exits
    /// non-zero. Steps that never ran leave no record.
    pub async fn execute_plan(
        &self,
        config: &ResolvedConfig,
        plan: &[StepKind],
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        info!("Starting {} pipeline ({})", run.action, run.execution_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id: run.execution_id,
            action: run.action,
            total_steps: plan.len(),
        });

        let log_path = config.log_path();
        let mut ctx = StepContext {
            archive_path: config.archive_path(),
            export_path: config.export_path(),
            artifact: None,
            merge: config.merge.clone(),
        };

        for (index, &kind) in plan.iter().enumerate() {
            run.begin_step(kind);

            let spec = match self.builder.build(kind, config, &ctx) {
                Ok(spec) => spec,
                Err(source) => {
                    return Err(self.fail(run, PipelineError::Build { step: kind, source }));
                }
            };
            let command = spec.display_command();
            self.emit_event(ExecutionEvent::StepStarted {
                step: kind,
                index,
                command: command.clone(),
                log: log_path.clone(),
            });

            let mode = if index == 0 {
                LogMode::Truncate
            } else {
                LogMode::Append
            };
            let started_at = Utc::now();
            let result = match self.runner.run(&spec, &LogTarget::new(&log_path, mode)).await {
                Ok(result) => result,
                Err(source) => {
                    return Err(self.fail(
                        run,
                        PipelineError::Executor {
                            step: kind,
                            command,
                            source,
                        },
                    ));
                }
            };

            let status = result.status;
            let record = StepRecord {
                spec,
                result,
                started_at,
                completed_at: Utc::now(),
            };
            let duration_ms = record.duration_ms();
            run.record(record);

            if status != 0 {
                return Err(self.fail(
                    run,
                    PipelineError::ToolExecutionFailure {
                        step: kind,
                        status,
                        command,
                        log: log_path.clone(),
                    },
                ));
            }
            self.emit_event(ExecutionEvent::StepCompleted {
                step: kind,
                duration_ms,
            });

            if kind == StepKind::Export {
                let root = ctx
                    .export_path
                    .clone()
                    .unwrap_or_else(|| config.output_root.clone());
                match locator::locate(&root, config.platform.package_extension()) {
                    Ok(path) => {
                        info!("Located package: {}", path.display());
                        self.emit_event(ExecutionEvent::ArtifactLocated {
                            step: kind,
                            path: path.clone(),
                        });
                        run.artifact = Some(path.clone());
                        ctx.artifact = Some(path);
                    }
                    Err(LocateError::NotFound { root, extension }) => {
                        return Err(self.fail(
                            run,
                            PipelineError::ArtifactNotFound {
                                step: kind,
                                root,
                                extension,
                                command,
                                log: log_path.clone(),
                            },
                        ));
                    }
                    Err(source) => {
                        return Err(self.fail(run, PipelineError::Locate { step: kind, source }));
                    }
                }
            }
        }

        run.succeed();
        info!("Pipeline {} succeeded", run.action);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: run.execution_id,
            state: run.state.clone(),
        });
        Ok(())
    }

    fn fail(&self, run: &mut PipelineRun, err: PipelineError) -> PipelineError {
        let status = match &err {
            PipelineError::ToolExecutionFailure { status, .. } => Some(*status),
            _ => None,
        };
        run.fail(err.step(), status);
        error!("Pipeline {} failed: {}", run.action, err);

        if let Some(step) = err.step() {
            self.emit_event(ExecutionEvent::StepFailed {
                step,
                status,
                error: err.to_string(),
            });
        }
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: run.execution_id,
            state: run.state.clone(),
        });
        err
    }
}
