//! Execution state models

use crate::core::pipeline::Action;
use crate::core::step::{StepKind, StepSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Exit status of the primary tool (never the formatter's)
    pub status: i32,
    /// Log file the combined output was written to
    pub log_path: PathBuf,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// A step that ran, with what it ran and how it ended
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub spec: StepSpec,
    pub result: ExecutionResult,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn kind(&self) -> StepKind {
        self.spec.kind
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Run state machine: Idle -> Running(step) -> ... -> Succeeded | Failed(step)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running { step: StepKind },
    Failed { step: Option<StepKind>, status: Option<i32> },
    Succeeded,
}

/// One pipeline invocation: the action, its state and the steps that ran
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub execution_id: Uuid,
    pub action: Action,
    pub state: RunState,
    /// Steps that actually ran, in order; a failed step is the last entry
    pub records: Vec<StepRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Package located after export, when the chain includes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl PipelineRun {
    pub fn new(action: Action) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            action,
            state: RunState::Idle,
            records: Vec::new(),
            started_at: None,
            completed_at: None,
            artifact: None,
        }
    }

    /// Mark a step as the one currently running
    pub fn begin_step(&mut self, step: StepKind) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.state = RunState::Running { step };
    }

    pub fn record(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn succeed(&mut self) {
        self.state = RunState::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, step: Option<StepKind>, status: Option<i32>) {
        self.state = RunState::Failed { step, status };
        self.completed_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}
