//! Error types for configuration, command construction and execution

use crate::core::step::StepKind;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for configuration failures (sysexits EX_CONFIG)
pub const EXIT_CONFIG: i32 = 78;

/// Exit code for commands that could not be constructed (sysexits EX_DATAERR)
pub const EXIT_BUILD: i32 = 65;

/// Exit code when a tool could not be started at all
pub const EXIT_SPAWN: i32 = 127;

/// Configuration resolution errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Unsupported platform: {0} (expected one of iOS, macOS, tvOS, visionOS)")]
    UnsupportedPlatform(String),

    #[error("Invalid value for {field}: {value:?} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to load config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Command construction errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Merge needs at least two input plists, got {count}")]
    InsufficientInputs { count: usize },

    #[error("{step} step is missing {what}")]
    MissingContext { step: StepKind, what: &'static str },
}

/// Process execution errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact search errors
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("No .{extension} file found under {}", root.display())]
    NotFound { root: PathBuf, extension: String },

    #[error("Could not search {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Everything that can end a pipeline run early
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not construct {step} command: {source}")]
    Build {
        step: StepKind,
        #[source]
        source: BuildError,
    },

    #[error("{step} failed with exit status {status}\n  command: {command}\n  log: {}", log.display())]
    ToolExecutionFailure {
        step: StepKind,
        status: i32,
        command: String,
        log: PathBuf,
    },

    #[error("{step} produced no .{extension} under {}\n  command: {command}\n  log: {}", root.display(), log.display())]
    ArtifactNotFound {
        step: StepKind,
        root: PathBuf,
        extension: String,
        command: String,
        log: PathBuf,
    },

    #[error("{step} finished but its output could not be searched: {source}")]
    Locate {
        step: StepKind,
        #[source]
        source: LocateError,
    },

    #[error("{step} could not run\n  command: {command}\n  cause: {source}")]
    Executor {
        step: StepKind,
        command: String,
        #[source]
        source: ExecutorError,
    },
}

impl PipelineError {
    /// Process exit code that represents this error
    ///
    /// Tool failures propagate the tool's own status unchanged so CI sees
    /// what xcodebuild/altool reported.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => EXIT_CONFIG,
            PipelineError::Build { .. } => EXIT_BUILD,
            PipelineError::ToolExecutionFailure { status, .. } => *status,
            PipelineError::ArtifactNotFound { .. } | PipelineError::Locate { .. } => 1,
            PipelineError::Executor {
                source: ExecutorError::Spawn { .. },
                ..
            } => EXIT_SPAWN,
            PipelineError::Executor { .. } => 1,
        }
    }

    /// Step the error is attributed to, if any
    pub fn step(&self) -> Option<StepKind> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Build { step, .. }
            | PipelineError::ToolExecutionFailure { step, .. }
            | PipelineError::ArtifactNotFound { step, .. }
            | PipelineError::Locate { step, .. }
            | PipelineError::Executor { step, .. } => Some(*step),
        }
    }
}
