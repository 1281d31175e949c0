//! xcpipe - Xcode build, test and release pipelines for CI

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use core::{
    Action, ConfigError, ConfigOptions, PipelineError, PipelineRun, Platform, ResolvedConfig,
    StepKind, StepSpec,
};
pub use execution::{
    CommandBuilder, ExecutionEngine, ExecutionEvent, Formatter, PipedExecutor, StepRunner, ToolSet,
};
