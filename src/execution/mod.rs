//! Pipeline execution: command construction, process execution and sequencing

pub mod command;
pub mod engine;
pub mod executor;
pub mod locator;

pub use command::{CommandBuilder, ToolSet};
pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{Formatter, LogMode, LogTarget, PipedExecutor, StepRunner};
pub use locator::locate;
