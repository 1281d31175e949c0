//! CLI output formatting

use crate::core::state::{PipelineRun, RunState};
use crate::core::step::StepSpec;
use crate::execution::ExecutionEvent;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "* ");

/// Create a spinner for a running step
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Prints run events and keeps a spinner alive while a step runs
///
/// The spinner is skipped when a formatter or raw echo owns the terminal.
pub struct RunReporter {
    spinner_enabled: bool,
    active: Mutex<Option<ProgressBar>>,
}

impl RunReporter {
    pub fn new(spinner_enabled: bool) -> Self {
        Self {
            spinner_enabled,
            active: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(spinner) = active.take() {
            spinner.finish_and_clear();
        }

        println!("{}", format_execution_event(event));

        if let ExecutionEvent::StepStarted { step, .. } = event {
            if self.spinner_enabled {
                *active = Some(create_spinner(format!("{} running", step)));
            }
        }
    }
}

/// Format a run state for display
pub fn format_run_state(state: &RunState) -> String {
    match state {
        RunState::Idle => style("IDLE").dim().to_string(),
        RunState::Running { step } => style(format!("RUNNING ({})", step)).yellow().to_string(),
        RunState::Succeeded => style("SUCCEEDED").green().to_string(),
        RunState::Failed { step: Some(step), .. } => {
            style(format!("FAILED ({})", step)).red().to_string()
        }
        RunState::Failed { step: None, .. } => style("FAILED").red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            action,
            total_steps,
        } => format!(
            "{} Starting {} ({} step{}, {})",
            ROCKET,
            style(action).bold(),
            total_steps,
            if *total_steps == 1 { "" } else { "s" },
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted {
            step,
            index,
            command,
            log,
        } => format!(
            "{} [{}] {} {}\n   {}",
            SPINNER,
            index + 1,
            style(step).cyan(),
            style(format!("(log: {})", log.display())).dim(),
            style(command).dim()
        ),
        ExecutionEvent::StepCompleted { step, duration_ms } => format!(
            "{} {} {}",
            CHECK,
            style(step).green(),
            style(format_duration(Duration::from_millis((*duration_ms).max(0) as u64))).dim()
        ),
        ExecutionEvent::StepFailed { step, status, .. } => match status {
            Some(status) => format!(
                "{} {} exited with status {}",
                CROSS,
                style(step).red(),
                style(status).red()
            ),
            None => format!("{} {}", CROSS, style(step).red()),
        },
        ExecutionEvent::ArtifactLocated { path, .. } => {
            format!("{} {}", PACKAGE, style(path.display()).bold())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            state,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_run_state(state)
        ),
    }
}

/// One line per step of a finished run
pub fn format_run_summary(run: &PipelineRun) -> String {
    let mut lines = vec![format!(
        "{} {} {}",
        INFO,
        style(run.action).bold(),
        format_run_state(&run.state)
    )];
    for record in &run.records {
        let icon = if record.result.success() { CHECK } else { CROSS };
        lines.push(format!(
            "  {}{} (status {}, {})",
            icon,
            record.kind(),
            record.result.status,
            format_duration(Duration::from_millis(record.duration_ms().max(0) as u64))
        ));
    }
    if let Some(artifact) = &run.artifact {
        lines.push(format!("  {}{}", PACKAGE, artifact.display()));
    }
    lines.join("\n")
}

/// Format a planned step for `validate`
pub fn format_planned_step(index: usize, spec: &StepSpec) -> String {
    let mut out = format!(
        "  {}. {}\n     {}",
        index + 1,
        style(spec.kind).cyan(),
        spec.display_command()
    );
    for (key, value) in &spec.env {
        out.push_str(&format!("\n     {}={}", style(key).dim(), value));
    }
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
