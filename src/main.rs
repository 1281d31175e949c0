use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use xcpipe::cli::commands::{RunCommand, ValidateCommand};
use xcpipe::cli::output::*;
use xcpipe::cli::{Cli, Command};
use xcpipe::core::config::EnvSource;
use xcpipe::core::error::{PipelineError, EXIT_BUILD, EXIT_CONFIG};
use xcpipe::core::state::PipelineRun;
use xcpipe::execution::{CommandBuilder, ExecutionEngine, Formatter, PipedExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &cli)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<i32> {
    let env = EnvSource::from_env();
    let config = match cmd
        .options
        .resolve(cmd.action, cli.config.as_deref().map(Path::new), &env)
    {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", CROSS, style(&e).red());
            return Ok(EXIT_CONFIG);
        }
    };

    let formatter = if config.disable_formatter {
        None
    } else {
        let found = Formatter::detect();
        if found.is_none() {
            println!(
                "{} {} not found, raw tool output goes to {}",
                WARN,
                Formatter::XCBEAUTIFY,
                style(config.log_path().display()).dim()
            );
        }
        found
    };
    let quiet_terminal = formatter.is_none() && !cli.verbose;
    let executor = PipedExecutor::new()
        .with_formatter(formatter)
        .with_echo(cli.verbose);

    let reporter = Arc::new(RunReporter::new(quiet_terminal));
    let handler = reporter.clone();
    let engine = ExecutionEngine::new(executor, CommandBuilder::default())
        .with_event_handler(move |event| handler.handle(&event));

    let mut run = PipelineRun::new(config.action);
    println!();
    let result = engine.execute(&config, &mut run).await;

    println!("\n{}", format_run_summary(&run));
    if let Some(path) = &cmd.summary {
        match write_summary(Path::new(path), &run, result.as_ref().err()) {
            Ok(()) => debug!("Run summary written to {}", path),
            Err(e) => warn!("Could not write run summary: {:#}", e),
        }
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(config.action).bold(),
                style("successfully").green()
            );
            Ok(0)
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(config.action).bold(),
                style("failed").red()
            );
            error!("{}", e);
            Ok(e.exit_code())
        }
    }
}

fn write_summary(path: &Path, run: &PipelineRun, error: Option<&PipelineError>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let summary = serde_json::json!({
        "run": run,
        "error": error.map(|e| e.to_string()),
        "exit_code": error.map(|e| e.exit_code()).unwrap_or(0),
    });
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, cli: &Cli) -> Result<i32> {
    if !cmd.json {
        println!("{} Validating {} settings...", INFO, style(cmd.action).bold());
    }

    let env = EnvSource::from_env();
    let config = match cmd
        .options
        .resolve(cmd.action, cli.config.as_deref().map(Path::new), &env)
    {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(EXIT_CONFIG);
        }
    };

    let specs = match CommandBuilder::default().preview(&config) {
        Ok(specs) => specs,
        Err((step, e)) => {
            println!("{} Could not construct {} command:", CROSS, step);
            println!("  {}", style(e).red());
            return Ok(EXIT_BUILD);
        }
    };

    if cmd.json {
        let json = serde_json::json!({ "config": config, "steps": specs });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(0);
    }

    println!("{} Configuration is valid!", CHECK);
    println!("  Platform: {}", style(config.platform).cyan());
    println!("  Configuration: {}", style(&config.configuration).cyan());
    println!("  Output: {}", style(config.output_root.display()).cyan());
    println!("  Log: {}", style(config.log_path().display()).dim());
    println!("\n{} Planned steps:", INFO);
    for (index, spec) in specs.iter().enumerate() {
        println!("{}", format_planned_step(index, spec));
    }
    Ok(0)
}
