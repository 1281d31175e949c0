//! Piped executor: runs one tool invocation and fans its output out
//!
//! The child's stdout and stderr are read line by line and merged into a
//! single stream. Each line goes to the log file and, when configured, to
//! the stdin of a formatter process (e.g. xcbeautify). Only the primary
//! tool's exit status is reported.

use crate::core::error::ExecutorError;
use crate::core::state::ExecutionResult;
use crate::core::step::{StepKind, StepSpec};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How the log file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Start a fresh log
    Truncate,
    /// Keep earlier steps' output
    Append,
}

/// Where a step's combined output is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub path: PathBuf,
    pub mode: LogMode,
}

impl LogTarget {
    pub fn new(path: impl Into<PathBuf>, mode: LogMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }
}

/// Runs a rendered step
///
/// The seam between orchestration and real processes; tests substitute a
/// scripted runner.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, spec: &StepSpec, log: &LogTarget) -> Result<ExecutionResult, ExecutorError>;
}

/// Output formatter fed the tool's raw output on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    pub program: String,
    pub args: Vec<String>,
}

impl Formatter {
    pub const XCBEAUTIFY: &'static str = "xcbeautify";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Look for xcbeautify on PATH
    pub fn detect() -> Option<Self> {
        match which::which(Self::XCBEAUTIFY) {
            Ok(path) => {
                debug!("Found {} at: {}", Self::XCBEAUTIFY, path.display());
                Some(Self::new(path.to_string_lossy()))
            }
            Err(e) => {
                debug!("{} not found in PATH: {}", Self::XCBEAUTIFY, e);
                None
            }
        }
    }

    /// Whether output of this step kind is worth formatting
    pub fn applies_to(kind: StepKind) -> bool {
        !matches!(kind, StepKind::Upload | StepKind::MergePlist)
    }
}

/// Process-backed [`StepRunner`]
#[derive(Debug, Clone, Default)]
pub struct PipedExecutor {
    formatter: Option<Formatter>,
    echo: bool,
}

impl PipedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formatter(mut self, formatter: Option<Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Copy raw output to stdout when no formatter is consuming it
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn spawn_formatter(&self, kind: StepKind) -> Option<Child> {
        let formatter = self.formatter.as_ref().filter(|_| Formatter::applies_to(kind))?;
        match Command::new(&formatter.program)
            .args(&formatter.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => Some(child),
            Err(e) => {
                warn!(
                    "Formatter {} could not be started ({}), continuing without it",
                    formatter.program, e
                );
                None
            }
        }
    }
}

#[async_trait]
impl StepRunner for PipedExecutor {
    async fn run(&self, spec: &StepSpec, log: &LogTarget) -> Result<ExecutionResult, ExecutorError> {
        if let Some(parent) = log.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        for path in &spec.clean_paths {
            remove_stale(path).await?;
        }

        let mut log_file = Some(open_log(log).await?);
        let command_line = spec.display_command();
        info!("Running {}: {}", spec.kind, command_line);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let Some(file) = log_file.as_mut() {
            let header = format!("$ {}\n", command_line);
            if let Err(e) = file.write_all(header.as_bytes()).await {
                warn!("Failed to write log {}: {}", log.path.display(), e);
                log_file = None;
            }
        }

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(256);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        let mut formatter = self.spawn_formatter(spec.kind);
        let mut formatter_stdin: Option<ChildStdin> = formatter.as_mut().and_then(|c| c.stdin.take());
        let mut stdout = (self.echo && formatter_stdin.is_none()).then(tokio::io::stdout);

        while let Some(line) = rx.recv().await {
            if let Some(file) = log_file.as_mut() {
                if let Err(e) = file.write_all(&line).await {
                    warn!("Failed to write log {}: {}", log.path.display(), e);
                    log_file = None;
                }
            }
            if let Some(stdin) = formatter_stdin.as_mut() {
                if let Err(e) = stdin.write_all(&line).await {
                    warn!("Formatter stopped accepting output: {}", e);
                    formatter_stdin = None;
                }
            }
            if let Some(out) = stdout.as_mut() {
                if out.write_all(&line).await.is_err() {
                    stdout = None;
                }
            }
        }

        for reader in readers {
            match reader.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error reading {} output: {}", spec.kind, e),
                Err(e) => warn!("Output reader for {} panicked: {}", spec.kind, e),
            }
        }

        if let Some(file) = log_file.as_mut() {
            if let Err(e) = file.flush().await {
                warn!("Failed to flush log {}: {}", log.path.display(), e);
            }
        }
        if let Some(out) = stdout.as_mut() {
            let _ = out.flush().await;
        }

        let status = exit_code(child.wait().await?);

        // Closing stdin lets the formatter finish
        drop(formatter_stdin);
        if let Some(mut formatter) = formatter {
            match formatter.wait().await {
                Ok(s) if !s.success() => debug!("Formatter exited with {}", s),
                Ok(_) => {}
                Err(e) => warn!("Failed to wait for formatter: {}", e),
            }
        }

        debug!("{} exited with status {}", spec.kind, status);
        Ok(ExecutionResult {
            status,
            log_path: log.path.clone(),
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<Vec<u8>>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        if tx.send(line).await.is_err() {
            return Ok(());
        }
    }
}

async fn open_log(log: &LogTarget) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    match log.mode {
        LogMode::Truncate => options.write(true).truncate(true),
        LogMode::Append => options.append(true),
    };
    options.open(&log.path).await
}

/// Remove a file or directory left by an earlier run. Missing is fine.
pub async fn remove_stale(path: &Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            debug!("Removing stale directory {}", path.display());
            tokio::fs::remove_dir_all(path).await
        }
        Ok(_) => {
            debug!("Removing stale file {}", path.display());
            tokio::fs::remove_file(path).await
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
