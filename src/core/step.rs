//! Step domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The role a single tool invocation plays in a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// `xcodebuild build-for-testing`
    BuildForTesting,
    /// `xcodebuild test`
    Test,
    /// `xcodebuild test-without-building`
    TestWithoutBuilding,
    /// `xcodebuild archive`
    Archive,
    /// `xcodebuild -exportArchive`
    Export,
    /// `xcrun altool --upload-app`
    Upload,
    /// `PlistBuddy -c Merge ...`
    MergePlist,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::BuildForTesting => "build-for-testing",
            StepKind::Test => "test",
            StepKind::TestWithoutBuilding => "test-without-building",
            StepKind::Archive => "archive",
            StepKind::Export => "export",
            StepKind::Upload => "upload",
            StepKind::MergePlist => "merge-plist",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered invocation: program plus discrete arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSpec {
    pub kind: StepKind,

    pub program: String,

    /// Arguments in order; never joined into a shell string for execution
    pub args: Vec<String>,

    /// Extra environment for this invocation only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,

    /// Stale outputs removed before the step starts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clean_paths: Vec<PathBuf>,

    /// Outputs the step is expected to produce
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

impl StepSpec {
    pub fn new(kind: StepKind, program: impl Into<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            clean_paths: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Append a single argument
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append a flag followed by its value as two elements
    pub fn flag(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(value.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Position of a flag in the argument list
    pub fn position_of(&self, flag: &str) -> Option<usize> {
        self.args.iter().position(|a| a == flag)
    }

    /// Value following `flag`, if the flag is present
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.position_of(flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.position_of(flag).is_some()
    }

    /// Shell-quoted rendering for logs and error messages
    ///
    /// Only for humans re-running the command by hand.
    pub fn display_command(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Plist merge request (output plus at least two inputs)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
}

/// Paths threaded between steps of one run
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    /// Archive location, fixed before the archive step starts
    pub archive_path: Option<PathBuf>,

    /// Where export writes the package
    pub export_path: Option<PathBuf>,

    /// Package found by the artifact locator after export
    pub artifact: Option<PathBuf>,

    pub merge: Option<MergeRequest>,
}
