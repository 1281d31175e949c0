//! Pipeline presets: which steps an action chains together

use crate::core::step::StepKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named pipeline preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    BuildForTesting,
    Test,
    TestWithoutBuilding,
    Archive,
    Export,
    Release,
    MergePlist,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::BuildForTesting,
        Action::Test,
        Action::TestWithoutBuilding,
        Action::Archive,
        Action::Export,
        Action::Release,
        Action::MergePlist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::BuildForTesting => "build-for-testing",
            Action::Test => "test",
            Action::TestWithoutBuilding => "test-without-building",
            Action::Archive => "archive",
            Action::Export => "export",
            Action::Release => "release",
            Action::MergePlist => "merge-plist",
        }
    }

    /// Ordered step chain for this action
    pub fn steps(&self) -> &'static [StepKind] {
        match self {
            Action::BuildForTesting => &[StepKind::BuildForTesting],
            Action::Test => &[StepKind::Test],
            Action::TestWithoutBuilding => &[StepKind::TestWithoutBuilding],
            Action::Archive => &[StepKind::Archive],
            Action::Export => &[StepKind::Archive, StepKind::Export],
            Action::Release => &[StepKind::Archive, StepKind::Export, StepKind::Upload],
            Action::MergePlist => &[StepKind::MergePlist],
        }
    }

    pub fn includes(&self, kind: StepKind) -> bool {
        self.steps().contains(&kind)
    }

    /// Whether any step of this action talks to xcodebuild
    pub fn uses_xcodebuild(&self) -> bool {
        !matches!(self, Action::MergePlist)
    }

    /// Whether any step signs or uploads and so needs credentials
    pub fn needs_credentials(&self) -> bool {
        self.includes(StepKind::Archive)
            || self.includes(StepKind::Export)
            || self.includes(StepKind::Upload)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}
