//! Target platform model and the values derived from it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Apple platforms a pipeline can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "tvOS")]
    TvOs,
    #[serde(rename = "visionOS")]
    VisionOs,
}

/// Error returned when a platform name is outside the supported set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlatform(pub String);

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Ios,
        Platform::MacOs,
        Platform::TvOs,
        Platform::VisionOs,
    ];

    /// Canonical spelling, as xcodebuild expects it in destinations
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::MacOs => "macOS",
            Platform::TvOs => "tvOS",
            Platform::VisionOs => "visionOS",
        }
    }

    /// Value passed to `altool --type`
    pub fn upload_token(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::MacOs => "macos",
            Platform::TvOs => "appletvos",
            Platform::VisionOs => "visionos",
        }
    }

    /// Destination used when building without a concrete device
    pub fn generic_destination(&self) -> String {
        format!("generic/platform={}", self.as_str())
    }

    /// File extension of the package an export produces
    pub fn package_extension(&self) -> &'static str {
        match self {
            Platform::MacOs => "pkg",
            _ => "ipa",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}
