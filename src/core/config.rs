//! Configuration resolution
//!
//! A pipeline's settings come from three layers, highest precedence first:
//!
//! 1. explicit per-invocation options ([`ConfigOptions`], filled by the CLI)
//! 2. named fallback sources, consulted in order ([`EnvSource`], [`FileSource`])
//! 3. [`BuiltinDefaults`] for the few fields that have one
//!
//! [`resolve`] walks the layers once and produces an immutable
//! [`ResolvedConfig`]. Fields a step of the chosen action needs but that no
//! layer provides fail with [`ConfigError::MissingRequiredField`].

use crate::core::error::ConfigError;
use crate::core::pipeline::Action;
use crate::core::platform::Platform;
use crate::core::step::{MergeRequest, StepKind};
use serde::{Serialize, Serializer};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Internal field names and the environment variable each one reads
pub const ENV_MAPPING: &[(&str, &str)] = &[
    ("action", "XCODE_ACTION"),
    ("project", "XCODE_PROJECT"),
    ("workspace", "XCODE_WORKSPACE"),
    ("scheme", "XCODE_SCHEME"),
    ("configuration", "XCODE_CONFIGURATION"),
    ("platform", "XCODE_PLATFORM"),
    ("output_root", "XCODE_OUTPUT_DIR"),
    ("destination", "XCODE_DESTINATION"),
    ("test_plan", "XCODE_TEST_PLAN"),
    ("test_products", "XCODE_TEST_PRODUCTS"),
    ("export_options", "XCODE_EXPORT_OPTIONS"),
    ("merge_output", "XCODE_MERGE_OUTPUT"),
    ("merge_inputs", "XCODE_MERGE_INPUTS"),
    ("auth_key_path", "XCODE_AUTH_KEY_PATH"),
    ("auth_key_id", "XCODE_AUTH_KEY_ID"),
    ("auth_key_issuer", "XCODE_AUTH_KEY_ISSUER_ID"),
    ("certificate", "XCODE_CERTIFICATE"),
    ("certificate_password", "XCODE_CERTIFICATE_PASSWORD"),
    ("provisioning_profile", "XCODE_PROVISIONING_PROFILE"),
    ("xcodebuild_args", "XCODE_BUILD_ARGS"),
    ("upload_args", "XCODE_UPLOAD_ARGS"),
    ("disable_formatter", "XCODE_DISABLE_FORMATTER"),
    ("allow_provisioning_updates", "XCODE_ALLOW_PROVISIONING_UPDATES"),
];

/// Environment variable consulted for an internal field name
pub fn env_var_for(field: &str) -> Option<&'static str> {
    ENV_MAPPING
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, var)| *var)
}

/// Explicit per-invocation options. `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub action: Option<Action>,
    pub project: Option<String>,
    pub workspace: Option<String>,
    pub scheme: Option<String>,
    pub configuration: Option<String>,
    pub platform: Option<String>,
    pub output_root: Option<String>,
    pub destination: Option<String>,
    pub test_plan: Option<String>,
    pub test_products: Option<String>,
    pub export_options: Option<String>,
    pub merge_output: Option<String>,
    pub merge_inputs: Vec<String>,
    pub auth_key_path: Option<String>,
    pub auth_key_id: Option<String>,
    pub auth_key_issuer: Option<String>,
    pub certificate: Option<String>,
    pub certificate_password: Option<String>,
    pub provisioning_profile: Option<String>,
    pub xcodebuild_args: Vec<String>,
    pub upload_args: Vec<String>,
    pub disable_formatter: Option<bool>,
    pub allow_provisioning_updates: Option<bool>,
}

/// A named fallback source keyed by internal field name
pub trait ConfigSource {
    /// Source name used in diagnostics
    fn name(&self) -> &str;

    /// Raw value for a field, if this source has one
    fn get(&self, field: &str) -> Option<String>;

    /// List value for a field. String values are split with shell-word rules.
    fn get_list(&self, field: &'static str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.get(field) {
            Some(raw) => shell_words::split(&raw)
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    field,
                    value: raw.clone(),
                    reason: format!("{} in {}", e, self.name()),
                }),
            None => Ok(None),
        }
    }
}

/// Process environment, snapshotted once
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Capture the mapped variables from the current process environment
    pub fn from_env() -> Self {
        let vars = ENV_MAPPING
            .iter()
            .filter_map(|(_, var)| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Build from explicit variable/value pairs (variables use their external names)
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, field: &str) -> Option<String> {
        env_var_for(field).and_then(|var| self.vars.get(var).cloned())
    }
}

/// Settings loaded from a YAML file, keyed by internal field name
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    name: String,
    values: HashMap<String, Value>,
}

impl FileSource {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut source = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::File { reason, .. } => ConfigError::File {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        source.name = path.display().to_string();
        Ok(source)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let parsed: Option<HashMap<String, Value>> =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::File {
                path: PathBuf::from("<inline>"),
                reason: e.to_string(),
            })?;
        let source = Self {
            name: "config file".to_string(),
            values: parsed.unwrap_or_default(),
        };
        source.validate()?;
        Ok(source)
    }

    /// Reject keys that are not known fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            if env_var_for(key).is_none() {
                return Err(ConfigError::File {
                    path: PathBuf::from(&self.name),
                    reason: format!("unknown field '{}'", key),
                });
            }
        }
        Ok(())
    }

    fn scalar(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, field: &str) -> Option<String> {
        self.values.get(field).and_then(Self::scalar)
    }

    fn get_list(&self, field: &'static str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.values.get(field) {
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| {
                    Self::scalar(item).ok_or_else(|| ConfigError::InvalidValue {
                        field,
                        value: format!("{:?}", item),
                        reason: format!("list items must be scalars in {}", self.name),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::Null) | None => Ok(None),
            Some(other) => match Self::scalar(other) {
                Some(raw) => shell_words::split(&raw)
                    .map(Some)
                    .map_err(|e| ConfigError::InvalidValue {
                        field,
                        value: raw,
                        reason: e.to_string(),
                    }),
                None => Err(ConfigError::InvalidValue {
                    field,
                    value: format!("{:?}", other),
                    reason: "expected a list".to_string(),
                }),
            },
        }
    }
}

/// Literal defaults for the fields that have one
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub configuration: String,
    pub output_root: PathBuf,
    pub platform: Platform,
    pub disable_formatter: bool,
    pub allow_provisioning_updates: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            configuration: "Release".to_string(),
            output_root: PathBuf::from("build"),
            platform: Platform::Ios,
            disable_formatter: false,
            allow_provisioning_updates: true,
        }
    }
}

/// Project or workspace the build tool operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRef {
    Project(PathBuf),
    Workspace(PathBuf),
}

impl ProjectRef {
    /// xcodebuild flag and value
    pub fn flag(&self) -> (&'static str, &Path) {
        match self {
            ProjectRef::Project(p) => ("-project", p),
            ProjectRef::Workspace(p) => ("-workspace", p),
        }
    }
}

/// Signing/upload credential locators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// App Store Connect API key
    ApiKey {
        key_path: PathBuf,
        key_id: String,
        issuer_id: String,
    },
    /// Certificate and profile blobs, installed into a keychain by the caller
    Certificate {
        #[serde(serialize_with = "redact")]
        certificate: String,
        #[serde(serialize_with = "redact")]
        password: String,
        #[serde(serialize_with = "redact")]
        profile: String,
    },
}

fn redact<T, S: Serializer>(_: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("<redacted>")
}

/// Fully resolved, validated settings for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub action: Action,
    /// None lets xcodebuild pick the project in its working directory
    pub project: Option<ProjectRef>,
    pub scheme: Option<String>,
    pub configuration: String,
    pub platform: Platform,
    pub output_root: PathBuf,
    pub destination: Option<String>,
    pub test_plan: Option<String>,
    pub test_products: Option<PathBuf>,
    pub export_options: Option<PathBuf>,
    pub merge: Option<MergeRequest>,
    pub credentials: Option<Credentials>,
    pub xcodebuild_args: Vec<String>,
    pub upload_args: Vec<String>,
    pub disable_formatter: bool,
    pub allow_provisioning_updates: bool,
    /// Derived from platform
    pub upload_platform: String,
    /// Derived from platform
    pub generic_destination: String,
}

impl ResolvedConfig {
    /// Name prefix shared by the run's log and result bundle
    pub fn run_stem(&self) -> Option<String> {
        self.scheme.clone().or_else(|| {
            self.test_products
                .as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
    }

    pub fn derived_data_path(&self) -> PathBuf {
        self.output_root.join("DerivedData")
    }

    /// `<root>/<scheme>.xcarchive`
    pub fn archive_path(&self) -> Option<PathBuf> {
        self.scheme
            .as_ref()
            .map(|s| self.output_root.join(format!("{}.xcarchive", s)))
    }

    /// `<root>/<scheme>.xcarchive/Products`
    pub fn export_path(&self) -> Option<PathBuf> {
        self.archive_path().map(|p| p.join("Products"))
    }

    /// `<root>/<stem>_<action>.xcresult`
    pub fn result_bundle_path(&self) -> PathBuf {
        self.output_root.join(format!("{}.xcresult", self.file_prefix()))
    }

    /// `<root>/<stem>_<action>.log`, shared by every step of the run
    pub fn log_path(&self) -> PathBuf {
        self.output_root.join(format!("{}.log", self.file_prefix()))
    }

    fn file_prefix(&self) -> String {
        match self.run_stem() {
            Some(stem) => format!("{}_{}", stem, self.action),
            None => self.action.to_string(),
        }
    }
}

/// Merge explicit options, fallback sources and defaults into a [`ResolvedConfig`]
///
/// Fallback sources are consulted in slice order. No files or directories
/// are created.
pub fn resolve(
    explicit: &ConfigOptions,
    fallbacks: &[&dyn ConfigSource],
    defaults: &BuiltinDefaults,
) -> Result<ResolvedConfig, ConfigError> {
    let layers = Layers { fallbacks };

    let action = match explicit.action {
        Some(action) => action,
        None => {
            let raw = require("action", layers.text("action", None))?;
            raw.parse::<Action>().map_err(|reason| ConfigError::InvalidValue {
                field: "action",
                value: raw.clone(),
                reason,
            })?
        }
    };

    let platform_raw = layers.text("platform", explicit.platform.as_deref());
    let platform = match platform_raw {
        Some(raw) => raw
            .parse::<Platform>()
            .map_err(|e| ConfigError::UnsupportedPlatform(e.0))?,
        None => defaults.platform,
    };

    let configuration = layers
        .text("configuration", explicit.configuration.as_deref())
        .unwrap_or_else(|| defaults.configuration.clone());
    let output_root = layers
        .text("output_root", explicit.output_root.as_deref())
        .map(PathBuf::from)
        .unwrap_or_else(|| defaults.output_root.clone());

    let project_path = layers.text("project", explicit.project.as_deref());
    let workspace_path = layers.text("workspace", explicit.workspace.as_deref());
    let scheme = layers.text("scheme", explicit.scheme.as_deref());
    let destination = layers.text("destination", explicit.destination.as_deref());
    let test_plan = layers.text("test_plan", explicit.test_plan.as_deref());
    let test_products = layers
        .text("test_products", explicit.test_products.as_deref())
        .map(PathBuf::from);
    let export_options = layers
        .text("export_options", explicit.export_options.as_deref())
        .map(PathBuf::from);

    let project = match (project_path, workspace_path) {
        (Some(_), Some(w)) => {
            return Err(ConfigError::InvalidValue {
                field: "workspace",
                value: w,
                reason: "project and workspace are mutually exclusive".to_string(),
            })
        }
        (Some(p), None) => Some(ProjectRef::Project(PathBuf::from(p))),
        (None, Some(w)) => Some(ProjectRef::Workspace(PathBuf::from(w))),
        (None, None) => None,
    };

    // Prebuilt test products replace project/scheme entirely
    let prebuilt = action == Action::TestWithoutBuilding && test_products.is_some();
    if action.uses_xcodebuild() && !prebuilt {
        require("scheme", scheme.clone())?;
    }
    if action.includes(StepKind::Test) || action.includes(StepKind::TestWithoutBuilding) {
        require("destination", destination.clone())?;
    }
    if action.includes(StepKind::Export) {
        require("export_options", export_options.clone())?;
    }

    let merge = if action.includes(StepKind::MergePlist) {
        let output = require(
            "merge_output",
            layers.text("merge_output", explicit.merge_output.as_deref()),
        )?;
        let inputs = layers.list("merge_inputs", &explicit.merge_inputs)?;
        if inputs.is_empty() {
            return Err(ConfigError::MissingRequiredField("merge_inputs"));
        }
        Some(MergeRequest {
            output: PathBuf::from(output),
            inputs: inputs.into_iter().map(PathBuf::from).collect(),
        })
    } else {
        None
    };

    let credentials = if action.needs_credentials() {
        Some(resolve_credentials(
            explicit,
            &layers,
            action.includes(StepKind::Upload),
        )?)
    } else {
        None
    };

    let xcodebuild_args = layers.list("xcodebuild_args", &explicit.xcodebuild_args)?;
    let upload_args = layers.list("upload_args", &explicit.upload_args)?;
    let disable_formatter = layers
        .flag("disable_formatter", explicit.disable_formatter)?
        .unwrap_or(defaults.disable_formatter);
    let allow_provisioning_updates = layers
        .flag("allow_provisioning_updates", explicit.allow_provisioning_updates)?
        .unwrap_or(defaults.allow_provisioning_updates);

    Ok(ResolvedConfig {
        action,
        project,
        scheme,
        configuration,
        platform,
        output_root,
        destination,
        test_plan,
        test_products,
        export_options,
        merge,
        credentials,
        xcodebuild_args,
        upload_args,
        disable_formatter,
        allow_provisioning_updates,
        upload_platform: platform.upload_token().to_string(),
        generic_destination: platform.generic_destination(),
    })
}

fn resolve_credentials(
    explicit: &ConfigOptions,
    layers: &Layers<'_>,
    upload: bool,
) -> Result<Credentials, ConfigError> {
    let key_path = layers.text("auth_key_path", explicit.auth_key_path.as_deref());
    let key_id = layers.text("auth_key_id", explicit.auth_key_id.as_deref());
    let issuer_id = layers.text("auth_key_issuer", explicit.auth_key_issuer.as_deref());

    let any_api_key = key_path.is_some() || key_id.is_some() || issuer_id.is_some();
    if any_api_key || upload {
        return Ok(Credentials::ApiKey {
            key_path: PathBuf::from(require("auth_key_path", key_path)?),
            key_id: require("auth_key_id", key_id)?,
            issuer_id: require("auth_key_issuer", issuer_id)?,
        });
    }

    let certificate = layers.text("certificate", explicit.certificate.as_deref());
    if certificate.is_none() {
        return Err(ConfigError::MissingRequiredField("auth_key_path"));
    }
    Ok(Credentials::Certificate {
        certificate: require("certificate", certificate)?,
        password: require(
            "certificate_password",
            layers.text("certificate_password", explicit.certificate_password.as_deref()),
        )?,
        profile: require(
            "provisioning_profile",
            layers.text("provisioning_profile", explicit.provisioning_profile.as_deref()),
        )?,
    })
}

fn require<T>(field: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingRequiredField(field))
}

fn non_empty(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Fallback lookup in precedence order
struct Layers<'a> {
    fallbacks: &'a [&'a dyn ConfigSource],
}

impl Layers<'_> {
    fn text(&self, field: &str, explicit: Option<&str>) -> Option<String> {
        if let Some(value) = explicit.filter(|v| non_empty(v)) {
            return Some(value.to_string());
        }
        self.fallbacks
            .iter()
            .filter_map(|source| source.get(field))
            .find(|v| non_empty(v))
    }

    fn list(&self, field: &'static str, explicit: &[String]) -> Result<Vec<String>, ConfigError> {
        if !explicit.is_empty() {
            return Ok(explicit.to_vec());
        }
        for source in self.fallbacks {
            if let Some(values) = source.get_list(field)? {
                if !values.is_empty() {
                    return Ok(values);
                }
            }
        }
        Ok(Vec::new())
    }

    fn flag(&self, field: &'static str, explicit: Option<bool>) -> Result<Option<bool>, ConfigError> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        match self.text(field, None) {
            Some(raw) => parse_bool(&raw).map(Some).ok_or(ConfigError::InvalidValue {
                field,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
            None => Ok(None),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
