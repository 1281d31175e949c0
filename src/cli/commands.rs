//! CLI command definitions

use crate::core::config::{
    resolve, BuiltinDefaults, ConfigOptions, ConfigSource, EnvSource, FileSource, ResolvedConfig,
};
use crate::core::error::ConfigError;
use crate::core::pipeline::Action;
use clap::Args;
use std::path::Path;

/// Run a pipeline preset
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline preset to run
    #[arg(value_enum)]
    pub action: Action,

    #[command(flatten)]
    pub options: ConfigArgs,

    /// Write the run record as JSON to this path
    #[arg(long)]
    pub summary: Option<String>,
}

/// Resolve settings and show the planned commands
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline preset to check
    #[arg(value_enum)]
    pub action: Action,

    #[command(flatten)]
    pub options: ConfigArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Explicit settings; each one overrides its XCODE_* variable and the config file
#[derive(Debug, Args, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the .xcodeproj
    #[arg(long, conflicts_with = "workspace")]
    pub project: Option<String>,

    /// Path to the .xcworkspace
    #[arg(long)]
    pub workspace: Option<String>,

    #[arg(long)]
    pub scheme: Option<String>,

    /// Build configuration [default: Release]
    #[arg(long)]
    pub configuration: Option<String>,

    /// iOS, macOS, tvOS or visionOS [default: iOS]
    #[arg(long)]
    pub platform: Option<String>,

    /// Root for logs, archives and result bundles [default: build]
    #[arg(long = "output-dir")]
    pub output_root: Option<String>,

    /// xcodebuild destination, e.g. "platform=iOS Simulator,name=iPhone 15"
    #[arg(long)]
    pub destination: Option<String>,

    #[arg(long)]
    pub test_plan: Option<String>,

    /// Prebuilt .xctestproducts for test-without-building
    #[arg(long)]
    pub test_products: Option<String>,

    /// ExportOptions.plist used by export
    #[arg(long)]
    pub export_options: Option<String>,

    /// Plist written by merge-plist
    #[arg(long)]
    pub merge_output: Option<String>,

    /// Plist merged into the output (repeat, in order)
    #[arg(long = "merge-input")]
    pub merge_inputs: Vec<String>,

    /// App Store Connect API key (.p8)
    #[arg(long)]
    pub auth_key_path: Option<String>,

    #[arg(long)]
    pub auth_key_id: Option<String>,

    #[arg(long)]
    pub auth_key_issuer: Option<String>,

    /// Base64 signing certificate
    #[arg(long)]
    pub certificate: Option<String>,

    #[arg(long)]
    pub certificate_password: Option<String>,

    /// Base64 provisioning profile
    #[arg(long)]
    pub provisioning_profile: Option<String>,

    /// Extra xcodebuild argument, appended verbatim (repeatable)
    #[arg(long = "xcodebuild-arg", allow_hyphen_values = true)]
    pub xcodebuild_args: Vec<String>,

    /// Extra altool argument, appended verbatim (repeatable)
    #[arg(long = "upload-arg", allow_hyphen_values = true)]
    pub upload_args: Vec<String>,

    /// Don't pipe xcodebuild output through xcbeautify
    #[arg(long)]
    pub disable_formatter: bool,

    /// Don't pass -allowProvisioningUpdates
    #[arg(long)]
    pub no_provisioning_updates: bool,
}

impl ConfigArgs {
    /// Explicit options for the resolver; unset switches stay `None`
    pub fn to_options(&self, action: Action) -> ConfigOptions {
        ConfigOptions {
            action: Some(action),
            project: self.project.clone(),
            workspace: self.workspace.clone(),
            scheme: self.scheme.clone(),
            configuration: self.configuration.clone(),
            platform: self.platform.clone(),
            output_root: self.output_root.clone(),
            destination: self.destination.clone(),
            test_plan: self.test_plan.clone(),
            test_products: self.test_products.clone(),
            export_options: self.export_options.clone(),
            merge_output: self.merge_output.clone(),
            merge_inputs: self.merge_inputs.clone(),
            auth_key_path: self.auth_key_path.clone(),
            auth_key_id: self.auth_key_id.clone(),
            auth_key_issuer: self.auth_key_issuer.clone(),
            certificate: self.certificate.clone(),
            certificate_password: self.certificate_password.clone(),
            provisioning_profile: self.provisioning_profile.clone(),
            xcodebuild_args: self.xcodebuild_args.clone(),
            upload_args: self.upload_args.clone(),
            disable_formatter: self.disable_formatter.then_some(true),
            allow_provisioning_updates: self.no_provisioning_updates.then_some(false),
        }
    }

    /// Resolve against the environment and an optional YAML file
    pub fn resolve(
        &self,
        action: Action,
        config_file: Option<&Path>,
        env: &EnvSource,
    ) -> Result<ResolvedConfig, ConfigError> {
        let file = config_file.map(FileSource::from_file).transpose()?;

        let mut sources: Vec<&dyn ConfigSource> = vec![env];
        if let Some(file) = &file {
            sources.push(file);
        }
        resolve(&self.to_options(action), &sources, &BuiltinDefaults::default())
    }
}
