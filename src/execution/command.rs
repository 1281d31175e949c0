//! Command builder: turns a resolved config into concrete tool invocations
//!
//! Every flag and its value are separate arguments, so paths and
//! destinations containing spaces or commas reach the tool unchanged.
//! Nothing here touches the filesystem.

use crate::core::config::{Credentials, ResolvedConfig};
use crate::core::error::BuildError;
use crate::core::step::{MergeRequest, StepContext, StepKind, StepSpec};
use std::path::{Path, PathBuf};

/// Environment variable altool reads the API key directory from
pub const API_KEYS_DIR_VAR: &str = "API_PRIVATE_KEYS_DIR";

/// Program names for the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    pub xcodebuild: String,
    pub xcrun: String,
    pub plist_buddy: String,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            xcodebuild: "xcodebuild".to_string(),
            xcrun: "xcrun".to_string(),
            plist_buddy: "/usr/libexec/PlistBuddy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    tools: ToolSet,
}

impl CommandBuilder {
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    /// Build the invocation for one step
    ///
    /// `ctx` carries paths produced by earlier steps (archive location,
    /// located package). Anything a step needs but cannot find is reported
    /// as [`BuildError::MissingContext`].
    pub fn build(
        &self,
        kind: StepKind,
        config: &ResolvedConfig,
        ctx: &StepContext,
    ) -> Result<StepSpec, BuildError> {
        match kind {
            StepKind::BuildForTesting | StepKind::Test | StepKind::TestWithoutBuilding => {
                self.build_or_test(kind, config)
            }
            StepKind::Archive => self.archive(config, ctx),
            StepKind::Export => self.export(config, ctx),
            StepKind::Upload => self.upload(config, ctx),
            StepKind::MergePlist => {
                let request = ctx
                    .merge
                    .as_ref()
                    .or(config.merge.as_ref())
                    .ok_or(BuildError::MissingContext {
                        step: kind,
                        what: "merge request",
                    })?;
                self.merge(request)
            }
        }
    }

    /// Render every step of the configured action without running anything
    ///
    /// The upload step gets a placeholder package path, since the real one
    /// is only known once export has run.
    pub fn preview(&self, config: &ResolvedConfig) -> Result<Vec<StepSpec>, (StepKind, BuildError)> {
        let export_path = config.export_path();
        let placeholder = export_path.as_ref().map(|dir| {
            let stem = config.scheme.as_deref().unwrap_or("App");
            dir.join(format!("{}.{}", stem, config.platform.package_extension()))
        });
        let ctx = StepContext {
            archive_path: config.archive_path(),
            export_path,
            artifact: placeholder,
            merge: config.merge.clone(),
        };

        config
            .action
            .steps()
            .iter()
            .map(|&kind| self.build(kind, config, &ctx).map_err(|e| (kind, e)))
            .collect()
    }

    fn build_or_test(&self, kind: StepKind, config: &ResolvedConfig) -> Result<StepSpec, BuildError> {
        let mut spec = StepSpec::new(kind, &self.tools.xcodebuild);
        spec.arg(kind.as_str());

        let prebuilt = match (kind, &config.test_products) {
            (StepKind::TestWithoutBuilding, Some(products)) => {
                spec.flag("-testProductsPath", path_arg(products));
                true
            }
            _ => {
                push_project(&mut spec, config);
                spec.flag("-scheme", require_scheme(kind, config)?);
                false
            }
        };

        let destination = match kind {
            StepKind::BuildForTesting => config
                .destination
                .clone()
                .unwrap_or_else(|| config.generic_destination.clone()),
            _ => config.destination.clone().ok_or(BuildError::MissingContext {
                step: kind,
                what: "destination",
            })?,
        };
        spec.flag("-destination", destination);

        if !prebuilt {
            spec.flag("-configuration", &config.configuration);
        }
        spec.flag("-derivedDataPath", path_arg(&config.derived_data_path()));

        let bundle = config.result_bundle_path();
        spec.flag("-resultBundlePath", path_arg(&bundle));
        spec.clean_paths.push(bundle.clone());
        spec.artifacts.push(bundle);

        if kind == StepKind::Test {
            if let Some(plan) = &config.test_plan {
                spec.flag("-testPlan", plan);
            }
        }

        spec.args(config.xcodebuild_args.iter().cloned());
        Ok(spec)
    }

    fn archive(&self, config: &ResolvedConfig, ctx: &StepContext) -> Result<StepSpec, BuildError> {
        let kind = StepKind::Archive;
        let archive_path = ctx
            .archive_path
            .clone()
            .or_else(|| config.archive_path())
            .ok_or(BuildError::MissingContext {
                step: kind,
                what: "archive path",
            })?;

        let mut spec = StepSpec::new(kind, &self.tools.xcodebuild);
        spec.arg("archive");
        push_project(&mut spec, config);
        spec.flag("-scheme", require_scheme(kind, config)?)
            .flag("-destination", &config.generic_destination)
            .flag("-derivedDataPath", path_arg(&config.derived_data_path()))
            .flag("-archivePath", path_arg(&archive_path))
            .flag("-configuration", &config.configuration);
        push_signing(&mut spec, config);
        spec.args(config.xcodebuild_args.iter().cloned());

        spec.clean_paths.push(archive_path.clone());
        spec.artifacts.push(archive_path);
        Ok(spec)
    }

    fn export(&self, config: &ResolvedConfig, ctx: &StepContext) -> Result<StepSpec, BuildError> {
        let kind = StepKind::Export;
        let archive_path = ctx
            .archive_path
            .clone()
            .or_else(|| config.archive_path())
            .ok_or(BuildError::MissingContext {
                step: kind,
                what: "archive path",
            })?;
        let export_path = ctx
            .export_path
            .clone()
            .unwrap_or_else(|| archive_path.join("Products"));
        let options = config.export_options.as_ref().ok_or(BuildError::MissingContext {
            step: kind,
            what: "export options plist",
        })?;

        let mut spec = StepSpec::new(kind, &self.tools.xcodebuild);
        spec.arg("-exportArchive")
            .flag("-archivePath", path_arg(&archive_path))
            .flag("-exportOptionsPlist", path_arg(options))
            .flag("-exportPath", path_arg(&export_path));
        push_signing(&mut spec, config);
        spec.args(config.xcodebuild_args.iter().cloned());

        spec.artifacts.push(export_path);
        Ok(spec)
    }

    fn upload(&self, config: &ResolvedConfig, ctx: &StepContext) -> Result<StepSpec, BuildError> {
        let kind = StepKind::Upload;
        let artifact = ctx.artifact.as_ref().ok_or(BuildError::MissingContext {
            step: kind,
            what: "package to upload",
        })?;
        let (key_path, key_id, issuer_id) = match &config.credentials {
            Some(Credentials::ApiKey {
                key_path,
                key_id,
                issuer_id,
            }) => (key_path, key_id, issuer_id),
            _ => {
                return Err(BuildError::MissingContext {
                    step: kind,
                    what: "API key credentials",
                })
            }
        };

        let mut spec = StepSpec::new(kind, &self.tools.xcrun);
        spec.arg("altool")
            .arg("--upload-app")
            .flag("--file", path_arg(artifact))
            .flag("--type", &config.upload_platform)
            .flag("--apiKey", key_id)
            .flag("--apiIssuer", issuer_id);
        spec.args(config.upload_args.iter().cloned());

        spec.env.push((API_KEYS_DIR_VAR.to_string(), path_arg(&key_dir(key_path))));
        Ok(spec)
    }

    fn merge(&self, request: &MergeRequest) -> Result<StepSpec, BuildError> {
        if request.inputs.len() < 2 {
            return Err(BuildError::InsufficientInputs {
                count: request.inputs.len(),
            });
        }

        let mut spec = StepSpec::new(StepKind::MergePlist, &self.tools.plist_buddy);
        // PlistBuddy splits its command string on whitespace itself
        for input in &request.inputs {
            let input = path_arg(input);
            spec.flag("-c", format!("Merge {}", shell_words::quote(&input)));
        }
        spec.arg(path_arg(&request.output));

        if !request.inputs.contains(&request.output) {
            spec.clean_paths.push(request.output.clone());
        }
        spec.artifacts.push(request.output.clone());
        Ok(spec)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn key_dir(key_path: &Path) -> PathBuf {
    match key_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn require_scheme(step: StepKind, config: &ResolvedConfig) -> Result<&str, BuildError> {
    config.scheme.as_deref().ok_or(BuildError::MissingContext {
        step,
        what: "scheme",
    })
}

fn push_project(spec: &mut StepSpec, config: &ResolvedConfig) {
    if let Some(project) = &config.project {
        let (flag, path) = project.flag();
        spec.flag(flag, path_arg(path));
    }
}

fn push_signing(spec: &mut StepSpec, config: &ResolvedConfig) {
    if config.allow_provisioning_updates {
        spec.arg("-allowProvisioningUpdates");
    }
    if let Some(Credentials::ApiKey {
        key_path,
        key_id,
        issuer_id,
    }) = &config.credentials
    {
        spec.flag("-authenticationKeyPath", path_arg(key_path))
            .flag("-authenticationKeyID", key_id)
            .flag("-authenticationKeyIssuerID", issuer_id);
    }
}
