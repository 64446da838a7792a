use anyhow::{Context, Result};
use aspectra_bazel::{
    bazel_workspace_root, BazelSettings, BazelWorkspace, DefaultCommandRunner,
    DEFAULT_ASPECT_LABEL,
};
use aspectra_classpath::ResolutionMode;
use aspectra_config::{AspectraConfig, BazelConfig, ClasspathMode, ConfigDiagnostics};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A configured workspace: config loaded, logging installed, Bazel located.
pub struct Session {
    config: AspectraConfig,
    workspace: Arc<BazelWorkspace<DefaultCommandRunner>>,
}

impl Session {
    pub fn open(path: &Path) -> Result<Self> {
        let root = bazel_workspace_root(path)
            .with_context(|| format!("{} is not inside a Bazel workspace", path.display()))?;
        let (config, config_path, diagnostics) = aspectra_config::load_for_workspace(&root)?;
        aspectra_config::init_tracing(&config.logging);
        report_diagnostics(config_path.as_deref(), &diagnostics);

        let runner =
            DefaultCommandRunner::default().with_max_output_bytes(config.bazel.max_output_bytes);
        let workspace = BazelWorkspace::new(root, runner, bazel_settings(&config.bazel))?;
        Ok(Self {
            config,
            workspace: Arc::new(workspace),
        })
    }

    pub fn config(&self) -> &AspectraConfig {
        &self.config
    }

    pub fn workspace(&self) -> &BazelWorkspace<DefaultCommandRunner> {
        &self.workspace
    }

    pub fn workspace_arc(&self) -> Arc<BazelWorkspace<DefaultCommandRunner>> {
        Arc::clone(&self.workspace)
    }

    pub fn resolution_mode(&self) -> ResolutionMode {
        match self.config.classpath.mode {
            ClasspathMode::Production => ResolutionMode::Production,
            ClasspathMode::Verification => ResolutionMode::Verification,
        }
    }
}

/// Config for `path`, looked up from its workspace root (or `path` itself outside a workspace).
pub fn load_config(path: &Path) -> Result<(AspectraConfig, Option<PathBuf>, ConfigDiagnostics)> {
    let root = bazel_workspace_root(path).unwrap_or_else(|| path.to_path_buf());
    Ok(aspectra_config::load_for_workspace(&root)?)
}

pub fn bazel_settings(config: &BazelConfig) -> BazelSettings {
    BazelSettings {
        binary: config.binary.clone(),
        bin_dir: config.bin_dir.clone(),
        batch_size: config.batch_size,
        aspect_file_suffix: config.aspect_file_suffix.clone(),
        aspect_options: config.aspect_options.clone(),
        aspect_directory: config.aspect.directory.clone(),
        aspect_label: config
            .aspect
            .label
            .clone()
            .unwrap_or_else(|| DEFAULT_ASPECT_LABEL.to_string()),
    }
}

fn report_diagnostics(path: Option<&Path>, diagnostics: &ConfigDiagnostics) {
    let path = path.map(|p| p.display().to_string()).unwrap_or_default();
    for key in &diagnostics.unknown_keys {
        tracing::warn!(target: "aspectra.config", path = %path, key = %key, "unknown config key");
    }
    for warning in &diagnostics.warnings {
        tracing::warn!(target: "aspectra.config", path = %path, "{warning}");
    }
}
