//! Configuration and logging setup for Aspectra.
//!
//! Configuration lives in `aspectra.toml` (or `.aspectra.toml`) at the workspace root. Every
//! key is optional; a missing file means defaults.

mod diagnostics;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use diagnostics::{ConfigDiagnostics, ConfigWarning};
pub use logging::{init_tracing, LoggingConfig};

/// Environment variable naming an explicit config file (absolute or workspace relative).
pub const ASPECTRA_CONFIG_ENV_VAR: &str = "ASPECTRA_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message only; the rendered error embeds a snippet of the input.
        ConfigError::Toml(err.message().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectraConfig {
    #[serde(default)]
    pub bazel: BazelConfig,
    #[serde(default)]
    pub classpath: ClasspathConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BazelConfig {
    /// Bazel executable; looked up on `PATH` (`bazel`, then `bazelisk`) when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// `bazel-bin` directory; asked from `bazel info bazel-bin` when unset.
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Number of targets per `bazel build` invocation.
    #[serde(default = "BazelConfig::default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "BazelConfig::default_aspect_file_suffix")]
    pub aspect_file_suffix: String,

    /// Replaces the generated aspect flags entirely.
    #[serde(default)]
    pub aspect_options: Option<Vec<String>>,

    /// Cap on captured output per Bazel invocation.
    #[serde(default = "BazelConfig::default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default)]
    pub aspect: AspectConfig,
}

impl BazelConfig {
    fn default_batch_size() -> usize {
        25
    }

    fn default_aspect_file_suffix() -> String {
        ".aspectra-info.json".to_owned()
    }

    fn default_max_output_bytes() -> usize {
        16 * 1024 * 1024
    }
}

impl Default for BazelConfig {
    fn default() -> Self {
        Self {
            binary: None,
            bin_dir: None,
            batch_size: Self::default_batch_size(),
            aspect_file_suffix: Self::default_aspect_file_suffix(),
            aspect_options: None,
            max_output_bytes: Self::default_max_output_bytes(),
            aspect: AspectConfig::default(),
        }
    }
}

/// Where the IDE info aspect comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectConfig {
    /// Directory holding the aspect's `.bzl` files, mounted as an overridden repository.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Aspect label, e.g. `//:aspectra_info.bzl%aspectra_info_aspect`.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClasspathMode {
    #[default]
    Production,
    Verification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathConfig {
    #[serde(default = "ClasspathConfig::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default)]
    pub mode: ClasspathMode,
}

impl ClasspathConfig {
    fn default_cache_ttl_secs() -> u64 {
        300
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ClasspathConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: Self::default_cache_ttl_secs(),
            mode: ClasspathMode::default(),
        }
    }
}

impl AspectraConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_path_with_diagnostics(path).map(|(config, _)| config)
    }

    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str_with_diagnostics(&text)
    }

    /// Parse TOML, collecting unrecognized keys and suspicious values instead of failing.
    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<AspectraConfig>(text)?;
        let diagnostics = ConfigDiagnostics {
            unknown_keys,
            warnings: config.validate(),
        };
        Ok((config, diagnostics))
    }

    fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.bazel.batch_size == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "bazel.batch_size".to_owned(),
                message: "must be at least 1; using 1".to_owned(),
            });
        }
        if self.bazel.aspect_file_suffix.is_empty() {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "bazel.aspect_file_suffix".to_owned(),
                message: "empty suffix matches every reported artifact".to_owned(),
            });
        }
        if self.classpath.cache_ttl_secs == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "classpath.cache_ttl_secs".to_owned(),
                message: "classpaths will be recomputed on every request".to_owned(),
            });
        }
        if let Some(dir) = &self.bazel.aspect.directory {
            if !dir.is_dir() {
                warnings.push(ConfigWarning::MissingPath {
                    toml_path: "bazel.aspect.directory".to_owned(),
                    path: dir.clone(),
                });
            }
        }
        warnings
    }
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Environment variables are process-global; tests that set [`ASPECTRA_CONFIG_ENV_VAR`] wrap
/// the mutation and the discovery in this helper.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the config file for a workspace root.
///
/// Search order:
/// 1) `ASPECTRA_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `aspectra.toml` in `workspace_root`
/// 3) `.aspectra.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(ASPECTRA_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["aspectra.toml", ".aspectra.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the config for a workspace root.
///
/// If no config is present, returns [`AspectraConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(AspectraConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((AspectraConfig::default(), None, ConfigDiagnostics::default()));
    };

    let (config, diagnostics) = AspectraConfig::load_from_path_with_diagnostics(&path)?;
    Ok((config, Some(path), diagnostics))
}
