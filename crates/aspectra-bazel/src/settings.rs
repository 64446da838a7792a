use crate::error::BazelError;
use std::path::{Path, PathBuf};

/// Repository name the aspect directory is mounted as via `--override_repository`.
pub const ASPECT_REPOSITORY: &str = "aspectra_aspect";

pub const DEFAULT_ASPECT_LABEL: &str = "//:aspectra_info.bzl%aspectra_info_aspect";
pub const DEFAULT_ASPECT_FILE_SUFFIX: &str = ".aspectra-info.json";
pub const DEFAULT_BATCH_SIZE: usize = 25;

const OUTPUT_GROUPS: &str =
    "--output_groups=intellij-info-generic,intellij-info-java-direct-deps,intellij-resolve-java-direct-deps";

/// How a [`crate::BazelWorkspace`] drives Bazel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelSettings {
    /// Explicit Bazel executable; looked up on `PATH` when unset.
    pub binary: Option<PathBuf>,
    /// Explicit `bazel-bin` directory; asked from `bazel info` when unset.
    pub bin_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub aspect_file_suffix: String,
    /// Replaces the generated aspect flags entirely when set.
    pub aspect_options: Option<Vec<String>>,
    /// Directory holding the aspect's `.bzl` files, mounted as [`ASPECT_REPOSITORY`].
    pub aspect_directory: Option<PathBuf>,
    pub aspect_label: String,
}

impl Default for BazelSettings {
    fn default() -> Self {
        Self {
            binary: None,
            bin_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
            aspect_file_suffix: DEFAULT_ASPECT_FILE_SUFFIX.to_string(),
            aspect_options: None,
            aspect_directory: None,
            aspect_label: DEFAULT_ASPECT_LABEL.to_string(),
        }
    }
}

impl BazelSettings {
    /// Flags passed to `bazel build` ahead of the target labels.
    pub fn aspect_flags(&self) -> Vec<String> {
        if let Some(options) = &self.aspect_options {
            return options.clone();
        }

        let mut flags = Vec::new();
        match &self.aspect_directory {
            Some(dir) => {
                flags.push(format!(
                    "--override_repository={ASPECT_REPOSITORY}={}",
                    dir.display()
                ));
                flags.push(format!("--aspects=@{ASPECT_REPOSITORY}{}", self.aspect_label));
            }
            None => flags.push(format!("--aspects={}", self.aspect_label)),
        }
        flags.extend(
            [
                "-k",
                OUTPUT_GROUPS,
                "--nobuild_event_binary_file_path_conversion",
                "--noexperimental_run_validations",
                "--experimental_show_artifacts",
                "--curses=no",
                "--progress_in_terminal_title=no",
            ]
            .map(String::from),
        );
        flags
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Resolve the Bazel executable: the configured one, else `bazel` or `bazelisk` on `PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf, BazelError> {
        match &self.binary {
            Some(binary) => resolve_configured(binary),
            None => which::which("bazel")
                .or_else(|_| which::which("bazelisk"))
                .map_err(|_| BazelError::BazelNotFound),
        }
    }
}

fn resolve_configured(binary: &Path) -> Result<PathBuf, BazelError> {
    if binary.components().count() > 1 || binary.is_absolute() {
        if binary.is_file() {
            return Ok(binary.to_path_buf());
        }
        return Err(BazelError::BazelNotFound);
    }
    which::which(binary).map_err(|_| BazelError::BazelNotFound)
}
