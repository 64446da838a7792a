use crate::{
    aspect_runner::{AspectCommandRunner, AspectGenerator},
    build_file::BuildFileModel,
    cache::AspectInfoCache,
    closure::TargetInfoSet,
    command::{CommandOutput, CommandRunner},
    error::BazelError,
    label::Label,
    options::CommandOptions,
    settings::BazelSettings,
};
use indexmap::IndexMap;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

/// Walk upwards from `start` to find the Bazel workspace root.
///
/// A workspace root is identified by the presence of one of:
/// - `WORKSPACE`
/// - `WORKSPACE.bazel`
/// - `MODULE.bazel`
pub fn bazel_workspace_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let start = start.as_ref();
    let mut dir = if start.is_file() {
        start.parent()?
    } else {
        start
    };

    loop {
        if is_bazel_workspace(dir) {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

pub fn is_bazel_workspace(root: &Path) -> bool {
    ["WORKSPACE", "WORKSPACE.bazel", "MODULE.bazel"]
        .iter()
        .any(|marker| root.join(marker).is_file())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelWorkspaceDiscovery {
    pub root: PathBuf,
}

impl BazelWorkspaceDiscovery {
    pub fn discover(start: impl AsRef<Path>) -> Option<Self> {
        bazel_workspace_root(start).map(|root| Self { root })
    }
}

/// One Bazel workspace and everything learned about it during a session.
///
/// The aspect cache lives here rather than in a global so that two workspaces never share
/// closures.
#[derive(Debug)]
pub struct BazelWorkspace<R: CommandRunner> {
    root: PathBuf,
    program: PathBuf,
    runner: Arc<R>,
    settings: BazelSettings,
    cache: AspectInfoCache,
    command_options: OnceLock<CommandOptions>,
    bazel_bin: OnceLock<PathBuf>,
}

impl<R: CommandRunner + 'static> BazelWorkspace<R> {
    /// Open `root`, locating the Bazel executable from `settings` or `PATH`.
    pub fn new(root: PathBuf, runner: R, settings: BazelSettings) -> Result<Self, BazelError> {
        let program = settings.resolve_binary()?;
        Ok(Self::with_program(root, runner, settings, program))
    }

    /// Open `root` with an already resolved Bazel executable.
    pub fn with_program(root: PathBuf, runner: R, settings: BazelSettings, program: PathBuf) -> Self {
        let runner = Arc::new(runner);
        let generator =
            AspectCommandRunner::new(&root, program.clone(), Arc::clone(&runner), &settings);
        Self::with_generator(root, runner, settings, program, Box::new(generator))
    }

    /// Open `root` with a custom aspect generator; the runner still serves `query`/`info`.
    pub fn with_generator(
        root: PathBuf,
        runner: Arc<R>,
        settings: BazelSettings,
        program: PathBuf,
        generator: Box<dyn AspectGenerator>,
    ) -> Self {
        Self {
            root,
            program,
            runner,
            settings,
            cache: AspectInfoCache::new(generator),
            command_options: OnceLock::new(),
            bazel_bin: OnceLock::new(),
        }
    }
}

impl<R: CommandRunner> BazelWorkspace<R> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn settings(&self) -> &BazelSettings {
        &self.settings
    }

    pub fn aspect_cache(&self) -> &AspectInfoCache {
        &self.cache
    }

    /// Transitive aspect closures for `labels`, served from the session cache when possible.
    pub fn aspect_target_infos<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a Label>,
        caller: &str,
    ) -> Result<IndexMap<Label, TargetInfoSet>, BazelError> {
        self.cache.get(labels, caller)
    }

    /// Flush the cached closures of every package whose `BUILD`/`BUILD.bazel` file changed.
    ///
    /// Relative paths are taken as workspace relative; absolute paths outside the root are
    /// ignored.
    pub fn invalidate_changed_build_files(&self, changed: &[PathBuf]) -> Vec<Label> {
        let mut flushed = Vec::new();
        for path in changed {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if file_name != "BUILD" && file_name != "BUILD.bazel" {
                continue;
            }
            let rel = if path.is_absolute() {
                match path.strip_prefix(&self.root) {
                    Ok(rel) => rel,
                    Err(_) => {
                        tracing::debug!(
                            target = "aspectra.bazel",
                            path = %path.display(),
                            "changed BUILD file is outside the workspace"
                        );
                        continue;
                    }
                }
            } else {
                path.as_path()
            };
            let package = rel
                .parent()
                .map(|dir| {
                    dir.components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            match Label::wildcard(&package) {
                Ok(package) => flushed.extend(self.cache.flush_for_package(&package)),
                Err(err) => tracing::debug!(
                    target = "aspectra.bazel",
                    path = %path.display(),
                    error = %err,
                    "changed BUILD file does not map to a package"
                ),
            }
        }
        flushed
    }

    /// `.bazelrc` options in effect for `bazel test`, computed once per session.
    pub fn command_options(&self) -> &CommandOptions {
        self.command_options.get_or_init(|| {
            let args = ["test", "--announce_rc", "--nobuild"].map(String::from);
            match self.run(&args) {
                // The report goes to stderr; the exit code is irrelevant without targets.
                Ok(output) => {
                    let mut options = CommandOptions::parse(&output.stderr);
                    for line in output.stdout.lines() {
                        options.parse_line(line);
                    }
                    options
                }
                Err(err) => {
                    tracing::warn!(
                        target = "aspectra.bazel",
                        error = %err,
                        "failed to read workspace command options"
                    );
                    CommandOptions::default()
                }
            }
        })
    }

    /// The `bazel-bin` output directory.
    pub fn bazel_bin(&self) -> Result<PathBuf, BazelError> {
        if let Some(dir) = &self.settings.bin_dir {
            return Ok(if dir.is_absolute() {
                dir.clone()
            } else {
                self.root.join(dir)
            });
        }
        if let Some(dir) = self.bazel_bin.get() {
            return Ok(dir.clone());
        }

        let args = ["info", "bazel-bin"].map(String::from);
        let output = self.run_checked(&args)?;
        let dir = PathBuf::from(output.stdout.trim());
        Ok(self.bazel_bin.get_or_init(|| dir).clone())
    }

    /// Name of the host OS as used in Bazel's remote Java tools repositories.
    pub fn operating_system(&self) -> &'static str {
        match std::env::consts::OS {
            "macos" => "darwin",
            "windows" => "windows",
            "linux" => "linux",
            other => other,
        }
    }

    /// Rule kinds of every target declared in `package`'s BUILD file.
    pub fn query_build_file(&self, package: &Label) -> Result<BuildFileModel, BazelError> {
        let pattern = package.package_label();
        let args = vec![
            "query".to_string(),
            format!("kind(rule, {pattern})"),
            "--output=label_kind".to_string(),
        ];
        let output = self.run_checked(&args)?;
        Ok(BuildFileModel::parse_label_kind(
            package.package_path(),
            &output.stdout,
        ))
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    fn run(&self, args: &[String]) -> Result<CommandOutput, BazelError> {
        self.runner
            .run(&self.root, &self.program, args)
            .map_err(|err| BazelError::from_io(self.command_line(args), err))
    }

    fn run_checked(&self, args: &[String]) -> Result<CommandOutput, BazelError> {
        let output = self.run(args)?;
        if !output.success() {
            return Err(BazelError::CommandFailed {
                command: self.command_line(args),
                status: output
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |code| format!("exit code {code}")),
                output: output.stderr,
            });
        }
        Ok(output)
    }
}
