use crate::{
    command::CommandRunner, error::BazelError, label::Label, settings::BazelSettings,
};
use aspectra_process::LineFilter;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Marker `--experimental_show_artifacts` puts in front of every output artifact.
const ARTIFACT_PREFIX: &str = ">>>";

/// Produces aspect output files for a set of targets.
pub trait AspectGenerator: Send + Sync {
    /// Paths of the generated aspect files. Fails on an empty `targets` slice.
    fn generate(&self, targets: &[Label]) -> Result<Vec<PathBuf>, BazelError>;
}

/// Runs `bazel build` with the IDE info aspect, batching targets.
pub struct AspectCommandRunner<R> {
    root: PathBuf,
    program: PathBuf,
    runner: Arc<R>,
    flags: Vec<String>,
    suffix: String,
    batch_size: usize,
}

impl<R: CommandRunner> AspectCommandRunner<R> {
    pub fn new(root: &Path, program: PathBuf, runner: Arc<R>, settings: &BazelSettings) -> Self {
        Self {
            root: root.to_path_buf(),
            program,
            runner,
            flags: settings.aspect_flags(),
            suffix: settings.aspect_file_suffix.clone(),
            batch_size: settings.effective_batch_size(),
        }
    }

    fn build_args(&self, batch: &[Label]) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + self.flags.len() + batch.len());
        args.push("build".to_string());
        args.extend(self.flags.iter().cloned());
        args.extend(batch.iter().map(Label::to_string));
        args
    }

    fn artifact_filter(&self) -> LineFilter {
        let suffix = self.suffix.clone();
        Box::new(move |line: &str| aspect_file_from_line(line, &suffix).map(str::to_string))
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }
}

/// The aspect file path printed on `line`, if it is an artifact line for an aspect file.
pub fn aspect_file_from_line<'a>(line: &'a str, suffix: &str) -> Option<&'a str> {
    let path = line.strip_prefix(ARTIFACT_PREFIX)?.trim();
    path.ends_with(suffix).then_some(path)
}

impl<R: CommandRunner> AspectGenerator for AspectCommandRunner<R> {
    fn generate(&self, targets: &[Label]) -> Result<Vec<PathBuf>, BazelError> {
        if targets.is_empty() {
            return Err(BazelError::EmptyTargets);
        }

        let mut paths = Vec::new();
        let total = targets.len();
        for (index, batch) in targets.chunks(self.batch_size).enumerate() {
            let first = index * self.batch_size;
            tracing::info!(
                target = "aspectra.bazel",
                first = first + 1,
                last = first + batch.len(),
                total,
                "running aspect build"
            );

            let args = self.build_args(batch);
            let output = self
                .runner
                .run_filtered_stderr(&self.root, &self.program, &args, self.artifact_filter())
                .map_err(|err| BazelError::from_io(self.command_line(&args), err))?;

            // `-k` builds report failures for some targets and still emit files for the rest.
            if !output.success() {
                tracing::debug!(
                    target = "aspectra.bazel",
                    exit_code = ?output.exit_code,
                    files = output.lines.len(),
                    "aspect build reported errors"
                );
            }

            paths.extend(output.lines.into_iter().map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    self.root.join(path)
                }
            }));
        }

        tracing::debug!(
            target = "aspectra.bazel",
            targets = total,
            files = paths.len(),
            "aspect build finished"
        );
        Ok(paths)
    }
}
