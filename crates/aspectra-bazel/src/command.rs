use aspectra_process::{
    run_command, run_command_filtered, CancellationToken, LineFilter, RunOptions, Stream,
};
use std::{io, path::Path};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Output of a run where stderr was filtered line by line instead of captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredOutput {
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl FilteredOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the Bazel integration and process spawning, so tests can script Bazel.
///
/// A non-zero exit is reported through the output, never as an `Err`. An interrupted run is an
/// `Err` of kind [`io::ErrorKind::Interrupted`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> io::Result<CommandOutput>;

    /// Run and keep only the stderr lines `filter` maps to `Some`.
    fn run_filtered_stderr(
        &self,
        cwd: &Path,
        program: &Path,
        args: &[String],
        filter: LineFilter,
    ) -> io::Result<FilteredOutput>;
}

/// Spawns real processes through `aspectra-process`.
#[derive(Debug, Clone, Default)]
pub struct DefaultCommandRunner {
    options: RunOptions,
}

impl DefaultCommandRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Cancelling `token` kills the running Bazel client and fails the call as interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    pub fn with_max_output_bytes(mut self, max_bytes: usize) -> Self {
        self.options.max_bytes = max_bytes;
        self
    }
}

fn interrupted(program: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Interrupted,
        format!("`{}` was cancelled", program.display()),
    )
}

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        let result = run_command(cwd, program, args, self.options.clone())?;
        if result.cancelled || result.timed_out {
            return Err(interrupted(program));
        }
        if result.output.truncated {
            tracing::debug!(
                target = "aspectra.bazel",
                program = %program.display(),
                "command output was truncated"
            );
        }
        Ok(CommandOutput {
            exit_code: result.status.code(),
            stdout: result.output.stdout,
            stderr: result.output.stderr,
        })
    }

    fn run_filtered_stderr(
        &self,
        cwd: &Path,
        program: &Path,
        args: &[String],
        filter: LineFilter,
    ) -> io::Result<FilteredOutput> {
        let result = run_command_filtered(
            cwd,
            program,
            args,
            self.options.clone(),
            Stream::Stderr,
            filter,
        )?;
        if result.cancelled || result.timed_out {
            return Err(interrupted(program));
        }
        Ok(FilteredOutput {
            exit_code: result.status.code(),
            lines: result.filtered_lines,
        })
    }
}
