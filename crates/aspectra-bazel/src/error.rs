use std::io;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("empty label")]
    Empty,
    #[error("invalid label `{label}`: {reason}")]
    Invalid { label: String, reason: &'static str },
    #[error("recursive target pattern `{0}` is not a label")]
    Recursive(String),
}

#[derive(Debug, Error)]
pub enum BazelError {
    #[error("no targets were given to the aspect build")]
    EmptyTargets,

    #[error("could not find a `bazel` or `bazelisk` executable; set `bazel.binary` in the config")]
    BazelNotFound,

    #[error("No Aspect files generated for: {targets}")]
    NoAspectFiles { targets: String },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` was interrupted")]
    Interrupted { command: String },

    #[error("`{command}` exited with {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error(transparent)]
    Label(#[from] LabelError),
}

impl BazelError {
    /// Classify a failure to run `command`; interrupted waits become [`BazelError::Interrupted`].
    pub fn from_io(command: String, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::Interrupted {
            BazelError::Interrupted { command }
        } else {
            BazelError::Io { command, source }
        }
    }

    /// Failures that mean Bazel itself could not be driven (launch problems, interrupted waits,
    /// a build that analyzed nothing at all).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            BazelError::NoAspectFiles { .. } | BazelError::Io { .. } | BazelError::Interrupted { .. }
        )
    }

    /// Errors that retrying will not fix without changing the setup.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BazelError::BazelNotFound)
    }
}
