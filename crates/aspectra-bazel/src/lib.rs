//! Bazel aspect integration for Aspectra.
//!
//! This crate drives `bazel build` with an IDE info aspect and turns the per-target JSON it
//! writes into dependency closures:
//! - labels and workspace discovery (`WORKSPACE`, `WORKSPACE.bazel`, `MODULE.bazel`)
//! - batched aspect builds whose output files are read from `--experimental_show_artifacts`
//! - a per-workspace closure cache with a last-known-good fallback for broken builds
//! - `.bazelrc` options (`--announce_rc`) and BUILD file rule kinds (`query --output=label_kind`)

mod aspect_file;
mod aspect_runner;
mod build_file;
mod cache;
mod closure;
mod command;
mod error;
mod label;
mod options;
mod settings;
mod target_info;
mod workspace;

pub use crate::{
    aspect_file::AspectInfoFactory,
    aspect_runner::{aspect_file_from_line, AspectCommandRunner, AspectGenerator},
    build_file::BuildFileModel,
    cache::AspectInfoCache,
    closure::{assign_to_owning_labels, transitive_closure, TargetInfoSet},
    command::{CommandOutput, CommandRunner, DefaultCommandRunner, FilteredOutput},
    error::{BazelError, LabelError},
    label::Label,
    options::CommandOptions,
    settings::{
        BazelSettings, ASPECT_REPOSITORY, DEFAULT_ASPECT_FILE_SUFFIX, DEFAULT_ASPECT_LABEL,
        DEFAULT_BATCH_SIZE,
    },
    target_info::{Dependency, JarSet, TargetInfo, TargetKind},
    workspace::{bazel_workspace_root, is_bazel_workspace, BazelWorkspace, BazelWorkspaceDiscovery},
};

pub use aspectra_process::{CancellationToken, LineFilter};
