//! JVM classpath assembly for Bazel packages.
//!
//! A [`JvmClasspath`] turns the aspect closures of a project's configured targets into an
//! ordered classpath: main entries, then test-only entries, then implicit test runner jars.
//! Targets whose sources belong to another open project become project references instead of
//! jars.

mod assembler;
mod implicit;
mod projects;

use std::path::{Path, PathBuf};

use aspectra_bazel::{BazelError, LabelError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::{
    assembler::{
        AspectInfoSource, BuildFileModelSource, ClasspathWorkspace, JvmClasspath,
        JvmClasspathResponse, ResolutionMode, DEFAULT_CACHE_TTL,
    },
    implicit::{
        ImplicitDependencyLocator, TestRunnerJarLocator, WorkspaceLayout, TEST_RUNNER_DIR,
        TEST_RUNNER_JAR_SUFFIX,
    },
    projects::{InMemoryProjectRegistry, JvmProject, ProjectRegistry, SourceFolder},
};

#[derive(Debug, Error)]
pub enum ClasspathError {
    #[error(transparent)]
    Bazel(#[from] BazelError),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error("invalid source folder pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClasspathEntry {
    /// A jar produced by Bazel, optionally paired with its source jar.
    Library {
        jar: PathBuf,
        source_jar: Option<PathBuf>,
        test_only: bool,
    },
    /// Another open project that owns the sources of a dependency.
    Project { name: String },
}

/// Identity of a classpath entry for deduplication: the jar path or the project name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum EntryKey {
    Jar(PathBuf),
    Project(String),
}

impl ClasspathEntry {
    pub fn library(jar: impl Into<PathBuf>, source_jar: Option<PathBuf>, test_only: bool) -> Self {
        ClasspathEntry::Library {
            jar: jar.into(),
            source_jar,
            test_only,
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        ClasspathEntry::Project { name: name.into() }
    }

    pub fn jar(&self) -> Option<&Path> {
        match self {
            ClasspathEntry::Library { jar, .. } => Some(jar),
            ClasspathEntry::Project { .. } => None,
        }
    }

    pub fn is_test_only(&self) -> bool {
        matches!(self, ClasspathEntry::Library { test_only: true, .. })
    }

    pub(crate) fn key(&self) -> EntryKey {
        match self {
            ClasspathEntry::Library { jar, .. } => EntryKey::Jar(jar.clone()),
            ClasspathEntry::Project { name } => EntryKey::Project(name.clone()),
        }
    }

    /// Re-tag a library entry; project entries carry no scope.
    pub(crate) fn with_test_only(self, test_only: bool) -> Self {
        match self {
            ClasspathEntry::Library {
                jar, source_jar, ..
            } => ClasspathEntry::Library {
                jar,
                source_jar,
                test_only,
            },
            project => project,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_and_project_keys_never_collide() {
        let jar = ClasspathEntry::library("core", None, false);
        let project = ClasspathEntry::project("core");
        assert_ne!(jar.key(), project.key());
        assert_eq!(
            jar.key(),
            ClasspathEntry::library("core", Some(PathBuf::from("core-src.jar")), true).key()
        );
    }

    #[test]
    fn entries_serialize_with_a_kind_tag() {
        let entry = ClasspathEntry::library("lib/a.jar", None, true);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "library");
        assert_eq!(json["test_only"], true);
        assert!(entry.is_test_only());
        assert_eq!(entry.jar(), Some(Path::new("lib/a.jar")));
    }
}
