use std::path::{Path, PathBuf};

use aspectra_bazel::{BazelError, BazelWorkspace, CommandRunner, TargetInfo};
use walkdir::WalkDir;

use crate::ClasspathEntry;

/// Directory under `bazel-bin` where Bazel keeps the interface jar of the Java test runner.
pub const TEST_RUNNER_DIR: &str = "external/bazel_tools/tools/jdk/_ijar/TestRunner";
pub const TEST_RUNNER_JAR_SUFFIX: &str = "Runner_deploy-ijar.jar";

const SEARCH_DEPTH: usize = 5;

/// Facts about the workspace needed to find runtime-only test dependencies.
pub trait WorkspaceLayout: Send + Sync {
    fn bazel_bin(&self) -> Result<PathBuf, BazelError>;
    /// Host OS as spelled in Bazel's remote Java tools repository names.
    fn operating_system(&self) -> &str;
    /// `--explicit_java_test_deps` is set for `bazel test`.
    fn explicit_java_test_deps(&self) -> bool;
}

impl<R: CommandRunner> WorkspaceLayout for BazelWorkspace<R> {
    fn bazel_bin(&self) -> Result<PathBuf, BazelError> {
        BazelWorkspace::bazel_bin(self)
    }

    fn operating_system(&self) -> &str {
        BazelWorkspace::operating_system(self)
    }

    fn explicit_java_test_deps(&self) -> bool {
        self.command_options().explicit_java_test_deps()
    }
}

/// Dependencies Bazel adds to a test at runtime that never show up in its aspect closure.
pub trait ImplicitDependencyLocator: Send + Sync {
    fn implicit_dependencies(
        &self,
        workspace: &dyn WorkspaceLayout,
        test: &TargetInfo,
    ) -> Vec<ClasspathEntry>;
}

/// Finds the JUnit test runner jar that `java_test` puts on the runtime classpath.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestRunnerJarLocator;

impl ImplicitDependencyLocator for TestRunnerJarLocator {
    fn implicit_dependencies(
        &self,
        workspace: &dyn WorkspaceLayout,
        test: &TargetInfo,
    ) -> Vec<ClasspathEntry> {
        if workspace.explicit_java_test_deps() {
            return Vec::new();
        }

        let bazel_bin = match workspace.bazel_bin() {
            Ok(dir) => dir,
            Err(err) => {
                tracing::error!(
                    target = "aspectra.classpath",
                    label = %test.label,
                    error = %err,
                    "cannot locate bazel-bin for implicit test dependencies"
                );
                return Vec::new();
            }
        };

        match locate_runner_jar(&bazel_bin, workspace.operating_system(), test) {
            Some(jar) => vec![ClasspathEntry::library(jar, None, true)],
            None => Vec::new(),
        }
    }
}

fn locate_runner_jar(bazel_bin: &Path, os: &str, test: &TargetInfo) -> Option<PathBuf> {
    let runner_dir = bazel_bin.join(TEST_RUNNER_DIR);
    let levels = [
        bazel_bin.to_path_buf(),
        runner_dir.clone(),
        runner_dir.join("external"),
        runner_dir
            .join("external")
            .join(format!("remote_java_tools_{os}")),
        runner_dir
            .join("external")
            .join(format!("remote_java_tools_{os}"))
            .join("java_tools"),
        runner_dir
            .join("external")
            .join(format!("remote_java_tools_{os}"))
            .join("java_tools")
            .join(TEST_RUNNER_JAR_SUFFIX),
    ];

    let Some(missing) = levels.iter().find(|level| !level.exists()) else {
        return levels.last().cloned();
    };
    tracing::debug!(
        target = "aspectra.classpath",
        label = %test.label,
        path = %missing.display(),
        "test runner path does not exist; searching the runner directory"
    );

    let found = if runner_dir.is_dir() {
        search_runner_dir(&runner_dir)
    } else {
        None
    };
    match &found {
        Some(jar) => tracing::debug!(
            target = "aspectra.classpath",
            label = %test.label,
            jar = %jar.display(),
            "found test runner jar by search"
        ),
        None => tracing::error!(
            target = "aspectra.classpath",
            label = %test.label,
            path = %missing.display(),
            "test runner path does not exist"
        ),
    }
    found
}

// Older and newer toolchains name the java tools repository differently.
fn search_runner_dir(runner_dir: &Path) -> Option<PathBuf> {
    WalkDir::new(runner_dir)
        .max_depth(SEARCH_DEPTH)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(TEST_RUNNER_JAR_SUFFIX))
        })
}
