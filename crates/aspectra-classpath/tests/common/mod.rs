#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use aspectra_bazel::{
    transitive_closure, BazelError, BuildFileModel, JarSet, Label, TargetInfo, TargetInfoSet,
};
use aspectra_classpath::{
    AspectInfoSource, BuildFileModelSource, ClasspathEntry, ImplicitDependencyLocator,
    WorkspaceLayout,
};
use indexmap::IndexMap;

pub fn label(raw: &str) -> Label {
    Label::parse(raw).expect("valid label")
}

pub fn jar(path: &str) -> JarSet {
    JarSet {
        jar: Some(PathBuf::from(path)),
        interface_jar: None,
        source_jar: Some(PathBuf::from(path.replace(".jar", "-src.jar"))),
    }
}

pub fn library(jar: &str) -> ClasspathEntry {
    ClasspathEntry::library(jar, Some(PathBuf::from(jar.replace(".jar", "-src.jar"))), false)
}

pub fn test_library(jar: &str) -> ClasspathEntry {
    ClasspathEntry::library(jar, Some(PathBuf::from(jar.replace(".jar", "-src.jar"))), true)
}

/// Builder for the aspect view of one target.
pub fn target(raw: &str, rule_kind: &str, deps: &[&str]) -> TargetInfo {
    let deps: Vec<Label> = deps.iter().map(|d| label(d)).collect();
    TargetInfo::new(label(raw), rule_kind).with_deps(&deps)
}

/// In-memory workspace session: a BUILD file model per package plus a fixed target graph.
#[derive(Default)]
pub struct FakeWorkspace {
    models: Mutex<HashMap<String, BuildFileModel>>,
    infos: Mutex<HashMap<Label, Arc<TargetInfo>>>,
    fail_builds: Mutex<bool>,
    builds: Mutex<Vec<Vec<String>>>,
    flushed: Mutex<Vec<Vec<String>>>,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a target in its package's BUILD file and in the aspect graph.
    pub fn add(&self, info: TargetInfo) {
        self.declare(&info.label, &info.rule_kind.clone());
        self.add_external(info);
    }

    /// A target that only exists in the aspect graph (another package or repository).
    pub fn add_external(&self, info: TargetInfo) {
        self.infos
            .lock()
            .expect("infos mutex poisoned")
            .insert(info.label.clone(), Arc::new(info));
    }

    /// A BUILD file rule without aspect output.
    pub fn declare(&self, target: &Label, rule_kind: &str) {
        let package = target.package_path().to_string();
        self.models
            .lock()
            .expect("models mutex poisoned")
            .entry(package.clone())
            .or_insert_with(|| BuildFileModel::new(&package))
            .insert(target.clone(), rule_kind);
    }

    pub fn fail_builds(&self, fail: bool) {
        *self.fail_builds.lock().expect("fail mutex poisoned") = fail;
    }

    pub fn builds(&self) -> Vec<Vec<String>> {
        self.builds.lock().expect("builds mutex poisoned").clone()
    }

    pub fn flushed(&self) -> Vec<Vec<String>> {
        self.flushed.lock().expect("flushed mutex poisoned").clone()
    }
}

impl BuildFileModelSource for FakeWorkspace {
    fn build_file_model(&self, package: &Label) -> Result<BuildFileModel, BazelError> {
        let models = self.models.lock().expect("models mutex poisoned");
        Ok(models
            .get(package.package_path())
            .cloned()
            .unwrap_or_else(|| BuildFileModel::new(package.package_path())))
    }
}

impl AspectInfoSource for FakeWorkspace {
    fn aspect_target_infos(
        &self,
        labels: &[Label],
        _caller: &str,
    ) -> Result<IndexMap<Label, TargetInfoSet>, BazelError> {
        self.builds
            .lock()
            .expect("builds mutex poisoned")
            .push(labels.iter().map(|l| l.to_string()).collect());
        if *self.fail_builds.lock().expect("fail mutex poisoned") {
            return Err(BazelError::NoAspectFiles {
                targets: labels
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            });
        }

        let infos = self.infos.lock().expect("infos mutex poisoned");
        let mut results = IndexMap::new();
        for label in labels {
            if let Some(closure) = transitive_closure(label, &infos) {
                results.insert(label.clone(), Arc::new(closure));
            }
        }
        Ok(results)
    }

    fn flush_aspect_infos(&self, labels: &[Label]) {
        self.flushed
            .lock()
            .expect("flushed mutex poisoned")
            .push(labels.iter().map(|l| l.to_string()).collect());
    }
}

impl WorkspaceLayout for FakeWorkspace {
    fn bazel_bin(&self) -> Result<PathBuf, BazelError> {
        Ok(PathBuf::from("/nonexistent/bazel-bin"))
    }

    fn operating_system(&self) -> &str {
        "linux"
    }

    fn explicit_java_test_deps(&self) -> bool {
        false
    }
}

/// Hands out one runner jar per test target it is asked about.
#[derive(Clone, Default)]
pub struct FakeRunnerLocator {
    calls: Arc<Mutex<Vec<String>>>,
}

pub const RUNNER_JAR: &str = "bazel-bin/external/bazel_tools/tools/jdk/_ijar/TestRunner/Runner_deploy-ijar.jar";

impl FakeRunnerLocator {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

impl ImplicitDependencyLocator for FakeRunnerLocator {
    fn implicit_dependencies(
        &self,
        _workspace: &dyn WorkspaceLayout,
        test: &TargetInfo,
    ) -> Vec<ClasspathEntry> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(test.label.to_string());
        vec![ClasspathEntry::library(RUNNER_JAR, None, true)]
    }
}
