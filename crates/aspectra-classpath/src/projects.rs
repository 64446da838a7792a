use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use aspectra_bazel::Label;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::ClasspathError;

/// A workspace-relative source root, optionally narrowed by include/exclude globs.
///
/// Patterns are matched against the path relative to the folder.
#[derive(Debug, Clone)]
pub struct SourceFolder {
    path: PathBuf,
    includes: Option<GlobSet>,
    excludes: Option<GlobSet>,
}

impl SourceFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            includes: None,
            excludes: None,
        }
    }

    pub fn with_patterns(
        path: impl Into<PathBuf>,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Self, ClasspathError> {
        Ok(Self {
            path: path.into(),
            includes: build_globset(includes)?,
            excludes: build_globset(excludes)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, source: &Path) -> bool {
        let Ok(relative) = source.strip_prefix(&self.path) else {
            return false;
        };
        if self
            .excludes
            .as_ref()
            .is_some_and(|excludes| excludes.is_match(relative))
        {
            return false;
        }
        self.includes
            .as_ref()
            .map_or(true, |includes| includes.is_match(relative))
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, ClasspathError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ClasspathError::InvalidPattern {
            pattern: pattern.clone(),
            message: err.to_string(),
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|err| ClasspathError::InvalidPattern {
            pattern: patterns.join(","),
            message: err.to_string(),
        })
}

/// An open JVM project backed by one Bazel package.
#[derive(Debug, Clone)]
pub struct JvmProject {
    pub name: String,
    /// The package the project was opened from; its BUILD file drives target activation.
    pub package: Label,
    pub configured_targets: Vec<Label>,
    pub source_folders: Vec<SourceFolder>,
}

impl JvmProject {
    /// A project that activates every target in `package`.
    pub fn new(name: impl Into<String>, package: Label) -> Self {
        let wildcard = package.package_label();
        Self {
            name: name.into(),
            package,
            configured_targets: vec![wildcard],
            source_folders: Vec::new(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<Label>) -> Self {
        self.configured_targets = targets;
        self
    }

    pub fn with_source_folder(mut self, folder: SourceFolder) -> Self {
        self.source_folders.push(folder);
        self
    }

    pub fn owns_source(&self, source: &Path) -> bool {
        self.source_folders
            .iter()
            .any(|folder| folder.contains(source))
    }
}

/// Lookup of the projects currently open in the session.
pub trait ProjectRegistry: Send + Sync {
    /// The project whose source folders contain `source`, a workspace-relative path.
    fn owning_project(&self, source: &Path) -> Option<Arc<JvmProject>>;

    fn project(&self, name: &str) -> Option<Arc<JvmProject>>;
}

#[derive(Debug, Default)]
pub struct InMemoryProjectRegistry {
    projects: RwLock<IndexMap<String, Arc<JvmProject>>>,
}

impl InMemoryProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `project`, replacing any project of the same name.
    pub fn add(&self, project: JvmProject) -> Arc<JvmProject> {
        let project = Arc::new(project);
        self.projects
            .write()
            .insert(project.name.clone(), Arc::clone(&project));
        project
    }

    pub fn remove(&self, name: &str) -> Option<Arc<JvmProject>> {
        self.projects.write().shift_remove(name)
    }

    pub fn projects(&self) -> Vec<Arc<JvmProject>> {
        self.projects.read().values().cloned().collect()
    }
}

impl ProjectRegistry for InMemoryProjectRegistry {
    fn owning_project(&self, source: &Path) -> Option<Arc<JvmProject>> {
        self.projects
            .read()
            .values()
            .find(|project| project.owns_source(source))
            .cloned()
    }

    fn project(&self, name: &str) -> Option<Arc<JvmProject>> {
        self.projects.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn source_folder_matches_by_prefix() {
        let folder = SourceFolder::new("java/com/example");
        assert!(folder.contains(Path::new("java/com/example/Hello.java")));
        assert!(folder.contains(Path::new("java/com/example/util/Strings.java")));
        assert!(!folder.contains(Path::new("java/com/other/Hello.java")));
        assert!(!folder.contains(Path::new("java/com/examples/Hello.java")));
    }

    #[test]
    fn exclusions_win_over_inclusions() {
        let folder = SourceFolder::with_patterns(
            "src",
            &patterns(&["**/*.java"]),
            &patterns(&["generated/**"]),
        )
        .unwrap();
        assert!(folder.contains(Path::new("src/a/A.java")));
        assert!(!folder.contains(Path::new("src/a/A.kt")));
        assert!(!folder.contains(Path::new("src/generated/G.java")));
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = SourceFolder::with_patterns("src", &patterns(&["a/[b"]), &[]).unwrap_err();
        assert!(matches!(err, ClasspathError::InvalidPattern { ref pattern, .. } if pattern == "a/[b"));
    }

    #[test]
    fn registry_finds_owner_and_replaces_by_name() {
        let registry = InMemoryProjectRegistry::new();
        let package = Label::parse("//java/app").unwrap();
        registry.add(
            JvmProject::new("app", package.clone()).with_source_folder(SourceFolder::new("java/app")),
        );
        registry.add(JvmProject::new("lib", Label::parse("//java/lib").unwrap()));

        let owner = registry.owning_project(Path::new("java/app/Main.java")).unwrap();
        assert_eq!(owner.name, "app");
        assert_eq!(owner.configured_targets, vec![Label::wildcard("java/app").unwrap()]);
        assert!(registry.owning_project(Path::new("java/lib/Lib.java")).is_none());

        registry.add(JvmProject::new("app", package));
        assert!(registry.owning_project(Path::new("java/app/Main.java")).is_none());
        assert_eq!(registry.projects().len(), 2);
        assert!(registry.remove("lib").is_some());
        assert!(registry.project("lib").is_none());
    }
}
