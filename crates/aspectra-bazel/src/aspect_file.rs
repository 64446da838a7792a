//! Parsing of the per-target JSON documents written by the IDE info aspect.

use crate::{
    label::Label,
    target_info::{Dependency, JarSet, TargetInfo, TargetKind},
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Deserialize)]
struct AspectDocument {
    key: Option<TargetKey>,
    #[serde(default)]
    kind_string: Option<String>,
    #[serde(default)]
    build_file_artifact_location: Option<ArtifactLocation>,
    #[serde(default)]
    deps: Vec<DepEntry>,
    #[serde(default)]
    java_ide_info: Option<JavaIdeInfo>,
}

#[derive(Debug, Deserialize)]
struct TargetKey {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepEntry {
    target: Option<TargetKey>,
}

#[derive(Debug, Deserialize)]
struct ArtifactLocation {
    relative_path: String,
    #[serde(default)]
    root_execution_path_fragment: Option<String>,
}

impl ArtifactLocation {
    fn path(&self) -> PathBuf {
        match self.root_execution_path_fragment.as_deref() {
            Some(root) if !root.is_empty() => Path::new(root).join(&self.relative_path),
            _ => PathBuf::from(&self.relative_path),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JavaIdeInfo {
    #[serde(default)]
    sources: Vec<ArtifactLocation>,
    #[serde(default)]
    jars: Vec<RawJarSet>,
    #[serde(default)]
    generated_jars: Vec<RawJarSet>,
    #[serde(default)]
    main_class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJarSet {
    jar: Option<ArtifactLocation>,
    interface_jar: Option<ArtifactLocation>,
    source_jar: Option<ArtifactLocation>,
}

impl From<RawJarSet> for JarSet {
    fn from(raw: RawJarSet) -> Self {
        JarSet {
            jar: raw.jar.as_ref().map(ArtifactLocation::path),
            interface_jar: raw.interface_jar.as_ref().map(ArtifactLocation::path),
            source_jar: raw.source_jar.as_ref().map(ArtifactLocation::path),
        }
    }
}

/// Turns aspect output files into [`TargetInfo`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct AspectInfoFactory;

impl AspectInfoFactory {
    /// Parse every file in `paths`, keyed by the target label.
    ///
    /// Bad files are skipped with a warning. An empty result means nothing could be parsed.
    pub fn parse<P: AsRef<Path>>(paths: &[P]) -> HashMap<Label, Arc<TargetInfo>> {
        let mut infos = HashMap::new();
        for path in paths {
            let path = path.as_ref();
            if path.as_os_str().is_empty() {
                continue;
            }
            let Some(info) = Self::parse_file(path) else {
                continue;
            };
            if let Some(previous) = infos.insert(info.label.clone(), Arc::new(info)) {
                tracing::debug!(
                    target = "aspectra.bazel",
                    label = %previous.label,
                    path = %path.display(),
                    "duplicate aspect file for label; keeping the last one"
                );
            }
        }
        infos
    }

    /// Parse one aspect file. `None` if it is missing, malformed or not a JVM target.
    pub fn parse_file(path: &Path) -> Option<TargetInfo> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    target = "aspectra.bazel",
                    path = %path.display(),
                    error = %err,
                    "aspect file could not be read"
                );
                return None;
            }
        };

        match Self::parse_str(&text) {
            Ok(Some(info)) => {
                tracing::trace!(
                    target = "aspectra.bazel",
                    label = %info.label,
                    path = %path.display(),
                    "loaded aspect file"
                );
                Some(info)
            }
            Ok(None) => {
                tracing::debug!(
                    target = "aspectra.bazel",
                    path = %path.display(),
                    "aspect file does not describe a JVM target"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    target = "aspectra.bazel",
                    path = %path.display(),
                    error = %err,
                    "aspect file is malformed"
                );
                None
            }
        }
    }

    /// Parse the JSON text of one aspect document.
    pub fn parse_str(text: &str) -> anyhow::Result<Option<TargetInfo>> {
        let doc: AspectDocument = serde_json::from_str(text)?;

        let Some(raw_label) = doc.key.and_then(|key| key.label) else {
            return Ok(None);
        };
        let Some(java) = doc.java_ide_info else {
            return Ok(None);
        };
        let label = Label::parse(&raw_label)?;

        let rule_kind = doc.kind_string.unwrap_or_default();
        let deps = doc
            .deps
            .into_iter()
            .filter_map(|dep| dep.target.and_then(|t| t.label))
            .map(|raw| match Label::parse(&raw) {
                Ok(label) => Dependency::Label(label),
                Err(_) => Dependency::Unparsed(raw),
            })
            .collect();

        Ok(Some(TargetInfo {
            label,
            kind: TargetKind::from_rule_kind(&rule_kind),
            rule_kind,
            build_file: doc
                .build_file_artifact_location
                .as_ref()
                .map(ArtifactLocation::path),
            deps,
            sources: java
                .sources
                .iter()
                .map(|source| source.path().to_string_lossy().into_owned())
                .collect(),
            jars: java.jars.into_iter().map(JarSet::from).collect(),
            generated_jars: java.generated_jars.into_iter().map(JarSet::from).collect(),
            main_class: java.main_class.filter(|main| !main.is_empty()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_joins_root_fragment() {
        let loc = ArtifactLocation {
            relative_path: "a/liba.jar".to_string(),
            root_execution_path_fragment: Some("bazel-out/k8-fastbuild/bin".to_string()),
        };
        assert_eq!(loc.path(), PathBuf::from("bazel-out/k8-fastbuild/bin/a/liba.jar"));

        let loc = ArtifactLocation {
            relative_path: "a/Foo.java".to_string(),
            root_execution_path_fragment: Some(String::new()),
        };
        assert_eq!(loc.path(), PathBuf::from("a/Foo.java"));
    }

    #[test]
    fn documents_without_java_info_are_not_targets() {
        let text = r#"{"key": {"label": "//a:proto"}, "kind_string": "proto_library"}"#;
        assert!(AspectInfoFactory::parse_str(text).unwrap().is_none());
    }

    #[test]
    fn unparseable_deps_are_kept_verbatim() {
        let text = r#"{
            "key": {"label": "//a:lib"},
            "kind_string": "java_library",
            "deps": [{"target": {"label": "//b/..."}}, {"target": {"label": "//c:c"}}],
            "java_ide_info": {}
        }"#;
        let info = AspectInfoFactory::parse_str(text).unwrap().unwrap();
        assert_eq!(
            info.deps,
            vec![
                Dependency::Unparsed("//b/...".to_string()),
                Dependency::Label(Label::parse("//c").unwrap()),
            ]
        );
    }
}
