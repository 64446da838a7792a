use crate::label::Label;
use serde::Serialize;
use std::{cmp::Ordering, path::PathBuf};

/// Coarse rule classification used by the closure walk and the classpath assembler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Library,
    Binary,
    Test,
    Import,
    Other(String),
}

impl TargetKind {
    pub fn from_rule_kind(kind: &str) -> Self {
        match kind {
            "java_library" | "kt_jvm_library" => TargetKind::Library,
            "java_binary" | "kt_jvm_binary" => TargetKind::Binary,
            "java_test" | "kt_jvm_test" => TargetKind::Test,
            "java_import" | "jvm_import" | "kt_jvm_import" => TargetKind::Import,
            other => TargetKind::Other(other.to_string()),
        }
    }

    pub fn is_library_or_binary(&self) -> bool {
        matches!(self, TargetKind::Library | TargetKind::Binary)
    }

    /// Roots of these kinds are part of their own closure: their jars must be on the classpath.
    pub fn includes_self_in_closure(&self) -> bool {
        matches!(self, TargetKind::Test | TargetKind::Import)
    }
}

/// One output jar of a target together with its ijar/hjar and source jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JarSet {
    pub jar: Option<PathBuf>,
    pub interface_jar: Option<PathBuf>,
    pub source_jar: Option<PathBuf>,
}

impl JarSet {
    /// The jar to put on a classpath: the full jar, else the interface jar.
    pub fn classpath_jar(&self) -> Option<&PathBuf> {
        self.jar.as_ref().or(self.interface_jar.as_ref())
    }
}

/// A declared dependency edge as written by the aspect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Dependency {
    Label(Label),
    /// Kept verbatim when the aspect reports something that does not parse as a label.
    Unparsed(String),
}

impl Dependency {
    pub fn label(&self) -> Option<&Label> {
        match self {
            Dependency::Label(label) => Some(label),
            Dependency::Unparsed(_) => None,
        }
    }
}

/// The aspect's view of a single JVM target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub label: Label,
    pub kind: TargetKind,
    /// Raw rule class (`java_library`, `scala_library`, ...).
    pub rule_kind: String,
    pub build_file: Option<PathBuf>,
    pub deps: Vec<Dependency>,
    /// Workspace-relative source paths.
    pub sources: Vec<String>,
    pub jars: Vec<JarSet>,
    pub generated_jars: Vec<JarSet>,
    pub main_class: Option<String>,
}

impl TargetInfo {
    pub fn new(label: Label, rule_kind: &str) -> Self {
        Self {
            label,
            kind: TargetKind::from_rule_kind(rule_kind),
            rule_kind: rule_kind.to_string(),
            build_file: None,
            deps: Vec::new(),
            sources: Vec::new(),
            jars: Vec::new(),
            generated_jars: Vec::new(),
            main_class: None,
        }
    }

    pub fn with_deps<'a>(mut self, deps: impl IntoIterator<Item = &'a Label>) -> Self {
        self.deps
            .extend(deps.into_iter().cloned().map(Dependency::Label));
        self
    }

    /// Generated jars first, then the regular output jars.
    pub fn all_jars(&self) -> impl Iterator<Item = &JarSet> {
        self.generated_jars.iter().chain(self.jars.iter())
    }
}

// A target appears once per build invocation, so the label is its identity inside a closure.
impl PartialEq for TargetInfo {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl Eq for TargetInfo {}

impl PartialOrd for TargetInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TargetInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.label.cmp(&other.label)
    }
}

impl std::hash::Hash for TargetInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.label.hash(state);
    }
}
