use crate::{label::Label, target_info::TargetKind};
use indexmap::IndexMap;

/// Rule kinds declared by one package's BUILD file, from `bazel query --output=label_kind`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFileModel {
    package: String,
    rules: IndexMap<Label, String>,
}

impl BuildFileModel {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.trim_start_matches("//").to_string(),
            rules: IndexMap::new(),
        }
    }

    /// Parse `label_kind` output: one `<rule kind> rule <label>` line per target.
    pub fn parse_label_kind(package: &str, output: &str) -> Self {
        let mut model = Self::new(package);
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((kind, label)) = line.split_once(" rule ") else {
                tracing::debug!(
                    target = "aspectra.bazel",
                    line,
                    "ignoring unexpected label_kind line"
                );
                continue;
            };
            match Label::parse(label.trim()) {
                Ok(label) => model.insert(label, kind.trim()),
                Err(err) => tracing::debug!(
                    target = "aspectra.bazel",
                    line,
                    error = %err,
                    "ignoring label_kind line with a malformed label"
                ),
            }
        }
        model
    }

    pub fn insert(&mut self, label: Label, rule_kind: &str) {
        self.rules.insert(label, rule_kind.to_string());
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn rule_kind(&self, label: &Label) -> Option<&str> {
        self.rules.get(label).map(String::as_str)
    }

    pub fn target_kind(&self, label: &Label) -> Option<TargetKind> {
        self.rule_kind(label).map(TargetKind::from_rule_kind)
    }

    /// Targets in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &Label> {
        self.rules.keys()
    }

    /// Expand `configured` into concrete labels: a wildcard stands for every target of the
    /// BUILD file. Duplicates are dropped, first occurrence wins.
    pub fn activated_targets(&self, configured: &[Label]) -> Vec<Label> {
        let mut activated: Vec<Label> = Vec::new();
        for label in configured {
            if label.is_wildcard() {
                for target in self.rules.keys().filter(|t| t.same_package(label)) {
                    if !activated.contains(target) {
                        activated.push(target.clone());
                    }
                }
            } else if !activated.contains(label) {
                activated.push(label.clone());
            }
        }
        activated
    }
}
