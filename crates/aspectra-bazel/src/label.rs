use crate::error::LabelError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Target part of a [`Label`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum TargetName {
    Named(String),
    /// `pkg:*` / `pkg:all`: every target of the package.
    Wildcard,
}

/// A Bazel label such as `//java/com/example:lib`, `@maven//:guava` or the package wildcard
/// `//java/com/example:*`.
///
/// Labels are normalized on parse: `//a/b` is the same label as `//a/b:b`, `:all` is the same as
/// `:*`, and a main-repository prefix (`@//`, `@@//`) is dropped. External repositories keep their
/// `@`/`@@` prefix since the two spellings name different repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    repository: Option<String>,
    package: String,
    target: TargetName,
}

impl Label {
    pub fn parse(raw: &str) -> Result<Self, LabelError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(LabelError::Empty);
        }
        let invalid = |reason| LabelError::Invalid {
            label: raw.to_string(),
            reason,
        };
        if s.contains('\\') {
            return Err(invalid("backslashes are not allowed"));
        }

        let (repository, rest) = if s.starts_with('@') {
            let name_start = if s.starts_with("@@") { 2 } else { 1 };
            match s.find("//") {
                Some(idx) if idx >= name_start => {
                    let repo = &s[..idx];
                    let repository = (idx > name_start).then(|| repo.to_string());
                    (repository, &s[idx + 2..])
                }
                Some(_) => return Err(invalid("malformed repository name")),
                None => {
                    // `@repo` is shorthand for `@repo//:repo`.
                    let name = &s[name_start..];
                    if name.is_empty() || name.contains([':', '/']) {
                        return Err(invalid("malformed repository name"));
                    }
                    return Ok(Self {
                        repository: Some(s.to_string()),
                        package: String::new(),
                        target: TargetName::Named(name.to_string()),
                    });
                }
            }
        } else {
            (None, s.strip_prefix("//").unwrap_or(s))
        };

        let (package, target) = match rest.split_once(':') {
            Some((package, target)) => (package, Some(target)),
            None => (rest, None),
        };

        if package == "..." || package.ends_with("/...") {
            return Err(LabelError::Recursive(raw.to_string()));
        }
        validate_package(package).map_err(invalid)?;

        let target = match target {
            Some("*") | Some("all") => TargetName::Wildcard,
            Some("") => return Err(invalid("empty target name")),
            Some(name) if name.contains(':') => return Err(invalid("more than one `:`")),
            Some(name) if name.ends_with('/') => return Err(invalid("target name ends with `/`")),
            Some(name) => TargetName::Named(name.to_string()),
            None => match package.rsplit('/').next() {
                Some(last) if !last.is_empty() => TargetName::Named(last.to_string()),
                _ => return Err(invalid("missing target name")),
            },
        };

        Ok(Self {
            repository,
            package: package.to_string(),
            target,
        })
    }

    /// A concrete label in the main repository.
    pub fn new(package: &str, target: &str) -> Result<Self, LabelError> {
        let package = package.trim_start_matches("//");
        if target.is_empty() || target == "*" || target == "all" {
            return Err(LabelError::Invalid {
                label: format!("//{package}:{target}"),
                reason: "not a concrete target name",
            });
        }
        Self::parse(&format!("//{package}:{target}"))
    }

    /// The `pkg:*` wildcard label of a package in the main repository.
    pub fn wildcard(package: &str) -> Result<Self, LabelError> {
        let package = package.trim_start_matches("//");
        Self::parse(&format!("//{package}:*"))
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self.target, TargetName::Named(_))
    }

    pub fn is_wildcard(&self) -> bool {
        !self.is_concrete()
    }

    /// Package path relative to its repository root, without `//` (`java/com/example`).
    pub fn package_path(&self) -> &str {
        &self.package
    }

    /// External repository including its `@`/`@@` prefix; `None` for the main repository.
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// `None` for a wildcard label.
    pub fn target_name(&self) -> Option<&str> {
        match &self.target {
            TargetName::Named(name) => Some(name),
            TargetName::Wildcard => None,
        }
    }

    /// The wildcard label of this label's package.
    pub fn package_label(&self) -> Label {
        Self {
            repository: self.repository.clone(),
            package: self.package.clone(),
            target: TargetName::Wildcard,
        }
    }

    pub fn same_package(&self, other: &Label) -> bool {
        self.repository == other.repository && self.package == other.package
    }
}

fn validate_package(package: &str) -> Result<(), &'static str> {
    if package.starts_with('/') {
        return Err("package path starts with `/`");
    }
    if package.ends_with('/') {
        return Err("package path ends with `/`");
    }
    if package.contains("//") {
        return Err("empty package path segment");
    }
    Ok(())
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(repo) = &self.repository {
            f.write_str(repo)?;
        }
        write!(f, "//{}:", self.package)?;
        match &self.target {
            TargetName::Named(name) => f.write_str(name),
            TargetName::Wildcard => f.write_str("*"),
        }
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Label::parse(&raw).map_err(de::Error::custom)
    }
}
