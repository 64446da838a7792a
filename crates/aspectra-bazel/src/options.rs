use serde::Serialize;
use std::collections::BTreeMap;

/// Options set explicitly through `.bazelrc` files, as reported by `bazel test --announce_rc`.
///
/// Each report line looks like
/// `  Inherited 'build' options: --stamp --javacopt=-source 8 -target 8`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOptions {
    all: BTreeMap<String, String>,
    by_context: BTreeMap<String, BTreeMap<String, String>>,
}

impl CommandOptions {
    pub fn parse(output: &str) -> Self {
        let mut options = Self::default();
        for line in output.lines() {
            options.parse_line(line);
        }
        options
    }

    /// Merge one report line; lines without an `options:` section are ignored.
    pub fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        let line = match line.find("Inherited") {
            Some(idx) => line[idx + "Inherited".len()..].trim_start(),
            None => line,
        };
        let Some((head, options)) = line.split_once("options:") else {
            return;
        };
        let context = head.trim().trim_matches('\'').to_string();

        for option in options.trim().split(" --") {
            let option = option.trim();
            let option = option.strip_prefix("--").unwrap_or(option);
            if option.is_empty() {
                continue;
            }
            let (name, value) = match option.split_once('=') {
                Some((name, value)) => (name, value),
                // `--workspace_status_command tools/status` style, or a bare `--stamp`.
                None => match option.split_once(char::is_whitespace) {
                    Some((name, value)) => (name, value.trim()),
                    None => match option.strip_prefix("no") {
                        Some(name) if !name.is_empty() => (name, "false"),
                        _ => (option, "true"),
                    },
                },
            };
            self.all.insert(name.to_string(), value.to_string());
            self.by_context
                .entry(context.clone())
                .or_default()
                .insert(name.to_string(), value.to_string());
        }
    }

    /// The option's value from whichever rc context set it last.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.all.get(name).map(String::as_str)
    }

    /// The option's value as set for exactly `context` (`build`, `test`, `common`, ...).
    pub fn contextual_option(&self, context: &str, name: &str) -> Option<&str> {
        self.by_context
            .get(context)
            .and_then(|options| options.get(name))
            .map(String::as_str)
    }

    /// `--explicit_java_test_deps`: test targets declare their JUnit runner themselves.
    pub fn explicit_java_test_deps(&self) -> bool {
        self.option("explicit_java_test_deps") == Some("true")
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Every option with its effective value, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.all.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}
