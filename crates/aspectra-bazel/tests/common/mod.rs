#![allow(dead_code)]

use aspectra_bazel::{
    AspectGenerator, BazelError, CommandOutput, CommandRunner, FilteredOutput, Label, LineFilter,
};
use serde_json::json;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

pub fn label(s: &str) -> Label {
    Label::parse(s).unwrap()
}

pub fn aspect_json(label: &str, kind: &str, deps: &[&str]) -> String {
    let name = label.rsplit([':', '/']).next().unwrap_or("out");
    let package = label.trim_start_matches("//").split(':').next().unwrap_or("");
    json!({
        "key": { "label": label },
        "kind_string": kind,
        "build_file_artifact_location": { "relative_path": format!("{package}/BUILD") },
        "deps": deps.iter().map(|d| json!({ "target": { "label": d } })).collect::<Vec<_>>(),
        "java_ide_info": {
            "sources": [ { "relative_path": format!("{package}/src/{name}.java") } ],
            "jars": [ {
                "jar": {
                    "relative_path": format!("{package}/lib{name}.jar"),
                    "root_execution_path_fragment": "bazel-out/k8-fastbuild/bin"
                },
                "interface_jar": {
                    "relative_path": format!("{package}/lib{name}-hjar.jar"),
                    "root_execution_path_fragment": "bazel-out/k8-fastbuild/bin"
                },
                "source_jar": {
                    "relative_path": format!("{package}/lib{name}-src.jar"),
                    "root_execution_path_fragment": "bazel-out/k8-fastbuild/bin"
                }
            } ]
        }
    })
    .to_string()
}

/// Write one aspect file per `(label, kind, deps)` node into `dir`.
pub fn write_graph(dir: &Path, nodes: &[(&str, &str, &[&str])]) -> Vec<PathBuf> {
    nodes
        .iter()
        .map(|(label, kind, deps)| {
            let file = label
                .trim_start_matches("//")
                .replace([':', '/'], "_");
            let path = dir.join(format!("{file}.aspectra-info.json"));
            std::fs::write(&path, aspect_json(label, kind, deps)).unwrap();
            path
        })
        .collect()
}

/// Aspect generator that hands out a fixed set of files and records every request.
#[derive(Clone, Default)]
pub struct FakeGenerator {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    files: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeGenerator {
    pub fn with_files(files: Vec<PathBuf>) -> Self {
        let generator = Self::default();
        generator.set_files(files);
        generator
    }

    pub fn set_files(&self, files: Vec<PathBuf>) {
        *self.files.lock().expect("files mutex poisoned") = files;
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

impl AspectGenerator for FakeGenerator {
    fn generate(&self, targets: &[Label]) -> Result<Vec<PathBuf>, BazelError> {
        if targets.is_empty() {
            return Err(BazelError::EmptyTargets);
        }
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(targets.iter().map(Label::to_string).collect());
        Ok(self.files.lock().expect("files mutex poisoned").clone())
    }
}

/// Bazel stand-in: answers by subcommand and records every invocation.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    outputs: Arc<Mutex<HashMap<String, CommandOutput>>>,
    build_stderr: Arc<Mutex<Vec<String>>>,
    build_exit_code: Arc<Mutex<Option<i32>>>,
    interrupt_builds: Arc<Mutex<bool>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        let runner = Self::default();
        *runner.build_exit_code.lock().unwrap() = Some(0);
        runner
    }

    /// Output for the first invocation whose arguments start with `prefix` (space separated).
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.outputs
            .lock()
            .expect("outputs mutex poisoned")
            .insert(prefix.to_string(), output);
    }

    pub fn set_build_stderr(&self, lines: &[&str]) {
        *self.build_stderr.lock().unwrap() = lines.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_build_exit_code(&self, code: Option<i32>) {
        *self.build_exit_code.lock().unwrap() = code;
    }

    pub fn interrupt_builds(&self) {
        *self.interrupt_builds.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn build_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.first().map(String::as_str) == Some("build"))
            .collect()
    }

    fn record(&self, args: &[String]) {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(args.to_vec());
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, _cwd: &Path, _program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        self.record(args);
        let joined = args.join(" ");
        let outputs = self.outputs.lock().expect("outputs mutex poisoned");
        let mut prefixes: Vec<&String> = outputs.keys().collect();
        // Longest prefix wins so tests can script specific queries.
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        for prefix in prefixes {
            if joined.starts_with(prefix.as_str()) {
                return Ok(outputs[prefix].clone());
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unexpected bazel invocation: {joined}"),
        ))
    }

    fn run_filtered_stderr(
        &self,
        _cwd: &Path,
        _program: &Path,
        args: &[String],
        mut filter: LineFilter,
    ) -> io::Result<FilteredOutput> {
        self.record(args);
        if *self.interrupt_builds.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
        }
        let lines = self
            .build_stderr
            .lock()
            .unwrap()
            .iter()
            .filter_map(|line| filter(line.as_str()))
            .collect();
        Ok(FilteredOutput {
            exit_code: *self.build_exit_code.lock().unwrap(),
            lines,
        })
    }
}

pub fn ok_stdout(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}
