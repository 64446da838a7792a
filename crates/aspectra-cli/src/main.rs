mod session;

use anyhow::{Context, Result};
use aspectra_bazel::{Label, TargetInfo};
use aspectra_classpath::{
    ClasspathEntry, InMemoryProjectRegistry, JvmClasspath, JvmProject, SourceFolder,
};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::session::Session;

#[derive(Parser)]
#[command(
    name = "aspectra",
    version,
    about = "Bazel aspect closures and JVM classpaths for a workspace"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the IDE info aspect and print the dependency closure of each label
    Aspects(AspectsArgs),
    /// Resolve the classpath of a package
    Classpath(ClasspathArgs),
    /// Print the `.bazelrc` options in effect for `bazel test`
    Options(WorkspaceArgs),
    /// Print the effective configuration and any config diagnostics
    Config(WorkspaceArgs),
}

#[derive(Args)]
struct WorkspaceArgs {
    /// Workspace root or any path inside it (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AspectsArgs {
    /// Target labels (`//pkg:target`, `//pkg:*`)
    #[arg(required = true)]
    labels: Vec<String>,
    #[command(flatten)]
    workspace: WorkspaceArgs,
}

#[derive(Args)]
struct ClasspathArgs {
    /// Package to resolve (`//java/com/example`)
    package: String,
    /// Project name (defaults to the package path)
    #[arg(long)]
    project: Option<String>,
    /// Restrict the project to these targets instead of the whole package
    #[arg(long = "target")]
    targets: Vec<String>,
    /// Workspace-relative source folders owned by the project (defaults to the package path)
    #[arg(long = "source-folder")]
    source_folders: Vec<PathBuf>,
    #[command(flatten)]
    workspace: WorkspaceArgs,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Aspects(args) => {
            let session = Session::open(&args.workspace.path)?;
            let labels = parse_labels(&args.labels)?;
            let infos = session
                .workspace()
                .aspect_target_infos(&labels, "cli")?;

            let report: Vec<ClosureReport<'_>> = infos
                .iter()
                .map(|(label, closure)| ClosureReport {
                    label: label.to_string(),
                    closure: closure.iter().map(|info| info.as_ref()).collect(),
                })
                .collect();
            if args.workspace.json {
                print_json(&report)?;
            } else {
                for entry in &report {
                    println!("{}", entry.label);
                    for info in &entry.closure {
                        println!("  {} ({})", info.label, info.rule_kind);
                    }
                }
            }
            let missing = missing_labels(&labels, &infos);
            for label in &missing {
                eprintln!("warning: no aspect info for {label}");
            }
            Ok(if missing.is_empty() { 0 } else { 1 })
        }
        Command::Classpath(args) => {
            let session = Session::open(&args.workspace.path)?;
            let package = Label::parse(&args.package)
                .with_context(|| format!("invalid package label `{}`", args.package))?;
            let name = args
                .project
                .clone()
                .unwrap_or_else(|| package.package_path().to_string());

            let mut project = JvmProject::new(name, package.clone());
            if !args.targets.is_empty() {
                project = project.with_targets(parse_labels(&args.targets)?);
            }
            let folders = if args.source_folders.is_empty() {
                vec![PathBuf::from(package.package_path())]
            } else {
                args.source_folders.clone()
            };
            for folder in folders {
                project = project.with_source_folder(SourceFolder::new(folder));
            }

            let registry = Arc::new(InMemoryProjectRegistry::new());
            registry.add(project.clone());
            let classpath = JvmClasspath::new(session.workspace_arc(), registry)
                .with_mode(session.resolution_mode())
                .with_ttl(session.config().classpath.cache_ttl());
            let response = classpath.resolve(&project)?;

            if args.workspace.json {
                print_json(&*response)?;
            } else {
                for entry in &response.entries {
                    println!("{}", describe_entry(entry));
                }
                if !response.is_complete {
                    eprintln!("warning: classpath is incomplete; see the log for failed targets");
                }
            }
            Ok(if response.is_complete { 0 } else { 1 })
        }
        Command::Options(args) => {
            let session = Session::open(&args.path)?;
            let options = session.workspace().command_options();
            if args.json {
                print_json(options)?;
            } else {
                for (name, value) in options.iter() {
                    println!("--{name}={value}");
                }
            }
            Ok(0)
        }
        Command::Config(args) => {
            let (config, path, diagnostics) = session::load_config(&args.path)?;
            if args.json {
                print_json(&ConfigReport {
                    path,
                    config,
                    unknown_keys: diagnostics.unknown_keys,
                    warnings: diagnostics.warnings.iter().map(ToString::to_string).collect(),
                })?;
            } else {
                match &path {
                    Some(path) => println!("config: {}", path.display()),
                    None => println!("config: defaults (no aspectra.toml found)"),
                }
                print!("{}", toml::to_string_pretty(&config)?);
                for key in &diagnostics.unknown_keys {
                    println!("unknown key: {key}");
                }
                for warning in &diagnostics.warnings {
                    println!("warning: {warning}");
                }
            }
            Ok(0)
        }
    }
}

#[derive(Serialize)]
struct ClosureReport<'a> {
    label: String,
    closure: Vec<&'a TargetInfo>,
}

#[derive(Serialize)]
struct ConfigReport {
    path: Option<PathBuf>,
    config: aspectra_config::AspectraConfig,
    unknown_keys: Vec<String>,
    warnings: Vec<String>,
}

fn parse_labels(raw: &[String]) -> Result<Vec<Label>> {
    raw.iter()
        .map(|label| Label::parse(label).with_context(|| format!("invalid label `{label}`")))
        .collect()
}

/// Requested labels without a closure, each reported once.
fn missing_labels<'a, V>(
    requested: &'a [Label],
    infos: &IndexMap<Label, V>,
) -> Vec<&'a Label> {
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|label| seen.insert(*label) && !infos.contains_key(*label))
        .collect()
}

fn describe_entry(entry: &ClasspathEntry) -> String {
    match entry {
        ClasspathEntry::Library {
            jar,
            source_jar,
            test_only,
        } => {
            let scope = if *test_only { "test" } else { "main" };
            match source_jar {
                Some(source_jar) => {
                    format!("{scope}\t{}\t{}", jar.display(), source_jar.display())
                }
                None => format!("{scope}\t{}", jar.display()),
            }
        }
        ClasspathEntry::Project { name } => format!("project\t{name}"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
