use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use aspectra_bazel::{
    BazelError, BazelWorkspace, BuildFileModel, CommandRunner, Label, TargetInfo, TargetInfoSet,
    TargetKind,
};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    implicit::{ImplicitDependencyLocator, TestRunnerJarLocator, WorkspaceLayout},
    projects::{JvmProject, ProjectRegistry},
    ClasspathEntry, ClasspathError, EntryKey,
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

const CALLER: &str = "classpath";

/// Source of BUILD file rule kinds.
pub trait BuildFileModelSource: Send + Sync {
    fn build_file_model(&self, package: &Label) -> Result<BuildFileModel, BazelError>;
}

/// Source of cached aspect closures.
pub trait AspectInfoSource: Send + Sync {
    fn aspect_target_infos(
        &self,
        labels: &[Label],
        caller: &str,
    ) -> Result<IndexMap<Label, TargetInfoSet>, BazelError>;

    fn flush_aspect_infos(&self, labels: &[Label]);
}

/// Everything the assembler needs from a workspace session.
pub trait ClasspathWorkspace: AspectInfoSource + BuildFileModelSource + WorkspaceLayout {}

impl<T> ClasspathWorkspace for T where T: AspectInfoSource + BuildFileModelSource + WorkspaceLayout {}

impl<R: CommandRunner> BuildFileModelSource for BazelWorkspace<R> {
    fn build_file_model(&self, package: &Label) -> Result<BuildFileModel, BazelError> {
        self.query_build_file(package)
    }
}

impl<R: CommandRunner> AspectInfoSource for BazelWorkspace<R> {
    fn aspect_target_infos(
        &self,
        labels: &[Label],
        caller: &str,
    ) -> Result<IndexMap<Label, TargetInfoSet>, BazelError> {
        BazelWorkspace::aspect_target_infos(self, labels, caller)
    }

    fn flush_aspect_infos(&self, labels: &[Label]) {
        self.aspect_cache().flush_labels(labels);
    }
}

/// What to do when a classpath cannot be computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Log the failure and answer with an empty, incomplete classpath.
    #[default]
    Production,
    /// Surface the failure to the caller.
    Verification,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JvmClasspathResponse {
    /// `main_entries`, then `test_entries`, then `implicit_entries`.
    pub entries: Vec<ClasspathEntry>,
    pub main_entries: Vec<ClasspathEntry>,
    pub test_entries: Vec<ClasspathEntry>,
    pub implicit_entries: Vec<ClasspathEntry>,
    /// Names of other open projects this classpath depends on.
    pub project_references: Vec<String>,
    /// `false` when some activated target had no aspect closure or resolution failed.
    pub is_complete: bool,
}

impl JvmClasspathResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct CachedResponse {
    response: Arc<JvmClasspathResponse>,
    computed_at: Instant,
}

type Slot = Arc<Mutex<Option<CachedResponse>>>;

/// Computes and caches the classpath of each open project.
///
/// Resolutions of the same project are serialized; different projects resolve in parallel.
pub struct JvmClasspath<W> {
    workspace: Arc<W>,
    registry: Arc<dyn ProjectRegistry>,
    implicit: Box<dyn ImplicitDependencyLocator>,
    mode: ResolutionMode,
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<W> std::fmt::Debug for JvmClasspath<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JvmClasspath")
            .field("mode", &self.mode)
            .field("ttl", &self.ttl)
            .field("projects", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

impl<W: ClasspathWorkspace> JvmClasspath<W> {
    pub fn new(workspace: Arc<W>, registry: Arc<dyn ProjectRegistry>) -> Self {
        Self {
            workspace,
            registry,
            implicit: Box::new(TestRunnerJarLocator),
            mode: ResolutionMode::default(),
            ttl: DEFAULT_CACHE_TTL,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_implicit_locator(mut self, locator: Box<dyn ImplicitDependencyLocator>) -> Self {
        self.implicit = locator;
        self
    }

    pub fn workspace(&self) -> &Arc<W> {
        &self.workspace
    }

    /// The classpath of `project`, recomputed once the cached answer is older than the TTL.
    ///
    /// In [`ResolutionMode::Production`] failures produce an empty response that is not cached.
    pub fn resolve(&self, project: &JvmProject) -> Result<Arc<JvmClasspathResponse>, ClasspathError> {
        let slot = self.slot(&project.name);
        let mut cached = slot.lock();
        if let Some(entry) = cached.as_ref() {
            if entry.computed_at.elapsed() < self.ttl {
                tracing::debug!(
                    target = "aspectra.classpath",
                    project = %project.name,
                    "classpath served from cache"
                );
                return Ok(Arc::clone(&entry.response));
            }
        }

        let started = Instant::now();
        match self.compute(project) {
            Ok(response) => {
                tracing::info!(
                    target = "aspectra.classpath",
                    project = %project.name,
                    entries = response.entries.len(),
                    complete = response.is_complete,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "resolved classpath"
                );
                let response = Arc::new(response);
                *cached = Some(CachedResponse {
                    response: Arc::clone(&response),
                    computed_at: Instant::now(),
                });
                Ok(response)
            }
            Err(err) => {
                tracing::error!(
                    target = "aspectra.classpath",
                    project = %project.name,
                    error = %err,
                    "failed to resolve classpath"
                );
                match self.mode {
                    ResolutionMode::Production => Ok(Arc::new(JvmClasspathResponse::empty())),
                    ResolutionMode::Verification => Err(err),
                }
            }
        }
    }

    /// Drop the cached classpath of one project.
    pub fn clean(&self, project: &str) {
        let slot = self.slots.lock().get(project).cloned();
        if let Some(slot) = slot {
            *slot.lock() = None;
        }
    }

    pub fn clean_all(&self) {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        for slot in slots {
            *slot.lock() = None;
        }
    }

    fn slot(&self, project: &str) -> Slot {
        Arc::clone(self.slots.lock().entry(project.to_string()).or_default())
    }

    fn compute(&self, project: &JvmProject) -> Result<JvmClasspathResponse, ClasspathError> {
        let model = self.workspace.build_file_model(&project.package)?;
        let activated = model.activated_targets(&project.configured_targets);
        if activated.is_empty() {
            tracing::warn!(
                target = "aspectra.classpath",
                project = %project.name,
                package = %project.package,
                "no targets activated"
            );
            return Ok(JvmClasspathResponse {
                is_complete: true,
                ..JvmClasspathResponse::default()
            });
        }

        let closures = self.workspace.aspect_target_infos(&activated, CALLER)?;

        let mut entries = PartitionedEntries::default();
        let mut implicit: IndexSet<ClasspathEntry> = IndexSet::new();
        let mut project_references: Vec<String> = Vec::new();
        let mut is_complete = true;

        for target in &activated {
            let is_test_target = model.target_kind(target) == Some(TargetKind::Test);
            let Some(closure) = closures.get(target) else {
                tracing::warn!(
                    target = "aspectra.classpath",
                    project = %project.name,
                    label = %target,
                    "no aspect information for activated target"
                );
                is_complete = false;
                continue;
            };

            for info in closure.iter() {
                if activated.contains(&info.label) {
                    if info.kind.is_library_or_binary() {
                        continue;
                    }
                    if info.kind == TargetKind::Test {
                        implicit.extend(
                            self.implicit
                                .implicit_dependencies(self.workspace.as_ref(), info),
                        );
                        continue;
                    }
                }

                match self.owning_project(info) {
                    Some(owner) if owner.name == project.name => {}
                    Some(owner) => {
                        entries.add(ClasspathEntry::project(owner.name.clone()), is_test_target);
                        if !project_references.contains(&owner.name) {
                            project_references.push(owner.name.clone());
                        }
                    }
                    None => {
                        self.add_jars(project, info, is_test_target, &activated, &mut entries);
                    }
                }
            }
        }

        let PartitionedEntries { main, test } = entries;
        let main_entries: Vec<ClasspathEntry> = main.into_values().collect();
        let test_entries: Vec<ClasspathEntry> = test.into_values().collect();
        let implicit_entries: Vec<ClasspathEntry> = implicit.into_iter().collect();
        let entries = main_entries
            .iter()
            .chain(&test_entries)
            .chain(&implicit_entries)
            .cloned()
            .collect();

        Ok(JvmClasspathResponse {
            entries,
            main_entries,
            test_entries,
            implicit_entries,
            project_references,
            is_complete,
        })
    }

    fn owning_project(&self, info: &TargetInfo) -> Option<Arc<JvmProject>> {
        info.sources
            .iter()
            .find_map(|source| self.registry.owning_project(Path::new(source)))
    }

    fn add_jars(
        &self,
        project: &JvmProject,
        info: &TargetInfo,
        is_test_target: bool,
        activated: &[Label],
        entries: &mut PartitionedEntries,
    ) {
        for jars in info.all_jars() {
            match jars.classpath_jar() {
                Some(jar) => entries.add(
                    ClasspathEntry::library(jar.clone(), jars.source_jar.clone(), is_test_target),
                    is_test_target,
                ),
                None => {
                    // The aspect output is unusable; make the next resolution rebuild it.
                    tracing::warn!(
                        target = "aspectra.classpath",
                        project = %project.name,
                        label = %info.label,
                        "target reports a jar set without a jar"
                    );
                    self.workspace.flush_aspect_infos(activated);
                }
            }
        }
    }
}

/// Main and test-only entries keyed by jar path or project name.
///
/// A key is never in both maps: a main entry evicts the test-only one, and a test-only entry
/// is ignored once the key is on the main classpath. Within a map the first entry for a key
/// is kept as is.
#[derive(Debug, Default)]
struct PartitionedEntries {
    main: IndexMap<EntryKey, ClasspathEntry>,
    test: IndexMap<EntryKey, ClasspathEntry>,
}

impl PartitionedEntries {
    fn add(&mut self, entry: ClasspathEntry, test_only: bool) {
        let key = entry.key();
        let entry = entry.with_test_only(test_only);
        if !test_only {
            self.test.shift_remove(&key);
            self.main.entry(key).or_insert(entry);
        } else if !self.main.contains_key(&key) {
            self.test.entry(key).or_insert(entry);
        }
    }
}
