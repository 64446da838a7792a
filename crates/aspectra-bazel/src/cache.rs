use crate::{
    aspect_file::AspectInfoFactory,
    aspect_runner::AspectGenerator,
    closure::{assign_to_owning_labels, TargetInfoSet},
    error::BazelError,
    label::Label,
};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

#[derive(Debug, Default)]
struct CacheState {
    /// Closures from the latest successful load; flushed when BUILD files or deps change.
    current: HashMap<Label, TargetInfoSet>,
    /// Every closure ever loaded. Only read when an aspect build parses to nothing.
    last_good: HashMap<Label, TargetInfoSet>,
    hits: u64,
}

/// Per-label cache of aspect closures with a last-known-good fallback.
///
/// All methods take the same lock, including the Bazel invocation of a load, so concurrent
/// callers never observe a half-populated cache and never build the same labels twice.
pub struct AspectInfoCache {
    generator: Box<dyn AspectGenerator>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for AspectInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AspectInfoCache")
            .field("current", &state.current.len())
            .field("last_good", &state.last_good.len())
            .field("hits", &state.hits)
            .finish()
    }
}

impl AspectInfoCache {
    pub fn new(generator: Box<dyn AspectGenerator>) -> Self {
        Self {
            generator,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Closures for `labels`, building the ones not in the cache.
    ///
    /// The result follows the order of `labels`. Labels that could be neither built nor
    /// served from the last-known-good cache are left out. `caller` only tags log events.
    pub fn get<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a Label>,
        caller: &str,
    ) -> Result<IndexMap<Label, TargetInfoSet>, BazelError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut requested: IndexSet<&Label> = IndexSet::new();
        let mut hits: HashMap<&Label, TargetInfoSet> = HashMap::new();
        let mut misses: Vec<Label> = Vec::new();
        for label in labels {
            if !requested.insert(label) {
                continue;
            }
            match state.current.get(label) {
                Some(closure) => {
                    state.hits += 1;
                    hits.insert(label, Arc::clone(closure));
                }
                None => misses.push(label.clone()),
            }
        }

        tracing::debug!(
            target = "aspectra.bazel",
            caller,
            hits = hits.len(),
            misses = misses.len(),
            "aspect cache lookup"
        );

        let mut loaded = if misses.is_empty() {
            HashMap::new()
        } else {
            Self::load(state, self.generator.as_ref(), &misses, caller)?
        };

        let mut results = IndexMap::with_capacity(requested.len());
        for label in requested {
            if let Some(closure) = hits.remove(label).or_else(|| loaded.remove(label)) {
                results.insert(label.clone(), closure);
            }
        }
        Ok(results)
    }

    fn load(
        state: &mut CacheState,
        generator: &dyn AspectGenerator,
        misses: &[Label],
        caller: &str,
    ) -> Result<HashMap<Label, TargetInfoSet>, BazelError> {
        tracing::info!(
            target = "aspectra.bazel",
            caller,
            targets = misses.len(),
            "loading aspect infos"
        );

        let files = generator.generate(misses)?;
        if files.is_empty() {
            let targets = misses
                .iter()
                .map(Label::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            tracing::error!(target = "aspectra.bazel", caller, %targets, "no aspect files generated");
            return Err(BazelError::NoAspectFiles { targets });
        }

        let infos = AspectInfoFactory::parse(&files);
        let mut results = HashMap::with_capacity(misses.len());

        if infos.is_empty() {
            tracing::warn!(
                target = "aspectra.bazel",
                caller,
                files = files.len(),
                "no aspect file could be parsed; using last known good closures"
            );
            for label in misses {
                if let Some(closure) = Self::fallback(state, label) {
                    results.insert(label.clone(), closure);
                }
            }
            return Ok(results);
        }

        let mut unresolved = Vec::new();
        for label in misses {
            let owned = assign_to_owning_labels(label, &infos);
            if owned.is_empty() {
                unresolved.push(label);
                continue;
            }
            for (owner, closure) in owned {
                let closure: TargetInfoSet = Arc::new(closure);
                state.last_good.insert(owner.clone(), Arc::clone(&closure));
                state.current.insert(owner, closure);
            }
        }

        for label in misses {
            if unresolved.contains(&label) {
                // The build failed for this target but not for others (`-k`).
                if let Some(closure) = Self::fallback(state, label) {
                    results.insert(label.clone(), closure);
                }
                continue;
            }
            let closure = match state.current.get(label) {
                Some(closure) => Arc::clone(closure),
                None => {
                    tracing::error!(
                        target = "aspectra.bazel",
                        caller,
                        label = %label,
                        "closure missing from the cache right after it was stored"
                    );
                    Arc::new(BTreeSet::new())
                }
            };
            results.insert(label.clone(), closure);
        }

        Ok(results)
    }

    fn fallback(state: &CacheState, label: &Label) -> Option<TargetInfoSet> {
        match state.last_good.get(label) {
            Some(closure) => {
                tracing::info!(
                    target = "aspectra.bazel",
                    label = %label,
                    "using last known good closure"
                );
                Some(Arc::clone(closure))
            }
            None => {
                tracing::warn!(
                    target = "aspectra.bazel",
                    label = %label,
                    "no aspect info and no last known good closure"
                );
                None
            }
        }
    }

    /// Drop every current closure. The last-known-good closures are kept.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        tracing::debug!(
            target = "aspectra.bazel",
            flushed = state.current.len(),
            "flushing aspect cache"
        );
        state.current.clear();
    }

    pub fn flush_label(&self, label: &Label) -> bool {
        self.state.lock().current.remove(label).is_some()
    }

    pub fn flush_labels<'a>(&self, labels: impl IntoIterator<Item = &'a Label>) {
        let mut state = self.state.lock();
        for label in labels {
            state.current.remove(label);
        }
    }

    /// Drop every current closure in `package`'s package, wildcard or not, and return the
    /// flushed labels in order.
    pub fn flush_for_package(&self, package: &Label) -> Vec<Label> {
        let mut state = self.state.lock();
        let mut flushed: Vec<Label> = state
            .current
            .keys()
            .filter(|label| label.same_package(package))
            .cloned()
            .collect();
        flushed.sort();
        for label in &flushed {
            state.current.remove(label);
        }
        if !flushed.is_empty() {
            tracing::debug!(
                target = "aspectra.bazel",
                package = %package.package_label(),
                flushed = flushed.len(),
                "flushed aspect cache for package"
            );
        }
        flushed
    }

    /// Number of labels served from the cache so far.
    pub fn cache_hits(&self) -> u64 {
        self.state.lock().hits
    }

    pub fn is_cached(&self, label: &Label) -> bool {
        self.state.lock().current.contains_key(label)
    }

    pub fn last_good(&self, label: &Label) -> Option<TargetInfoSet> {
        self.state.lock().last_good.get(label).cloned()
    }

    pub fn current_labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self.state.lock().current.keys().cloned().collect();
        labels.sort();
        labels
    }
}
