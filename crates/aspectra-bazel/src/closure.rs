//! Transitive dependency closures over the targets produced by one aspect build.

use crate::{
    label::Label,
    target_info::{Dependency, TargetInfo},
};
use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    sync::Arc,
};

/// Closure of a requested label: the [`TargetInfo`]s reachable from it, ordered by label.
pub type TargetInfoSet = Arc<BTreeSet<Arc<TargetInfo>>>;

/// Breadth-first closure of the concrete label `root` over declared dependencies.
///
/// `root` itself is only part of its closure when it is a test or import target. Dependencies
/// without a [`TargetInfo`] (non-JVM rules, unparsable labels) are skipped along with everything
/// below them. Returns `None` if `root` has no info in `infos`.
pub fn transitive_closure(
    root: &Label,
    infos: &HashMap<Label, Arc<TargetInfo>>,
) -> Option<BTreeSet<Arc<TargetInfo>>> {
    let root_info = infos.get(root)?;

    let mut closure = BTreeSet::new();
    if root_info.kind.includes_self_in_closure() {
        closure.insert(Arc::clone(root_info));
    }

    let mut visited: HashSet<&Label> = HashSet::from([root]);
    let mut skipped: Vec<&Dependency> = Vec::new();
    let mut queue: VecDeque<&Dependency> = root_info.deps.iter().collect();

    while let Some(dep) = queue.pop_front() {
        let Some(label) = dep.label() else {
            skipped.push(dep);
            continue;
        };
        if !visited.insert(label) {
            continue;
        }
        match infos.get(label) {
            Some(info) => {
                closure.insert(Arc::clone(info));
                queue.extend(info.deps.iter());
            }
            None => skipped.push(dep),
        }
    }

    if !skipped.is_empty() {
        tracing::trace!(
            target = "aspectra.bazel",
            root = %root,
            skipped = ?skipped,
            "dependencies without aspect info were left out of the closure"
        );
    }

    Some(closure)
}

/// Closures owned by `requested` after one aspect build.
///
/// A concrete label owns only its own closure. A wildcard owns every target of its package
/// (each with its own closure) plus itself, mapped to all of `infos`. A concrete label whose
/// target did not produce aspect info owns nothing.
pub fn assign_to_owning_labels(
    requested: &Label,
    infos: &HashMap<Label, Arc<TargetInfo>>,
) -> Vec<(Label, BTreeSet<Arc<TargetInfo>>)> {
    if requested.is_concrete() {
        return transitive_closure(requested, infos)
            .map(|closure| vec![(requested.clone(), closure)])
            .unwrap_or_default();
    }

    let mut package_labels: Vec<&Label> = infos
        .keys()
        .filter(|label| label.is_concrete() && label.same_package(requested))
        .collect();
    package_labels.sort();

    let mut owned: Vec<_> = package_labels
        .into_iter()
        .filter_map(|label| {
            transitive_closure(label, infos).map(|closure| (label.clone(), closure))
        })
        .collect();
    owned.push((requested.clone(), infos.values().cloned().collect()));
    owned
}
