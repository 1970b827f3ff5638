//! Dependency resolution over plugin manifests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginManifest;

/// Orders `manifests` so every plugin comes after its dependencies.
///
/// A missing dependency, an unsatisfied version clause or a cycle aborts with
/// a typed error naming the offending plugin. In lenient mode missing and
/// mismatched dependencies are logged and the edge is ignored; cycles still
/// abort.
pub(crate) fn resolve_order(
    manifests: &BTreeMap<String, PluginManifest>,
    lenient: bool,
) -> PluginResult<Vec<String>> {
    // name -> names it depends on, after validation
    let mut edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for (name, manifest) in manifests {
        let mut deps = BTreeSet::new();
        for (dep, spec) in &manifest.dependencies {
            let Some(found) = manifests.get(dep) else {
                if lenient {
                    warn!(plugin = %name, dependency = %dep, "Ignoring missing dependency");
                    continue;
                }
                return Err(PluginError::MissingDependency {
                    plugin: name.clone(),
                    dependency: dep.clone(),
                });
            };
            if !spec.matches(&found.version) {
                if lenient {
                    warn!(
                        plugin = %name,
                        dependency = %dep,
                        required = %spec,
                        found = %found.version,
                        "Ignoring version mismatch"
                    );
                    continue;
                }
                return Err(PluginError::VersionMismatch {
                    plugin: name.clone(),
                    dependency: dep.clone(),
                    required: spec.to_string(),
                    found: found.version.to_string(),
                });
            }
            deps.insert(dep.as_str());
        }
        edges.insert(name, deps);
    }

    // Kahn's algorithm over the validated edges.
    let mut in_degree: BTreeMap<&str, usize> =
        edges.iter().map(|(name, deps)| (*name, deps.len())).collect();
    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(manifests.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_owned());
        for (dependent, deps) in &edges {
            if deps.contains(name)
                && let Some(degree) = in_degree.get_mut(dependent)
            {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if order.len() != manifests.len() {
        let stuck = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(name, _)| *name)
            .next()
            .unwrap_or_default();
        return Err(PluginError::DependencyCycle {
            plugin: stuck.to_owned(),
        });
    }
    Ok(order)
}

/// Every plugin that transitively depends on any of `roots`, roots included.
pub(crate) fn dependents_closure(
    manifests: &BTreeMap<String, PluginManifest>,
    roots: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut affected: BTreeSet<String> = roots
        .iter()
        .filter(|name| manifests.contains_key(*name))
        .cloned()
        .collect();
    let mut frontier: VecDeque<String> = affected.iter().cloned().collect();

    while let Some(name) = frontier.pop_front() {
        for (dependent, manifest) in manifests {
            if manifest.dependencies.contains_key(&name) && affected.insert(dependent.clone()) {
                frontier.push_back(dependent.clone());
            }
        }
    }
    affected
}
