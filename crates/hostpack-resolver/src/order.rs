use std::collections::{BTreeMap, BTreeSet, HashSet};

use hostpack_core::{Error, PackageManifest, Result};
use tracing::debug;

/// Orders package names so that every package follows all of its dependencies.
///
/// Among packages whose dependencies are already placed, names are taken in
/// ascending lexical order, so the result is stable for a given input.
pub fn resolve_install_order(graph: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut reverse: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for name in graph.keys() {
        deps.insert(name, BTreeSet::new());
        reverse.insert(name, BTreeSet::new());
    }

    for (name, dependencies) in graph {
        for dep_name in dependencies {
            if !graph.contains_key(dep_name) {
                return Err(Error::UnknownDependency {
                    package: name.clone(),
                    dependency: dep_name.clone(),
                });
            }
            deps.entry(name).or_default().insert(dep_name);
            reverse.entry(dep_name).or_default().insert(name);
        }
    }

    let mut in_degree: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(name, dependency_set)| (*name, dependency_set.len()))
        .collect();

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter_map(|(name, degree)| (*degree == 0).then_some(*name))
        .collect();
    let mut ordered: Vec<String> = Vec::with_capacity(graph.len());

    while let Some(next) = ready.pop_first() {
        ordered.push(next.to_string());
        if let Some(children) = reverse.get(next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    if ordered.len() != graph.len() {
        let ordered_set: HashSet<&str> = ordered.iter().map(String::as_str).collect();
        let cycle_nodes = graph
            .keys()
            .filter(|name| !ordered_set.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        return Err(Error::CyclicDependency(cycle_nodes));
    }

    debug!(order = ?ordered, "resolved install order");
    Ok(ordered)
}

/// Orders manifests by their declared `requires` lists.
pub fn resolve_manifest_order(manifests: Vec<PackageManifest>) -> Result<Vec<PackageManifest>> {
    let mut by_name: BTreeMap<String, PackageManifest> = BTreeMap::new();
    for manifest in manifests {
        let name = manifest.name().to_string();
        if let Some(previous) = by_name.insert(name.clone(), manifest) {
            return Err(Error::Installation(format!(
                "package '{name}' is staged more than once (found {})",
                previous.pkg_id
            )));
        }
    }

    let graph = by_name
        .iter()
        .map(|(name, manifest)| (name.clone(), manifest.requires.clone()))
        .collect::<BTreeMap<_, _>>();
    let order = resolve_install_order(&graph)?;

    Ok(order
        .iter()
        .filter_map(|name| by_name.remove(name))
        .collect())
}
