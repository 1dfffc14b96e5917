//! Installation ordering.
//!
//! Tools are ordered by the DEPENDS_ON edges already known to the
//! knowledge store (dependencies first). Tools with no ordering
//! constraint come out by descending priority, ties by name, so a given
//! stack always resolves in the same order.

use crate::oracle::ToolCandidate;
use rig_common::{normalize_name, KnowledgeStore, RelationKind};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Topologically order candidates by known DEPENDS_ON edges.
///
/// Kahn's algorithm; the ready set is kept sorted by (priority desc,
/// name asc). Cycles are broken deterministically: members are appended
/// in priority order with a warning.
pub fn dependency_order(candidates: Vec<ToolCandidate>, store: &KnowledgeStore) -> Vec<ToolCandidate> {
    let names: HashSet<String> = candidates.iter().map(|c| normalize_name(&c.name)).collect();

    // dependencies[x] = tools x waits for (within this stack)
    let mut dependencies: HashMap<String, HashSet<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for candidate in &candidates {
        let name = normalize_name(&candidate.name);
        let deps: HashSet<String> = store
            .query_related(&name, Some(RelationKind::DependsOn), 1)
            .map(|e| e.name)
            .filter(|dep| names.contains(dep) && *dep != name)
            .collect();
        for dep in &deps {
            dependents.entry(dep.clone()).or_default().push(name.clone());
        }
        dependencies.insert(name, deps);
    }

    let mut by_name: HashMap<String, ToolCandidate> = candidates
        .into_iter()
        .map(|c| (normalize_name(&c.name), c))
        .collect();

    let mut ready: Vec<String> = dependencies
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    sort_ready(&mut ready, &by_name);

    let mut ordered = Vec::new();
    while let Some(name) = ready.pop() {
        for dependent in dependents.remove(&name).unwrap_or_default() {
            if let Some(deps) = dependencies.get_mut(&dependent) {
                deps.remove(&name);
                if deps.is_empty() {
                    ready.push(dependent);
                }
            }
        }
        dependencies.remove(&name);
        if let Some(candidate) = by_name.remove(&name) {
            ordered.push(candidate);
        }
        sort_ready(&mut ready, &by_name);
    }

    // Anything left is part of a dependency cycle
    if !by_name.is_empty() {
        let mut remaining: Vec<String> = by_name.keys().cloned().collect();
        warn!(tools = ?remaining, "dependency cycle detected, falling back to priority order");
        sort_ready(&mut remaining, &by_name);
        while let Some(name) = remaining.pop() {
            if let Some(candidate) = by_name.remove(&name) {
                ordered.push(candidate);
            }
        }
    }

    ordered
}

/// Keep the ready list sorted so that `pop` yields highest priority
/// first, ties by name.
fn sort_ready(ready: &mut [String], by_name: &HashMap<String, ToolCandidate>) {
    ready.sort_by(|a, b| {
        let pa = by_name.get(a).map(|c| c.priority).unwrap_or(0);
        let pb = by_name.get(b).map(|c| c.priority).unwrap_or(0);
        // Reverse: pop() takes from the back
        pa.cmp(&pb).then_with(|| b.cmp(a))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_common::ToolCategory;

    fn candidate(name: &str, priority: u8) -> ToolCandidate {
        ToolCandidate::new(name, ToolCategory::Other, "true").with_priority(priority)
    }

    #[test]
    fn test_priority_order_without_dependencies() {
        let store = KnowledgeStore::in_memory();
        let ordered = dependency_order(
            vec![candidate("low", 2), candidate("high", 9), candidate("mid", 5)],
            &store,
        );
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_name_breaks_priority_ties() {
        let store = KnowledgeStore::in_memory();
        let ordered = dependency_order(
            vec![candidate("zeta", 5), candidate("alpha", 5), candidate("mid", 5)],
            &store,
        );
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let store = KnowledgeStore::in_memory();
        store
            .add_relationship("docker", RelationKind::DependsOn, "curl")
            .unwrap();

        // docker has higher priority but must wait for curl
        let ordered = dependency_order(
            vec![candidate("docker", 9), candidate("curl", 1)],
            &store,
        );
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["curl", "docker"]);
    }

    #[test]
    fn test_cycle_falls_back_to_priority() {
        let store = KnowledgeStore::in_memory();
        store.add_relationship("a", RelationKind::DependsOn, "b").unwrap();
        store.add_relationship("b", RelationKind::DependsOn, "a").unwrap();

        let ordered = dependency_order(
            vec![candidate("a", 3), candidate("b", 7), candidate("c", 5)],
            &store,
        );
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        // c is unconstrained; the cycle members follow by priority
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_dependency_outside_stack_is_ignored() {
        let store = KnowledgeStore::in_memory();
        store
            .add_relationship("docker", RelationKind::DependsOn, "not-in-stack")
            .unwrap();
        let ordered = dependency_order(vec![candidate("docker", 5)], &store);
        assert_eq!(ordered.len(), 1);
    }
}
