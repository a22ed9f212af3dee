use std::collections::{HashMap, HashSet};

use super::types::TaskInstance;

/// Order the pending list for dispatch.
///
/// Depth-first post-order over each instance's waiting set, visiting roots in
/// their current order. Waiting names that are not pending (executing tasks)
/// are not traversed. Dispatch takes from the front and stops at the first
/// instance that is not ready.
pub fn topological_order(pending: Vec<TaskInstance>) -> Vec<TaskInstance> {
    let index: HashMap<&str, usize> = pending
        .iter()
        .enumerate()
        .map(|(i, task)| (task.name.as_str(), i))
        .collect();

    let mut visited = HashSet::with_capacity(pending.len());
    let mut order = Vec::with_capacity(pending.len());
    for i in 0..pending.len() {
        visit(i, &pending, &index, &mut visited, &mut order);
    }

    let mut slots: Vec<Option<TaskInstance>> = pending.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn visit(
    i: usize,
    pending: &[TaskInstance],
    index: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(i) {
        return;
    }
    for dep in &pending[i].waiting {
        if let Some(&j) = index.get(dep.as_str()) {
            visit(j, pending, index, visited, order);
        }
    }
    order.push(i);
}

/// Render a dependency path that closes on itself, e.g. `a -> b -> a`.
pub fn format_cycle_path(path: &[String], repeated: &str) -> String {
    let start = path.iter().position(|name| name == repeated).unwrap_or(0);
    path[start..]
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(repeated))
        .collect::<Vec<_>>()
        .join(" -> ")
}
