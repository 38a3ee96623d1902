use tracing::warn;

use crate::graph::{FilterGraph, NodeId};

/// Search path plus the nodes already finalized.
struct DfsState {
    path: Vec<NodeId>,
    finalized: Vec<bool>,
}

/// Find every reference cycle in `graph`, break it, and finalize all nodes.
///
/// Each edge along a discovered cycle is dropped and the lines that used it
/// are rewritten to match nothing and recorded as in-cycle. Returns each
/// cycle once, as filter names in traversal order.
pub(crate) fn sanitize_cycles(graph: &mut FilterGraph<'_>) -> Vec<Vec<String>> {
    let mut state = DfsState {
        path: Vec::new(),
        finalized: vec![false; graph.nodes.len()],
    };
    let mut cycles: Vec<Vec<NodeId>> = Vec::new();

    for id in graph.ids_by_name() {
        if state.finalized[id] {
            continue;
        }
        for cycle in visit(graph, id, &mut state) {
            if !cycles.contains(&cycle) {
                cycles.push(cycle);
            }
        }
    }

    let device = graph.device().name.clone();
    cycles
        .into_iter()
        .map(|cycle| {
            let names: Vec<String> = cycle.iter().map(|&id| graph.name(id).to_owned()).collect();
            warn!(device = %device, cycle = ?names, "cyclic filter references");
            names
        })
        .collect()
}

/// Returns the cycles found below `id` that have not been closed off above.
fn visit(graph: &mut FilterGraph<'_>, id: NodeId, state: &mut DfsState) -> Vec<Vec<NodeId>> {
    state.path.push(id);
    let mut found = Vec::new();

    let deps: Vec<NodeId> = graph.nodes[id].dependencies.iter().map(|d| d.node).collect();
    for dep in deps {
        if state.finalized[dep] {
            continue;
        }
        match state.path.iter().position(|&n| n == dep) {
            Some(start) => found.push(state.path[start..].to_vec()),
            None => found.extend(visit(graph, dep, state)),
        }
    }
    state.path.pop();

    for cycle in &found {
        let Some(pos) = cycle.iter().position(|&n| n == id) else {
            continue;
        };
        let next = cycle[(pos + 1) % cycle.len()];
        // Two cycles can share an edge; the first one already removed it.
        graph.nodes[id].break_dependency(next);
    }

    graph.nodes[id].finalize();
    state.finalized[id] = true;
    found
}
