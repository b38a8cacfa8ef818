//! Shared graph primitives used by the resolver's cycle detection, the
//! validator's semantic cycle checks and the patch processor's dependency
//! ordering (spec §4.2, §4.3, §4.5).
//!
//! Two distinct algorithms are specified and kept distinct rather than
//! folded into one generic "do graph stuff" helper: DFS white/gray/black
//! coloring for cycle *detection* (spec §4.2 `DebugVariableGraph`, §4.5
//! parameter/patch cycle checks), and Kahn's algorithm for the patch
//! processor's deterministic topological *ordering* (spec §4.3).

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;

#[derive(Clone, Copy, Eq, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first search with white/gray/black coloring over `edges` (node ->
/// its out-edges). Returns every cycle found, expressed as the sequence of
/// nodes from the re-entered node back to itself.
pub fn dfs_cycles(nodes: &[String], edges: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut color: BTreeMap<&str, Color> = nodes.iter().map(|n| (n.as_str(), Color::White)).collect();
    let mut cycles = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &'a BTreeMap<String, Vec<String>>,
        color: &mut BTreeMap<&'a str, Color>,
        stack: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        color.insert(node, Color::Gray);
        stack.push(node.to_string());

        if let Some(targets) = edges.get(node) {
            for t in targets {
                match color.get(t.as_str()).copied().unwrap_or(Color::White) {
                    Color::White => visit(t, edges, color, stack, cycles),
                    Color::Gray => {
                        // Re-entered an ancestor: slice the active stack from
                        // its first occurrence to build the cycle.
                        if let Some(pos) = stack.iter().position(|n| n == t) {
                            let mut cycle: Vec<String> = stack[pos..].to_vec();
                            cycle.push(t.clone());
                            cycles.push(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
    }

    for n in nodes {
        if color.get(n.as_str()).copied() == Some(Color::White) {
            visit(n, edges, &mut color, &mut stack, &mut cycles);
        }
    }
    cycles
}

/// Kahn's algorithm restricted to `nodes`, with ties on the ready set broken
/// by natural sort order of node name so the result is deterministic (spec
/// §4.3). `edges` maps a node to the nodes it depends on (its `requires`
/// set) — i.e. an edge `A -> B` means "A requires B", so B must precede A.
pub fn kahn_toposort(nodes: &[String], requires: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, Vec<String>> {
    let node_set: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();

    // in_degree[n] = number of unresolved dependencies of n.
    let mut in_degree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    // dependents[d] = nodes that require d (edge d -> n, processed once d is emitted).
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for n in nodes {
        let deps: Vec<&str> = requires
            .get(n)
            .map(|v| v.iter().map(String::as_str).filter(|d| node_set.contains(d)).collect())
            .unwrap_or_default();
        *in_degree.get_mut(n.as_str()).unwrap() += deps.len();
        for d in deps {
            dependents.entry(d).or_default().push(n.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut ordered: Vec<String> = Vec::new();
    while let Some(next) = ready.iter().next().copied() {
        ready.remove(next);
        ordered.push(next.to_string());
        if let Some(deps) = dependents.get(next) {
            for &m in deps {
                let deg = in_degree.get_mut(m).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(m);
                }
            }
        }
    }

    if ordered.len() == nodes.len() {
        Ok(ordered)
    } else {
        let remaining: Vec<String> = nodes
            .iter()
            .filter(|n| !ordered.contains(n))
            .cloned()
            .collect();
        Err(remaining)
    }
}

/// Builds a `petgraph::graph::DiGraph` mirroring `nodes`/`edges`, for
/// callers (`Debug*Graph`, spec §4.2, §4.3) that want the graph object
/// itself rather than just the rendered text.
pub fn to_petgraph(nodes: &[String], edges: &[(String, String)]) -> DiGraph<String, ()> {
    let mut g = DiGraph::new();
    let mut index: BTreeMap<&str, _> = BTreeMap::new();
    for n in nodes {
        index.insert(n.as_str(), g.add_node(n.clone()));
    }
    for (from, to) in edges {
        if let (Some(&a), Some(&b)) = (index.get(from.as_str()), index.get(to.as_str())) {
            g.add_edge(a, b, ());
        }
    }
    g
}

/// Cheap petgraph-backed existence check, used by the `Debug*Graph`
/// builders to skip the more expensive cycle-listing DFS on the common
/// acyclic case.
pub fn has_cycle(nodes: &[String], edges: &[(String, String)]) -> bool {
    is_cyclic_directed(&to_petgraph(nodes, edges))
}
