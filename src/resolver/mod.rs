//! Variable resolution (spec §4.2): substitutes `${a.b.c}` references across
//! arbitrarily nested parameters, detecting cycles and enforcing depth.
//!
//! Cycle detection for `DebugVariableGraph` (spec §4.2) reuses the shared
//! `crate::graph` DFS coloring rather than a resolver-local copy, since the
//! same algorithm also backs the validator's parameter-cycle check (§4.5).

pub mod path;

use std::collections::{HashMap, HashSet};

use crate::error::{ErrorKind, Result};
use crate::merge::shallow_merge;
use crate::model::{ParameterMap, ParameterMapWithSource, ParameterSource, Provenance, Value};
use crate::varref::{partial_ref_re, whole_ref_re};

#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions { max_depth: 10 }
    }
}

struct Resolution<'a> {
    root: &'a ParameterMap,
    cache: HashMap<String, Value>,
    max_depth: usize,
}

/// Merges `base` (package parameters) with `overrides` (user values) and
/// substitutes every `${...}` reference, producing one `ParameterSource`
/// per top-level key (spec §4.2).
pub fn resolve(base: &ParameterMap, overrides: &ParameterMap, opts: &ResolveOptions) -> Result<ParameterMapWithSource> {
    let merged = shallow_merge(base, overrides);
    let mut ctx = Resolution { root: &merged, cache: HashMap::new(), max_depth: opts.max_depth };

    let mut result = ParameterMapWithSource::new();
    for key in merged.keys() {
        let mut stack = HashSet::new();
        let resolved = resolve_path(&mut ctx, key, &mut stack, 0)?;
        let provenance = if overrides.contains_key(key) {
            Provenance::Local
        } else if base.contains_key(key) {
            Provenance::Package
        } else {
            Provenance::Default
        };
        result.insert(key.clone(), ParameterSource::new(resolved, provenance, None));
    }
    Ok(result)
}

fn resolve_path(ctx: &mut Resolution, path: &str, stack: &mut HashSet<String>, depth: usize) -> Result<Value> {
    let key = path::normalize(path);

    if let Some(cached) = ctx.cache.get(&key) {
        return Ok(cached.clone());
    }
    if stack.contains(&key) {
        return Err(ErrorKind::CyclicReference(path.to_string()).into());
    }
    if depth > ctx.max_depth {
        return Err(ErrorKind::DepthExceeded(path.to_string(), ctx.max_depth).into());
    }

    let segments = path::parse(path)?;
    let raw = path::navigate(ctx.root, &segments)
        .ok_or_else(|| ErrorKind::UndefinedVariable(path.to_string()))?;

    stack.insert(key.clone());
    let resolved = resolve_value(ctx, &raw, stack, depth + 1)?;
    stack.remove(&key);

    ctx.cache.insert(key, resolved.clone());
    Ok(resolved)
}

fn resolve_value(ctx: &mut Resolution, value: &Value, stack: &mut HashSet<String>, depth: usize) -> Result<Value> {
    match value {
        Value::String(s) => resolve_string(ctx, s, stack, depth),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(ctx, item, stack, depth)?);
            }
            Ok(Value::List(out))
        }
        Value::Map(map) => {
            let mut out = std::collections::BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(ctx, v, stack, depth)?);
            }
            Ok(Value::Map(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(ctx: &mut Resolution, s: &str, stack: &mut HashSet<String>, depth: usize) -> Result<Value> {
    if let Some(caps) = whole_ref_re().captures(s) {
        let path = caps.get(1).unwrap().as_str().to_string();
        return resolve_path(ctx, &path, stack, depth);
    }

    let matches: Vec<(usize, usize, String)> = partial_ref_re()
        .captures_iter(s)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.start(), m.end(), c.get(1).unwrap().as_str().to_string())
        })
        .collect();

    if matches.is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    let mut out = String::new();
    let mut last = 0;
    for (start, end, path) in matches {
        out.push_str(&s[last..start]);
        let resolved = resolve_path(ctx, &path, stack, depth)?;
        out.push_str(&resolved.to_canonical_string());
        last = end;
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

/// Substitutes every `${...}` reference in `text` against already-resolved
/// top-level parameters (spec §9 "Template resources"): used by the
/// emitter to re-materialize a `TemplateData` resource once the resolver
/// and patch processor have run. No cycle bookkeeping beyond a single
/// per-call stack is needed since `resolved` is itself resolution output.
pub fn substitute_resolved(text: &str, resolved: &ParameterMap, opts: &ResolveOptions) -> Result<String> {
    let mut ctx = Resolution { root: resolved, cache: HashMap::new(), max_depth: opts.max_depth };
    let mut stack = HashSet::new();
    let value = resolve_string(&mut ctx, text, &mut stack, 0)?;
    Ok(value.to_canonical_string())
}

/// Every `${...}` reference path occurring anywhere inside `value`, used to
/// build the dependency graph (spec §4.2 `DebugVariableGraph`, §4.5
/// parameter-cycle validation).
pub fn referenced_paths(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_referenced_paths(value, &mut out);
    out
}

fn collect_referenced_paths(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in partial_ref_re().captures_iter(s) {
                out.push(caps.get(1).unwrap().as_str().to_string());
            }
        }
        Value::List(items) => {
            for item in items {
                collect_referenced_paths(item, out);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_referenced_paths(v, out);
            }
        }
        _ => {}
    }
}

/// The top-level parameter key a reference path starts at, e.g.
/// `app.name` and `items[2].x` both depend on top-level key `app`/`items`.
fn top_level_key(path: &str) -> String {
    let seg = path.split('.').next().unwrap_or(path);
    match seg.find('[') {
        Some(idx) => seg[..idx].to_string(),
        None => seg.to_string(),
    }
}

/// A dependency graph over top-level parameter keys, plus any `${...}`
/// cycles detected by DFS coloring (spec §4.2).
#[derive(Clone, Debug)]
pub struct VariableGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub cycles: Vec<Vec<String>>,
}

impl VariableGraph {
    /// Renders the graph as a flat textual edge list with a trailing list of
    /// detected cycles, suitable for `debug variables` CLI output (spec §6).
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (from, to) in &self.edges {
            out.push_str(&format!("{} -> {}\n", from, to));
        }
        if !self.cycles.is_empty() {
            out.push_str("cycles:\n");
            for cycle in &self.cycles {
                out.push_str(&format!("  {}\n", cycle.join(" -> ")));
            }
        }
        out
    }
}

/// `DebugVariableGraph` (spec §4.2): a textual dependency graph over a
/// parameter map's top-level keys, with any cycles called out explicitly.
pub fn debug_variable_graph(params: &ParameterMap) -> VariableGraph {
    let nodes: Vec<String> = params.keys().cloned().collect();
    let mut edges_map: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    let mut edges = Vec::new();

    for (key, value) in params {
        let mut targets: Vec<String> = referenced_paths(value).iter().map(|p| top_level_key(p)).collect();
        targets.sort();
        targets.dedup();
        for t in &targets {
            if params.contains_key(t) {
                edges.push((key.clone(), t.clone()));
            }
        }
        edges_map.insert(key.clone(), targets);
    }

    let cycles = if crate::graph::has_cycle(&nodes, &edges) {
        crate::graph::dfs_cycles(&nodes, &edges_map)
    } else {
        Vec::new()
    };
    VariableGraph { nodes, edges, cycles }
}
