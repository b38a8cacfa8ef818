//! Semantic validation (spec §4.5 step 2): duplicate detection, patch
//! dependency sanity and parameter-name/cycle checks layered on top of what
//! the loader and patch processor already enforce at their own stage
//! boundaries (defense-in-depth, since a hand-edited definition can reach
//! the validator without ever passing through those stages).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{PackageDefinition, ParameterMap};

#[derive(Clone, Debug)]
pub struct SemanticIssue {
    pub message: String,
}

fn issue(message: impl Into<String>) -> SemanticIssue {
    SemanticIssue { message: message.into() }
}

/// Runs every semantic check (spec §4.5 step 2), returning `(errors,
/// warnings)` separately so the caller can apply strict-mode promotion.
pub fn check(def: &PackageDefinition) -> (Vec<SemanticIssue>, Vec<SemanticIssue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    duplicate_resources(def, &mut errors);
    duplicate_patch_names(def, &mut errors);
    patch_dependencies(def, &mut errors, &mut warnings);
    patch_requires_cycle(def, &mut errors);
    reserved_parameter_names(&def.parameters, &mut warnings);
    parameter_cycles(&def.parameters, &mut errors);

    (errors, warnings)
}

fn duplicate_resources(def: &PackageDefinition, errors: &mut Vec<SemanticIssue>) {
    let mut seen = BTreeSet::new();
    for r in &def.resources {
        let id = r.identity();
        if !seen.insert(id.clone()) {
            errors.push(issue(format!("duplicate resource {}", id)));
        }
    }
}

fn duplicate_patch_names(def: &PackageDefinition, errors: &mut Vec<SemanticIssue>) {
    let mut seen = BTreeSet::new();
    for p in &def.patches {
        if !seen.insert(p.name.clone()) {
            errors.push(issue(format!("duplicate patch name '{}'", p.name)));
        }
    }
}

fn patch_dependencies(def: &PackageDefinition, errors: &mut Vec<SemanticIssue>, warnings: &mut Vec<SemanticIssue>) {
    let names: BTreeSet<&str> = def.patches.iter().map(|p| p.name.as_str()).collect();
    for p in &def.patches {
        for dep in p.requires() {
            if !names.contains(dep.as_str()) {
                errors.push(issue(format!("patch '{}' requires unknown patch '{}'", p.name, dep)));
            }
        }
        for dep in p.conflicts() {
            if !names.contains(dep.as_str()) {
                warnings.push(issue(format!("patch '{}' conflicts with unknown patch '{}'", p.name, dep)));
            }
        }
    }
}

fn patch_requires_cycle(def: &PackageDefinition, errors: &mut Vec<SemanticIssue>) {
    let nodes: Vec<String> = def.patches.iter().map(|p| p.name.clone()).collect();
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for p in &def.patches {
        edges.insert(p.name.clone(), p.requires().to_vec());
    }
    for cycle in crate::graph::dfs_cycles(&nodes, &edges) {
        errors.push(issue(format!("cyclic patch requires: {}", cycle.join(" -> "))));
    }
}

const RESERVED_PREFIXES: &[&str] = &["kurel.", "system.", "internal."];

fn reserved_parameter_names(params: &ParameterMap, warnings: &mut Vec<SemanticIssue>) {
    for key in params.keys() {
        for prefix in RESERVED_PREFIXES {
            let bare = prefix.trim_end_matches('.');
            if key == bare || key.starts_with(prefix) {
                warnings.push(issue(format!("parameter name '{}' uses a reserved prefix", key)));
                break;
            }
        }
    }
}

fn parameter_cycles(params: &ParameterMap, errors: &mut Vec<SemanticIssue>) {
    let graph = crate::resolver::debug_variable_graph(params);
    for cycle in graph.cycles {
        errors.push(issue(format!("cyclic parameter reference: {}", cycle.join(" -> "))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KurelMetadata, Patch, PatchMetadata, Resource, ResourceMetadata, Value};
    use std::path::PathBuf;

    fn def() -> PackageDefinition {
        PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"))
    }

    fn resource(kind: &str, name: &str) -> Resource {
        Resource::new("v1".into(), kind.into(), ResourceMetadata { name: name.into(), ..Default::default() }, Value::Null)
    }

    #[test]
    fn detects_duplicate_resources() {
        let mut d = def();
        d.resources.push(resource("Service", "web"));
        d.resources.push(resource("Service", "web"));
        let (errors, _) = check(&d);
        assert!(errors.iter().any(|e| e.message.contains("duplicate resource")));
    }

    #[test]
    fn requires_unknown_patch_is_an_error() {
        let mut d = def();
        let mut p = Patch::new("a", "");
        p.metadata = Some(PatchMetadata { requires: vec!["missing".to_string()], ..Default::default() });
        d.patches.push(p);
        let (errors, _) = check(&d);
        assert!(errors.iter().any(|e| e.message.contains("requires unknown patch")));
    }

    #[test]
    fn conflicts_unknown_patch_is_a_warning() {
        let mut d = def();
        let mut p = Patch::new("a", "");
        p.metadata = Some(PatchMetadata { conflicts: vec!["missing".to_string()], ..Default::default() });
        d.patches.push(p);
        let (errors, warnings) = check(&d);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.message.contains("conflicts with unknown patch")));
    }

    #[test]
    fn cyclic_patch_requires_is_an_error() {
        let mut d = def();
        let mut a = Patch::new("a", "");
        a.metadata = Some(PatchMetadata { requires: vec!["b".to_string()], ..Default::default() });
        let mut b = Patch::new("b", "");
        b.metadata = Some(PatchMetadata { requires: vec!["a".to_string()], ..Default::default() });
        d.patches.push(a);
        d.patches.push(b);
        let (errors, _) = check(&d);
        assert!(errors.iter().any(|e| e.message.contains("cyclic patch requires")));
    }

    #[test]
    fn reserved_parameter_prefix_is_a_warning() {
        let mut d = def();
        d.parameters.insert("kurel.internal".to_string(), Value::Bool(true));
        let (_, warnings) = check(&d);
        assert!(warnings.iter().any(|w| w.message.contains("reserved prefix")));
    }

    #[test]
    fn cyclic_parameter_reference_is_an_error() {
        let mut d = def();
        d.parameters.insert("a".to_string(), Value::String("${b}".to_string()));
        d.parameters.insert("b".to_string(), Value::String("${a}".to_string()));
        let (errors, _) = check(&d);
        assert!(errors.iter().any(|e| e.message.contains("cyclic parameter reference")));
    }
}
