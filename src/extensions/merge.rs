//! Extension document model and merge semantics (spec §4.4).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ErrorKind, Result};
use crate::merge::{deep_merge, deep_merge_maps, shallow_merge};
use crate::model::{PackageDefinition, ParameterMap, Patch, PatchMetadata, Resource, Value};
use crate::patch::path as patch_path;

/// How an extension document's `parameters`/`patches`/`resources` combine
/// with the package's own (spec §4.4). Default is `Merge`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtensionType {
    Override,
    Merge,
    Replace,
}

impl Default for ExtensionType {
    fn default() -> Self {
        ExtensionType::Merge
    }
}

impl ExtensionType {
    fn parse(s: &str) -> ExtensionType {
        match s {
            "override" => ExtensionType::Override,
            "replace" => ExtensionType::Replace,
            _ => ExtensionType::Merge,
        }
    }
}

/// `kind`/`name` (with `*` wildcard prefix or suffix)/`namespace`/label-map
/// match over a resource (spec §4.4). Every present field must match; an
/// absent field matches anything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selector {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(kind) = &self.kind {
            if !resource.kind.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !name_matches(name, &resource.metadata.name) {
                return false;
            }
        }
        if let Some(ns) = &self.namespace {
            if resource.metadata.namespace.as_deref().unwrap_or("") != ns {
                return false;
            }
        }
        self.labels.iter().all(|(k, v)| resource.metadata.labels.get(k) == Some(v))
    }
}

fn name_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    pattern == name
}

/// A patch addition or update carried by an extension document. `body`/
/// `target`/`metadata` of `None` leave the matched patch's existing value
/// untouched when updating (spec §4.4 "updated (content and, if non-null,
/// metadata)").
#[derive(Clone, Debug, Default)]
pub struct PatchOverlay {
    pub name: String,
    pub target: Option<String>,
    pub body: Option<String>,
    pub metadata: Option<PatchMetadata>,
}

/// One resource-override entry: a selector plus its three action sets
/// (spec §4.4).
#[derive(Clone, Debug, Default)]
pub struct ResourceOverlay {
    pub selector: Selector,
    pub set: Vec<(String, Value)>,
    pub merge: Vec<(String, Value)>,
    pub remove: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ExtensionDocument {
    pub ext_type: ExtensionType,
    pub parameters: ParameterMap,
    pub patches: Vec<PatchOverlay>,
    pub resources: Vec<ResourceOverlay>,
    pub remove: Vec<Selector>,
}

/// Parses a `*.local.kurel` / `*.local.yaml` extension file (spec §4.4,
/// §6). Parsed the same manual way as a standalone YAML patch
/// (`loader::patches::load_standalone_yaml_patch`): there is no `Deserialize`
/// impl for `Value`, so fields are pulled out of a generic `Value::Map` by
/// hand rather than deriving onto this struct directly.
pub fn parse_extension_document(text: &str) -> Result<ExtensionDocument> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| ErrorKind::Parse(PathBuf::new(), e.to_string()))?;
    let value = Value::from_yaml(&yaml);
    let map = value
        .as_map()
        .ok_or_else(|| ErrorKind::Parse(PathBuf::new(), "extension document must be a mapping".to_string()))?;

    let ext_type = map.get("type").and_then(Value::as_str).map(ExtensionType::parse).unwrap_or_default();
    let parameters = map.get("parameters").and_then(Value::as_map).cloned().unwrap_or_default();

    let patches = map
        .get("patches")
        .and_then(Value::as_list)
        .map(|l| l.iter().filter_map(parse_patch_overlay).collect())
        .unwrap_or_default();
    let resources = map
        .get("resources")
        .and_then(Value::as_list)
        .map(|l| l.iter().map(parse_resource_overlay).collect())
        .unwrap_or_default();
    let remove = map
        .get("remove")
        .and_then(Value::as_list)
        .map(|l| l.iter().filter_map(parse_selector).collect())
        .unwrap_or_default();

    Ok(ExtensionDocument { ext_type, parameters, patches, resources, remove })
}

fn parse_selector(v: &Value) -> Option<Selector> {
    let m = v.as_map()?;
    Some(Selector {
        kind: m.get("kind").and_then(Value::as_str).map(str::to_string),
        name: m.get("name").and_then(Value::as_str).map(str::to_string),
        namespace: m.get("namespace").and_then(Value::as_str).map(str::to_string),
        labels: m
            .get("labels")
            .and_then(Value::as_map)
            .map(|lm| lm.iter().map(|(k, v)| (k.clone(), v.to_canonical_string())).collect())
            .unwrap_or_default(),
    })
}

fn parse_patch_overlay(v: &Value) -> Option<PatchOverlay> {
    let m = v.as_map()?;
    let name = m.get("name").and_then(Value::as_str)?.to_string();
    let target = m.get("target").and_then(Value::as_str).map(str::to_string);
    let body = m.get("patch").and_then(Value::as_str).map(str::to_string);
    let has_metadata = ["enabled", "description", "requires", "conflicts"].iter().any(|k| m.contains_key(*k));
    let metadata = if has_metadata {
        Some(PatchMetadata {
            enabled: m.get("enabled").map(Value::to_canonical_string),
            description: m.get("description").map(Value::to_canonical_string),
            requires: string_list(m.get("requires")),
            conflicts: string_list(m.get("conflicts")),
        })
    } else {
        None
    };
    Some(PatchOverlay { name, target, body, metadata })
}

fn parse_resource_overlay(v: &Value) -> ResourceOverlay {
    let m = match v.as_map() {
        Some(m) => m,
        None => return ResourceOverlay::default(),
    };
    let selector = m.get("selector").and_then(parse_selector).unwrap_or_default();
    let set = field_ops(m.get("override"));
    let merge = field_ops(m.get("merge"));
    let remove = string_list(m.get("remove"));
    ResourceOverlay { selector, set, merge, remove }
}

fn field_ops(value: Option<&Value>) -> Vec<(String, Value)> {
    value.and_then(Value::as_map).map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value.and_then(Value::as_list).map(|l| l.iter().map(Value::to_canonical_string).collect()).unwrap_or_default()
}

/// Applies one parsed extension document on top of `def`, returning a fresh
/// deep copy (spec §4.4, §9). Path-operation failures (a selector path that
/// can't be constructed) are tolerated the same way the patch processor
/// tolerates a missing `delete` target: skipped rather than propagated,
/// since a single malformed action inside an otherwise-valid extension
/// should not sink the whole merge.
pub fn apply_extension(def: &PackageDefinition, doc: &ExtensionDocument) -> PackageDefinition {
    let mut out = def.deep_copy();

    out.parameters = match doc.ext_type {
        ExtensionType::Replace => doc.parameters.clone(),
        ExtensionType::Override => shallow_merge(&out.parameters, &doc.parameters),
        ExtensionType::Merge => deep_merge_maps(&out.parameters, &doc.parameters),
    };

    out.resources.retain(|r| !doc.remove.iter().any(|sel| sel.matches(r)));

    // Resource overlays are always action-based (override/merge/remove at a
    // selector), never a whole-collection substitution, so `ext_type` has no
    // effect here: there is no "replace the entire resource set" form for an
    // extension document to express, only per-field actions against matched
    // resources plus the separate `remove` list handled above.
    for overlay in &doc.resources {
        for resource in out.resources.iter_mut().filter(|r| overlay.selector.matches(r)) {
            for (path, value) in &overlay.set {
                if let Ok(segments) = patch_path::parse(path) {
                    let _ = patch_path::set(&mut resource.object, &segments, value.clone());
                }
            }
            for (path, value) in &overlay.merge {
                if let Ok(segments) = patch_path::parse(path) {
                    let existing = patch_path::get(&resource.object, &segments).cloned().unwrap_or_default();
                    let merged = deep_merge(&existing, value);
                    let _ = patch_path::set(&mut resource.object, &segments, merged);
                }
            }
            for path in &overlay.remove {
                if let Ok(segments) = patch_path::parse(path) {
                    let _ = patch_path::delete(&mut resource.object, &segments);
                }
            }
        }
    }

    match doc.ext_type {
        // "replace substitutes the entire target collection" (spec §4.4):
        // under `Replace` the package's own patches are gone entirely, not
        // just the ones named by the overlay.
        ExtensionType::Replace => {
            out.patches = doc.patches.iter().map(overlay_to_patch).collect();
        }
        // "matched are updated; unmatched are appended" is scoped to
        // override/merge (spec §4.4) — package patch ordering is preserved.
        ExtensionType::Override | ExtensionType::Merge => {
            for overlay in &doc.patches {
                match out.patches.iter_mut().find(|p| p.name == overlay.name) {
                    Some(existing) => {
                        if let Some(body) = &overlay.body {
                            existing.body = body.clone();
                        }
                        if let Some(target) = &overlay.target {
                            existing.target = target.clone();
                        }
                        if overlay.metadata.is_some() {
                            existing.metadata = overlay.metadata.clone();
                        }
                    }
                    None => out.patches.push(overlay_to_patch(overlay)),
                }
            }
        }
    }

    out
}

fn overlay_to_patch(overlay: &PatchOverlay) -> Patch {
    let mut p = Patch::new(overlay.name.clone(), overlay.body.clone().unwrap_or_default());
    if let Some(target) = &overlay.target {
        p.target = target.clone();
    }
    p.metadata = overlay.metadata.clone();
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KurelMetadata, ResourceMetadata};

    fn def_with_resource(kind: &str, name: &str, object: Value) -> PackageDefinition {
        let mut def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        def.resources.push(Resource::new(
            "v1".to_string(),
            kind.to_string(),
            ResourceMetadata { name: name.to_string(), ..Default::default() },
            object,
        ));
        def
    }

    #[test]
    fn name_wildcard_matches_prefix_and_suffix() {
        assert!(name_matches("web-*", "web-frontend"));
        assert!(name_matches("*-frontend", "web-frontend"));
        assert!(!name_matches("web-*", "api-frontend"));
    }

    #[test]
    fn merge_type_deep_merges_parameters() {
        let mut base = ParameterMap::new();
        let mut nested = std::collections::BTreeMap::new();
        nested.insert("x".to_string(), Value::Int(1));
        nested.insert("y".to_string(), Value::Int(2));
        base.insert("a".to_string(), Value::Map(nested));
        let mut def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        def.parameters = base;

        let mut overlay_nested = std::collections::BTreeMap::new();
        overlay_nested.insert("x".to_string(), Value::Int(99));
        let mut doc = ExtensionDocument::default();
        doc.parameters.insert("a".to_string(), Value::Map(overlay_nested));

        let merged = apply_extension(&def, &doc);
        let a = merged.parameters.get("a").unwrap().as_map().unwrap();
        assert_eq!(a.get("x"), Some(&Value::Int(99)));
        assert_eq!(a.get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn override_type_assigns_field_at_path() {
        let mut object = std::collections::BTreeMap::new();
        object.insert("spec".to_string(), Value::Map(Default::default()));
        let def = def_with_resource("Deployment", "app1", Value::Map(object));

        let doc = ExtensionDocument {
            resources: vec![ResourceOverlay {
                selector: Selector { kind: Some("Deployment".to_string()), ..Default::default() },
                set: vec![("spec.replicas".to_string(), Value::Int(9))],
                ..Default::default()
            }],
            ..Default::default()
        };
        let merged = apply_extension(&def, &doc);
        let path = patch_path::parse("spec.replicas").unwrap();
        assert_eq!(patch_path::get(&merged.resources[0].object, &path), Some(&Value::Int(9)));
    }

    #[test]
    fn global_remove_drops_matching_resources() {
        let def = def_with_resource("ConfigMap", "cm1", Value::Map(Default::default()));
        let doc = ExtensionDocument {
            remove: vec![Selector { kind: Some("ConfigMap".to_string()), ..Default::default() }],
            ..Default::default()
        };
        let merged = apply_extension(&def, &doc);
        assert!(merged.resources.is_empty());
    }

    #[test]
    fn unmatched_patch_overlay_is_appended() {
        let def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        let doc = ExtensionDocument {
            patches: vec![PatchOverlay { name: "extra".to_string(), body: Some("spec.replicas: 3".to_string()), ..Default::default() }],
            ..Default::default()
        };
        let merged = apply_extension(&def, &doc);
        assert_eq!(merged.patches.len(), 1);
        assert_eq!(merged.patches[0].name, "extra");
    }

    #[test]
    fn matched_patch_overlay_updates_body_preserving_order() {
        let mut def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        def.patches.push(Patch::new("first", "spec.replicas: 1"));
        def.patches.push(Patch::new("second", "spec.replicas: 2"));
        let doc = ExtensionDocument {
            patches: vec![PatchOverlay { name: "first".to_string(), body: Some("spec.replicas: 7".to_string()), ..Default::default() }],
            ..Default::default()
        };
        let merged = apply_extension(&def, &doc);
        assert_eq!(merged.patches.len(), 2);
        assert_eq!(merged.patches[0].name, "first");
        assert_eq!(merged.patches[0].body, "spec.replicas: 7");
        assert_eq!(merged.patches[1].name, "second");
    }

    #[test]
    fn replace_type_substitutes_whole_patch_collection() {
        let mut def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        def.patches.push(Patch::new("first", "spec.replicas: 1"));
        def.patches.push(Patch::new("second", "spec.replicas: 2"));
        let doc = ExtensionDocument {
            ext_type: ExtensionType::Replace,
            patches: vec![PatchOverlay { name: "only".to_string(), body: Some("spec.replicas: 9".to_string()), ..Default::default() }],
            ..Default::default()
        };
        let merged = apply_extension(&def, &doc);
        assert_eq!(merged.patches.len(), 1);
        assert_eq!(merged.patches[0].name, "only");
        assert_eq!(merged.patches[0].body, "spec.replicas: 9");
    }

    #[test]
    fn replace_type_with_no_overlay_patches_drops_all_package_patches() {
        let mut def = PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"));
        def.patches.push(Patch::new("first", "spec.replicas: 1"));
        let doc = ExtensionDocument { ext_type: ExtensionType::Replace, ..Default::default() };
        let merged = apply_extension(&def, &doc);
        assert!(merged.patches.is_empty());
    }

    #[test]
    fn parses_full_extension_document() {
        let text = r#"
type: override
parameters:
  replicas: 5
patches:
  - name: extra
    patch: "spec.x: 1"
resources:
  - selector:
      kind: Deployment
      name: "web-*"
    override:
      spec.replicas: 3
remove:
  - kind: ConfigMap
    name: old-cm
"#;
        let doc = parse_extension_document(text).unwrap();
        assert_eq!(doc.ext_type, ExtensionType::Override);
        assert_eq!(doc.parameters.get("replicas"), Some(&Value::Int(5)));
        assert_eq!(doc.patches.len(), 1);
        assert_eq!(doc.resources.len(), 1);
        assert_eq!(doc.resources[0].selector.name.as_deref(), Some("web-*"));
        assert_eq!(doc.remove.len(), 1);
        assert_eq!(doc.remove[0].name.as_deref(), Some("old-cm"));
    }
}
