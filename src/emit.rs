//! Emitter (spec §2 step 6, §6 `build` surface minus the CLI/output-format
//! wrappers around it): turns a built `PackageInstance`'s resources into the
//! final object stream a caller hands to a YAML/JSON encoder.
//!
//! Three things happen here and nowhere else in the pipeline: re-parsing a
//! `TemplateData` resource now that every `${...}` marker has been
//! substituted (spec §9), filtering by kind/name/namespace, and injecting
//! caller-supplied labels/annotations. Writing the result to stdout, a
//! file, or a directory, and choosing YAML vs. JSON, is the excluded CLI
//! I/O layer (spec §1) — this module only produces the `Resource` list.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::loader::resources::reparse_resolved;
use crate::model::{ParameterMap, Resource, Value};
use crate::resolver::{substitute_resolved, ResolveOptions};

/// Filters and label/annotation injection applied at emission time (spec
/// §6 `build` options). Empty filter vectors mean "no filter on this axis".
#[derive(Clone, Debug, Default)]
pub struct EmitOptions {
    pub kind_filter: Vec<String>,
    pub name_filter: Vec<String>,
    pub namespace_filter: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// The annotation key downstream GitOps tooling reads to partition output
/// into install phases (spec §6, GLOSSARY). The launcher only preserves it.
pub const INSTALL_PHASE_ANNOTATION: &str = "kurel.gokure.dev/install-phase";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallPhase {
    PreInstall,
    Main,
    PostInstall,
}

/// Reads the install-phase annotation without acting on it (spec §6: "The
/// launcher does not act on these; it only preserves them"). Absent or
/// unrecognized values default to `Main`.
pub fn install_phase(resource: &Resource) -> InstallPhase {
    match resource.metadata.annotations.get(INSTALL_PHASE_ANNOTATION).map(String::as_str) {
        Some("pre-install") => InstallPhase::PreInstall,
        Some("post-install") => InstallPhase::PostInstall,
        _ => InstallPhase::Main,
    }
}

/// `Emit` (spec §2 step 6): re-materializes any template resource against
/// `resolved`, applies `opts`' filters, and injects `opts`' labels and
/// annotations. Resource order is preserved from `resources` (itself
/// stabilized by the loader's sorted directory walk, spec §5), so the
/// output is deterministic for fixed inputs.
pub fn emit(resources: &[Resource], resolved: &ParameterMap, resolve_opts: &ResolveOptions, opts: &EmitOptions) -> Result<Vec<Resource>> {
    let mut out = Vec::with_capacity(resources.len());
    for resource in resources {
        let materialized = materialize(resource, resolved, resolve_opts)?;
        if !passes_filters(&materialized, opts) {
            continue;
        }
        out.push(inject(materialized, opts));
    }
    Ok(out)
}

/// Re-parses a template resource once its raw bytes have had every
/// `${...}` reference substituted (spec §9); resources that were already
/// strictly decoded at load time pass through unchanged.
fn materialize(resource: &Resource, resolved: &ParameterMap, resolve_opts: &ResolveOptions) -> Result<Resource> {
    match &resource.template {
        None => Ok(resource.clone()),
        Some(template) => {
            let text = substitute_resolved(&template.raw, resolved, resolve_opts)?;
            reparse_resolved(&text, resource.source_file.clone())
        }
    }
}

fn passes_filters(resource: &Resource, opts: &EmitOptions) -> bool {
    if !opts.kind_filter.is_empty() && !opts.kind_filter.iter().any(|k| resource.kind.eq_ignore_ascii_case(k)) {
        return false;
    }
    if !opts.name_filter.is_empty() && !opts.name_filter.iter().any(|n| n == &resource.metadata.name) {
        return false;
    }
    if !opts.namespace_filter.is_empty() {
        let ns = resource.metadata.namespace.as_deref().unwrap_or("");
        if !opts.namespace_filter.iter().any(|n| n == ns) {
            return false;
        }
    }
    true
}

/// Merges `opts.labels`/`opts.annotations` into both the resource's
/// typed `metadata` and its raw `object` tree (so a caller serializing
/// `object` directly still sees the injected keys), caller's values
/// winning over any pre-existing ones of the same name.
fn inject(mut resource: Resource, opts: &EmitOptions) -> Resource {
    for (k, v) in &opts.labels {
        resource.metadata.labels.insert(k.clone(), v.clone());
    }
    for (k, v) in &opts.annotations {
        resource.metadata.annotations.insert(k.clone(), v.clone());
    }
    set_object_metadata_map(&mut resource.object, "labels", &resource.metadata.labels);
    set_object_metadata_map(&mut resource.object, "annotations", &resource.metadata.annotations);
    resource
}

fn set_object_metadata_map(object: &mut Value, key: &str, values: &BTreeMap<String, String>) {
    if values.is_empty() {
        return;
    }
    let map = match object.as_map_mut() {
        Some(m) => m,
        None => return,
    };
    let metadata = map.entry("metadata".to_string()).or_insert_with(|| Value::Map(Default::default()));
    if metadata.as_map().is_none() {
        *metadata = Value::Map(Default::default());
    }
    let target = metadata.as_map_mut().unwrap().entry(key.to_string()).or_insert_with(|| Value::Map(Default::default()));
    if target.as_map().is_none() {
        *target = Value::Map(Default::default());
    }
    let target_map = target.as_map_mut().unwrap();
    for (k, v) in values {
        target_map.insert(k.clone(), Value::String(v.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceMetadata, TemplateData};

    fn resource(kind: &str, name: &str) -> Resource {
        let mut object = BTreeMap::new();
        object.insert(
            "metadata".to_string(),
            Value::Map(BTreeMap::from([("name".to_string(), Value::String(name.to_string()))])),
        );
        Resource::new("v1".into(), kind.into(), ResourceMetadata { name: name.into(), ..Default::default() }, Value::Map(object))
    }

    #[test]
    fn filters_by_kind() {
        let resources = vec![resource("Deployment", "app"), resource("Service", "svc")];
        let opts = EmitOptions { kind_filter: vec!["Service".to_string()], ..Default::default() };
        let out = emit(&resources, &ParameterMap::new(), &ResolveOptions::default(), &opts).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, "Service");
    }

    #[test]
    fn filters_by_name_and_namespace() {
        let mut r = resource("ConfigMap", "cfg");
        r.metadata.namespace = Some("prod".to_string());
        let resources = vec![r, resource("ConfigMap", "other")];
        let opts = EmitOptions { namespace_filter: vec!["prod".to_string()], ..Default::default() };
        let out = emit(&resources, &ParameterMap::new(), &ResolveOptions::default(), &opts).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.name, "cfg");
    }

    #[test]
    fn injects_labels_into_metadata_and_object() {
        let resources = vec![resource("Service", "svc")];
        let mut labels = BTreeMap::new();
        labels.insert("managed-by".to_string(), "kurel".to_string());
        let opts = EmitOptions { labels, ..Default::default() };
        let out = emit(&resources, &ParameterMap::new(), &ResolveOptions::default(), &opts).unwrap();
        assert_eq!(out[0].metadata.labels.get("managed-by"), Some(&"kurel".to_string()));
        let object_labels = out[0]
            .object
            .as_map()
            .unwrap()
            .get("metadata")
            .unwrap()
            .as_map()
            .unwrap()
            .get("labels")
            .unwrap()
            .as_map()
            .unwrap();
        assert_eq!(object_labels.get("managed-by"), Some(&Value::String("kurel".to_string())));
    }

    #[test]
    fn rematerializes_template_resource_after_substitution() {
        let mut r = resource("Service", "placeholder");
        r.template = Some(TemplateData {
            raw: "apiVersion: v1\nkind: Service\nmetadata:\n  name: ${app.name}-db\n".to_string(),
        });
        let mut app = BTreeMap::new();
        app.insert("name".to_string(), Value::String("myapp".to_string()));
        let mut resolved = ParameterMap::new();
        resolved.insert("app".to_string(), Value::Map(app));

        let out = emit(&[r], &resolved, &ResolveOptions::default(), &EmitOptions::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.name, "myapp-db");
        assert!(out[0].template.is_none());
    }

    #[test]
    fn install_phase_defaults_to_main_and_is_read_verbatim() {
        let mut r = resource("Job", "migrate");
        assert_eq!(install_phase(&r), InstallPhase::Main);
        r.metadata.annotations.insert(INSTALL_PHASE_ANNOTATION.to_string(), "pre-install".to_string());
        assert_eq!(install_phase(&r), InstallPhase::PreInstall);
    }
}
