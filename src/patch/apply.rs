//! Patch application (spec §4.3): applies an already-ordered, already
//! enabled patch list to a deep copy of a package's resources. Either every
//! enabled patch succeeds or the whole build fails with no observable
//! mutation (transactional semantics at the stage boundary) — this holds
//! here because we only ever return the working copy on full success; the
//! caller's original `PackageDefinition` is never touched.

use log::debug;

use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, Result};
use crate::loader::resources::reparse_resolved;
use crate::model::{PackageDefinition, ParameterMap, ParameterMapWithSource};
use crate::patch::{flatten_values, parse_body, substitute_body, FieldOp, OpKind};
use crate::resolver::{substitute_resolved, ResolveOptions};

/// `ApplyPatches` (spec §4.3): applies `ordered` (the output of
/// `resolve_dependencies`) against a deep copy of `def`.
///
/// Patches run after the Resolver but before the Emitter (spec §2), so any
/// resource still carrying raw template bytes (spec §9) is re-materialized
/// against `params` first: field operations need a real decoded object to
/// navigate, and a template's `object` is otherwise an empty placeholder
/// the Emitter would silently discard in favor of `template.raw`.
pub fn apply_patches(
    def: &PackageDefinition,
    ordered: &[String],
    params: &ParameterMapWithSource,
    cancel: Option<&CancellationToken>,
) -> Result<PackageDefinition> {
    let flat = flatten_values(params);
    let mut working = def.deep_copy();
    materialize_templates(&mut working, params)?;

    for name in ordered {
        if let Some(token) = cancel {
            token.check("patch-processor")?;
        }
        let patch = working
            .patch_by_name(name)
            .ok_or_else(|| ErrorKind::Dependency(format!("enabled patch '{}' not found", name)))?
            .clone();

        let substituted = substitute_body(&patch.body, &flat).map_err(|e| patch_error(&patch.name, "", "", &e.to_string()))?;
        let sections = parse_body(&substituted).map_err(|e| patch_error(&patch.name, "", "", &e.to_string()))?;

        for section in &sections {
            let target = section.target.as_deref().unwrap_or(&patch.target);
            for resource in working.resources.iter_mut() {
                if !resource.matches_target(target) {
                    continue;
                }
                for op in &section.ops {
                    apply_op(op, &mut resource.object)
                        .map_err(|reason| patch_error(&patch.name, target, &op.path, &reason))?;
                }
            }
        }
        debug!("applied patch '{}'", patch.name);
    }

    Ok(working)
}

/// Re-parses every still-templated resource (spec §9) against the
/// resolved parameter values, in place, so the rest of the pipeline only
/// ever deals with decoded objects.
fn materialize_templates(def: &mut PackageDefinition, params: &ParameterMapWithSource) -> Result<()> {
    let resolved_plain: ParameterMap = params.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect();
    let resolve_opts = ResolveOptions::default();
    for resource in def.resources.iter_mut() {
        if let Some(template) = resource.template.take() {
            let text = substitute_resolved(&template.raw, &resolved_plain, &resolve_opts)?;
            let source_file = resource.source_file.clone();
            *resource = reparse_resolved(&text, source_file)?;
        }
    }
    Ok(())
}

fn apply_op(op: &FieldOp, root: &mut crate::model::Value) -> std::result::Result<(), String> {
    let segments = crate::patch::path::parse(&op.path).map_err(|e| e.to_string())?;
    match op.op {
        OpKind::Replace => crate::patch::path::set(root, &segments, op.value.clone()).map_err(|e| e.to_string()),
        OpKind::Delete => crate::patch::path::delete(root, &segments).map_err(|e| e.to_string()),
        OpKind::Add => crate::patch::path::add(root, &segments, op.value.clone()).map_err(|e| e.to_string()),
    }
}

fn patch_error(patch: &str, target: &str, path: &str, reason: &str) -> failure::Error {
    ErrorKind::Patch {
        patch: patch.to_string(),
        target: target.to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KurelMetadata, Patch, Resource, ResourceMetadata, Value};
    use std::path::PathBuf;

    fn deployment(name: &str) -> Resource {
        let mut spec = std::collections::BTreeMap::new();
        spec.insert("replicas".to_string(), Value::Int(1));
        let mut object = std::collections::BTreeMap::new();
        object.insert("spec".to_string(), Value::Map(spec));
        Resource::new(
            "apps/v1".into(),
            "Deployment".into(),
            ResourceMetadata { name: name.into(), ..Default::default() },
            Value::Map(object),
        )
    }

    fn base_def() -> PackageDefinition {
        let mut def = PackageDefinition::new(PathBuf::from("."), KurelMetadata::synthesized("demo"));
        def.resources.push(deployment("app1"));
        def.resources.push(deployment("app2"));
        def
    }

    #[test]
    fn scoped_patch_only_touches_matching_resource() {
        let mut def = base_def();
        def.patches.push(Patch::new("scale", "[Deployment.app1]\nspec.replicas: 5\n"));
        let out = apply_patches(&def, &["scale".to_string()], &ParameterMapWithSource::new(), None).unwrap();
        let app1 = out.resources.iter().find(|r| r.metadata.name == "app1").unwrap();
        let app2 = out.resources.iter().find(|r| r.metadata.name == "app2").unwrap();
        assert_eq!(app1.object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas"), Some(&Value::Int(5)));
        assert_eq!(app2.object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas"), Some(&Value::Int(1)));
    }

    #[test]
    fn unscoped_patch_applies_to_all_resources() {
        let mut def = base_def();
        def.patches.push(Patch::new("scale-all", "spec.replicas: 3\n"));
        let out = apply_patches(&def, &["scale-all".to_string()], &ParameterMapWithSource::new(), None).unwrap();
        for r in &out.resources {
            assert_eq!(r.object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas"), Some(&Value::Int(3)));
        }
    }

    #[test]
    fn original_definition_is_unchanged() {
        let mut def = base_def();
        def.patches.push(Patch::new("scale-all", "spec.replicas: 3\n"));
        let before = def.clone();
        let _ = apply_patches(&def, &["scale-all".to_string()], &ParameterMapWithSource::new(), None).unwrap();
        let app1_before = before.resources[0].object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas").cloned();
        let app1_after = def.resources[0].object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas").cloned();
        assert_eq!(app1_before, app1_after);
        assert_eq!(app1_after, Some(Value::Int(1)));
    }

    #[test]
    fn patch_application_failure_is_structured() {
        let mut def = base_def();
        // "replicas[0]" treats a scalar as a list -> navigation failure.
        def.patches.push(Patch::new("bad", "spec.replicas[0]: 1\n"));
        let err = apply_patches(&def, &["bad".to_string()], &ParameterMapWithSource::new(), None).unwrap_err();
        assert!(format!("{}", err).contains("bad"));
    }

    #[test]
    fn template_resource_is_materialized_before_patches_apply() {
        use crate::model::{ParameterSource, Provenance, TemplateData};

        let mut def = PackageDefinition::new(PathBuf::from("."), KurelMetadata::synthesized("demo"));
        let mut templated = Resource::new(
            String::new(),
            "Deployment".into(),
            ResourceMetadata { name: "${app.name}".into(), ..Default::default() },
            Value::Null,
        );
        templated.template = Some(TemplateData {
            raw: "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: ${app.name}\nspec:\n  replicas: 1\n".to_string(),
        });
        def.resources.push(templated);
        def.patches.push(Patch::new("scale", "spec.replicas: 9\n"));

        let mut app = std::collections::BTreeMap::new();
        app.insert("name".to_string(), Value::String("myapp".to_string()));
        let mut params = ParameterMapWithSource::new();
        params.insert("app".to_string(), ParameterSource::new(Value::Map(app), Provenance::Package, None));

        let out = apply_patches(&def, &["scale".to_string()], &params, None).unwrap();
        assert_eq!(out.resources.len(), 1);
        let resource = &out.resources[0];
        assert!(resource.template.is_none());
        assert_eq!(resource.metadata.name, "myapp");
        assert_eq!(
            resource.object.as_map().unwrap().get("spec").unwrap().as_map().unwrap().get("replicas"),
            Some(&Value::Int(9))
        );
    }
}
