//! Resource discovery and decoding (spec §4.1 step 4, §9 "Template
//! resources").
//!
//! Decoding is "strict" in the sense that any value anywhere in the tree
//! still containing an unresolved `${...}` marker is treated as
//! undecodable: a real Kubernetes object decoder would reject the type
//! mismatches that kind of string interpolation produces (e.g. a numeric
//! field holding `"${replicas}"`), so the loader can't tell such a file
//! apart from one the decoder would genuinely reject. Those files fall
//! back to the raw-bytes template path instead of failing outright.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, Result};
use crate::issues::IssueList;
use crate::model::{Resource, ResourceMetadata, TemplateData, Value};

const RESERVED_ROOT_FILES: &[&str] = &["kurel.yaml", "parameters.yaml"];

fn is_resource_file(path: &Path, root: &Path) -> bool {
    let ext_ok = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
    if !ext_ok {
        return false;
    }
    let rel = path.strip_prefix(root).unwrap_or(path);
    if rel.components().any(|c| c.as_os_str() == "patches") {
        return false;
    }
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if rel.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true) && RESERVED_ROOT_FILES.contains(&file_name) {
        return false;
    }
    if file_name.ends_with(".local.kurel") || file_name.ends_with(".local.yaml") {
        return false;
    }
    true
}

/// Walks `root` for resource files (spec §4.1 step 4), decoding each one.
/// Per-file decode failures are non-fatal: the file is kept as a
/// `TemplateData` resource instead (spec §9), never dropped, so later
/// stages still see and can patch/emit it. `max_resources` enforces the
/// size cap from spec §5; exceeding it is fatal (spec §7 `Size`).
pub fn walk_resources(root: &Path, cancel: Option<&CancellationToken>, max_resources: usize) -> Result<(Vec<Resource>, IssueList)> {
    let mut issues = IssueList::new();
    let mut files: Vec<PathBuf> = Vec::new();

    #[cfg(feature = "filesystem")]
    {
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && is_resource_file(path, root) {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();

    if files.len() > max_resources {
        return Err(ErrorKind::Size(format!("{} resource files exceeds cap of {}", files.len(), max_resources)).into());
    }

    let mut resources = Vec::with_capacity(files.len());
    for path in files {
        if let Some(token) = cancel {
            token.check("loader")?;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => {
                issues.record(ErrorKind::File(path.clone()), Some(path.clone()));
                continue;
            }
        };
        match decode_resource(&text, Some(path.clone())) {
            Ok(resource) => resources.push(resource),
            Err(reason) => {
                issues.record(ErrorKind::Parse(path.clone(), reason), Some(path.clone()));
                resources.push(template_fallback(&text, path));
            }
        }
    }

    Ok((resources, issues))
}

fn contains_template_marker(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains("${"),
        Value::List(items) => items.iter().any(contains_template_marker),
        Value::Map(map) => map.values().any(contains_template_marker),
        _ => false,
    }
}

/// Re-decodes a resource's raw text after variable substitution (spec §9
/// "Template resources"): the emitter's counterpart to the loader's initial
/// decode attempt, used once a `TemplateData` resource's `${...}` markers
/// have all been replaced. Any decode failure at this point is a genuine
/// error, not a reason to fall back to the template path again.
pub fn reparse_resolved(text: &str, source_file: Option<PathBuf>) -> Result<Resource> {
    decode_resource(text, source_file).map_err(|reason| {
        ErrorKind::Parse(PathBuf::from("<resolved template>"), reason).into()
    })
}

/// Attempts a typed decode of a single resource file. `Err` carries the
/// human-readable reason the loader falls back to the template path for.
fn decode_resource(text: &str, source_file: Option<PathBuf>) -> std::result::Result<Resource, String> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let value = Value::from_yaml(&yaml);
    if contains_template_marker(&value) {
        return Err("contains unresolved ${...} template markers".to_string());
    }
    let map = value.as_map().ok_or_else(|| "not a mapping".to_string())?;
    let api_version = map.get("apiVersion").and_then(Value::as_str).ok_or("missing apiVersion")?.to_string();
    let kind = map.get("kind").and_then(Value::as_str).ok_or("missing kind")?.to_string();
    let metadata_map = map.get("metadata").and_then(Value::as_map).ok_or("missing metadata")?;
    let name = metadata_map.get("name").and_then(Value::as_str).ok_or("missing metadata.name")?.to_string();
    let namespace = metadata_map.get("namespace").and_then(Value::as_str).map(str::to_string);
    let labels = string_map(metadata_map.get("labels"));
    let annotations = string_map(metadata_map.get("annotations"));

    let mut resource = Resource::new(api_version, kind, ResourceMetadata { name, namespace, labels, annotations }, value);
    resource.source_file = source_file;
    Ok(resource)
}

fn string_map(value: Option<&Value>) -> std::collections::BTreeMap<String, String> {
    value
        .and_then(Value::as_map)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.to_canonical_string())).collect())
        .unwrap_or_default()
}

fn field_re(field: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{}:\s*(.+?)\s*$", regex::escape(field))).unwrap()
}

fn extract_field(text: &str, field: &str) -> Option<String> {
    field_re(field)
        .captures(text)
        .map(|c| c.get(1).unwrap().as_str().trim_matches(|c| c == '"' || c == '\'').to_string())
}

/// Tolerant regex extraction of `apiVersion`/`kind`/`name`/`namespace` from
/// a file the strict decoder rejected (spec §4.1 step 4, §9): the file is
/// assumed to be a template, and its raw bytes are kept for the emitter to
/// re-parse once variables are resolved.
fn template_fallback(text: &str, source_file: PathBuf) -> Resource {
    let api_version = extract_field(text, "apiVersion").unwrap_or_default();
    let kind = extract_field(text, "kind").unwrap_or_default();
    let name = extract_field(text, "name").unwrap_or_default();
    let namespace = extract_field(text, "namespace");

    let mut resource = Resource::new(
        api_version,
        kind,
        ResourceMetadata { name, namespace, labels: Default::default(), annotations: Default::default() },
        Value::Null,
    );
    resource.template = Some(TemplateData { raw: text.to_string() });
    resource.source_file = Some(source_file);
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn decodes_well_formed_resource() {
        let text = "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n  namespace: prod\nspec:\n  ports: []\n";
        let r = decode_resource(text, None).unwrap();
        assert_eq!(r.kind, "Service");
        assert_eq!(r.metadata.name, "svc");
        assert_eq!(r.metadata.namespace.as_deref(), Some("prod"));
        assert!(r.template.is_none());
    }

    #[test]
    fn falls_back_to_template_for_parameterized_name() {
        let text = "apiVersion: v1\nkind: Service\nmetadata:\n  name: ${kurel.name}-db\n";
        assert!(decode_resource(text, None).is_err());
        let resource = template_fallback(text, PathBuf::from("svc.yaml"));
        assert_eq!(resource.kind, "Service");
        assert_eq!(resource.metadata.name, "${kurel.name}-db");
        assert!(resource.template.is_some());
    }

    #[test]
    fn walks_root_skipping_patches_and_reserved_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("kurel.yaml"), "name: demo\n").unwrap();
        std::fs::write(dir.path().join("parameters.yaml"), "replicas: 1\n").unwrap();
        std::fs::write(
            dir.path().join("deploy.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\n",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("patches")).unwrap();
        std::fs::write(dir.path().join("patches").join("ignored.yaml"), "enabled: true\n").unwrap();

        let (resources, issues) = walk_resources(dir.path(), None, 1000).unwrap();
        assert!(issues.is_empty());
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].metadata.name, "app");
    }

    #[test]
    fn exceeding_resource_cap_is_fatal() {
        let dir = tempdir().unwrap();
        for i in 0..3 {
            std::fs::write(
                dir.path().join(format!("r{}.yaml", i)),
                format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm{}\n", i),
            )
            .unwrap();
        }
        assert!(walk_resources(dir.path(), None, 2).is_err());
    }
}
