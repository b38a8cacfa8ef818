//! Patch discovery (spec §4.1 step 5, §6).
//!
//! Patch files come in three textual shapes that all end up as the same
//! `Patch { body: String, .. }` the processor lazily parses later
//! (spec §3 "body parsed lazily"):
//!
//! - `*.kpatch` / `*.patch`: the field-operation DSL directly, with
//!   optional `# kurel:<key>: <value>` metadata header lines.
//! - `*.toml`: a structured document with top-level metadata keys plus an
//!   `[[op]]` array of `{path, op, value}` tables, re-rendered into the
//!   same textual DSL so the processor has one body format to parse.
//! - `*.yaml` / `*.yml`: when a body file (`.kpatch`/`.patch`/`.toml`)
//!   shares its stem, the YAML file is sidecar *metadata only* (spec §6).
//!   When a `.yaml`/`.yml` file is the *only* file for its stem, it is a
//!   standalone patch: a mapping with optional `target`, a `patch` string
//!   holding the DSL body text, and the usual metadata keys alongside.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::error::ErrorKind;
use crate::issues::IssueList;
use crate::model::{Patch, PatchMetadata, Value};
use crate::patch::parse_inline_metadata;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum Kind {
    Kpatch,
    Toml,
    Yaml,
}

fn classify(path: &Path) -> Option<Kind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("kpatch") | Some("patch") => Some(Kind::Kpatch),
        Some("toml") => Some(Kind::Toml),
        Some("yaml") | Some("yml") => Some(Kind::Yaml),
        _ => None,
    }
}

fn stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

/// Walks `patches/` under `root` and loads every patch (spec §4.1 step 5).
/// Duplicate patch names are recorded as a non-fatal dependency issue; the
/// first occurrence (in sorted path order) wins (spec §4.1 step 6).
pub fn walk_patches(root: &Path, cancel: Option<&CancellationToken>) -> (Vec<Patch>, IssueList) {
    let mut issues = IssueList::new();
    let patches_dir = root.join("patches");
    if !patches_dir.exists() {
        return (Vec::new(), issues);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    #[cfg(feature = "filesystem")]
    {
        for entry in walkdir::WalkDir::new(&patches_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && classify(path).is_some() {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();

    // Group by (directory, stem) so a `.yaml` sidecar pairs with its body
    // file without merging same-named patches that live in different
    // subdirectories — those must still be detected as name duplicates.
    let mut by_group: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();
    for f in files {
        let dir = f.parent().map(Path::to_path_buf).unwrap_or_default();
        by_group.entry((dir, stem(&f))).or_default().push(f);
    }

    let mut patches = Vec::new();
    let mut seen_names = std::collections::BTreeSet::new();

    for ((_, name), group) in by_group {
        if let Some(token) = cancel {
            if token.check("loader").is_err() {
                break;
            }
        }
        let body_file = group.iter().find(|p| matches!(classify(p), Some(Kind::Kpatch)))
            .or_else(|| group.iter().find(|p| matches!(classify(p), Some(Kind::Toml))));
        let sidecar_file = group.iter().find(|p| matches!(classify(p), Some(Kind::Yaml)));

        let patch = match (body_file, sidecar_file) {
            (Some(body_path), sidecar) => load_body_patch(&name, body_path, sidecar.map(PathBuf::as_path), &mut issues),
            (None, Some(yaml_path)) => load_standalone_yaml_patch(&name, yaml_path, &mut issues),
            (None, None) => continue,
        };

        let patch = match patch {
            Some(p) => p,
            None => continue,
        };
        if !seen_names.insert(patch.name.clone()) {
            issues.record(ErrorKind::Dependency(format!("duplicate patch name '{}'", patch.name)), patch.source_file.clone());
            continue;
        }
        patches.push(patch);
    }

    (patches, issues)
}

fn read(path: &Path, issues: &mut IssueList) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(t) => Some(t),
        Err(_) => {
            issues.record(ErrorKind::File(path.to_path_buf()), Some(path.to_path_buf()));
            None
        }
    }
}

fn load_body_patch(name: &str, body_path: &Path, sidecar_path: Option<&Path>, issues: &mut IssueList) -> Option<Patch> {
    let body = match classify(body_path) {
        Some(Kind::Kpatch) => read(body_path, issues)?,
        Some(Kind::Toml) => {
            let text = read(body_path, issues)?;
            match toml_to_body(&text) {
                Ok(body) => body,
                Err(reason) => {
                    issues.record(ErrorKind::Parse(body_path.to_path_buf(), reason), Some(body_path.to_path_buf()));
                    return None;
                }
            }
        }
        _ => unreachable!("body_path classified as Kpatch or Toml by construction"),
    };

    let inline = parse_inline_metadata(&body);
    let mut metadata = PatchMetadata {
        enabled: inline.enabled,
        description: inline.description,
        requires: inline.requires,
        conflicts: inline.conflicts,
    };

    if let Some(sidecar) = sidecar_path {
        let text = read(sidecar, issues)?;
        match serde_yaml::from_str::<PatchMetadata>(&text) {
            Ok(sidecar_meta) => metadata = sidecar_meta,
            Err(e) => {
                issues.record(ErrorKind::Parse(sidecar.to_path_buf(), e.to_string()), Some(sidecar.to_path_buf()));
            }
        }
    }

    let mut patch = Patch::new(name, body);
    patch.metadata = Some(metadata);
    patch.source_file = Some(body_path.to_path_buf());
    Some(patch)
}

fn load_standalone_yaml_patch(name: &str, path: &Path, issues: &mut IssueList) -> Option<Patch> {
    let text = read(path, issues)?;
    let doc: serde_yaml::Value = match serde_yaml::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            issues.record(ErrorKind::Parse(path.to_path_buf(), e.to_string()), Some(path.to_path_buf()));
            return None;
        }
    };
    let value = Value::from_yaml(&doc);
    let map = match value.as_map() {
        Some(m) => m,
        None => {
            issues.record(ErrorKind::Parse(path.to_path_buf(), "standalone patch must be a mapping".to_string()), Some(path.to_path_buf()));
            return None;
        }
    };

    let body = map.get("patch").and_then(Value::as_str).unwrap_or("").to_string();
    let target = map.get("target").and_then(Value::as_str).unwrap_or("").to_string();
    let metadata = PatchMetadata {
        enabled: map.get("enabled").map(|v| v.to_canonical_string()),
        description: map.get("description").map(|v| v.to_canonical_string()),
        requires: string_list(map.get("requires")),
        conflicts: string_list(map.get("conflicts")),
    };

    let mut patch = Patch::new(name, body);
    patch.target = target;
    patch.metadata = Some(metadata);
    patch.source_file = Some(path.to_path_buf());
    Some(patch)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value.and_then(Value::as_list).map(|l| l.iter().map(Value::to_canonical_string).collect()).unwrap_or_default()
}

/// Re-renders a TOML patch document's `[[op]]` tables into the same
/// `path: value` / `delete path` textual DSL `.kpatch` files use, plus an
/// optional leading `[target]` header, so the rest of the pipeline only
/// ever deals with one body grammar.
fn toml_to_body(text: &str) -> std::result::Result<String, String> {
    let doc: toml::Value = text.parse().map_err(|e: toml::de::Error| e.to_string())?;
    let table = doc.as_table().ok_or("TOML patch must be a table")?;

    let mut out = String::new();
    if let Some(target) = table.get("target").and_then(toml::Value::as_str) {
        out.push_str(&format!("[{}]\n", target));
    }
    let ops = table.get("op").and_then(toml::Value::as_array).cloned().unwrap_or_default();
    for op in ops {
        let op_table = op.as_table().ok_or("each [[op]] entry must be a table")?;
        let path = op_table.get("path").and_then(toml::Value::as_str).ok_or("op entry missing 'path'")?;
        let kind = op_table.get("op").and_then(toml::Value::as_str).unwrap_or("replace");
        if kind == "delete" {
            out.push_str(&format!("delete {}\n", path));
            continue;
        }
        let value = op_table.get("value").cloned().unwrap_or(toml::Value::Boolean(false));
        let rendered = serde_yaml::to_string(&Value::from_toml(&value).to_yaml()).unwrap_or_default();
        let rendered = rendered.trim_end_matches('\n').trim_start_matches("---").trim();
        let prefix = if kind == "add" { "add " } else { "" };
        out.push_str(&format!("{}{}: {}\n", prefix, path, rendered));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_kpatch_with_inline_metadata() {
        let dir = tempdir().unwrap();
        let patches = dir.path().join("patches");
        std::fs::create_dir(&patches).unwrap();
        std::fs::write(
            patches.join("scale.kpatch"),
            "# kurel:enabled: true\n# kurel:requires: base\nspec.replicas: 3\n",
        )
        .unwrap();
        let (loaded, issues) = walk_patches(dir.path(), None);
        assert!(issues.is_empty());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "scale");
        assert_eq!(loaded[0].requires(), &["base".to_string()]);
    }

    #[test]
    fn sidecar_yaml_overrides_inline_metadata() {
        let dir = tempdir().unwrap();
        let patches = dir.path().join("patches");
        std::fs::create_dir(&patches).unwrap();
        std::fs::write(patches.join("scale.kpatch"), "# kurel:enabled: true\nspec.replicas: 3\n").unwrap();
        std::fs::write(patches.join("scale.yaml"), "enabled: false\ndescription: scales the deployment\n").unwrap();
        let (loaded, _) = walk_patches(dir.path(), None);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].enabled_expr(), Some("false"));
        assert_eq!(loaded[0].metadata.as_ref().unwrap().description.as_deref(), Some("scales the deployment"));
    }

    #[test]
    fn standalone_yaml_patch_supplies_its_own_body() {
        let dir = tempdir().unwrap();
        let patches = dir.path().join("patches");
        std::fs::create_dir(&patches).unwrap();
        std::fs::write(
            patches.join("extra.yaml"),
            "target: Deployment.app1\npatch: |\n  spec.replicas: 7\nrequires: [base]\n",
        )
        .unwrap();
        let (loaded, issues) = walk_patches(dir.path(), None);
        assert!(issues.is_empty());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].target, "Deployment.app1");
        assert!(loaded[0].body.contains("spec.replicas: 7"));
        assert_eq!(loaded[0].requires(), &["base".to_string()]);
    }

    #[test]
    fn duplicate_patch_names_are_non_fatal_issues() {
        let dir = tempdir().unwrap();
        let patches = dir.path().join("patches");
        let nested = patches.join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(patches.join("dup.kpatch"), "spec.replicas: 1\n").unwrap();
        std::fs::write(nested.join("dup.kpatch"), "spec.replicas: 2\n").unwrap();
        let (loaded, issues) = walk_patches(dir.path(), None);
        assert_eq!(loaded.len(), 1);
        assert!(!issues.is_empty());
        assert!(!issues.has_critical());
    }

    #[test]
    fn toml_patch_renders_ops_into_text_body() {
        let dir = tempdir().unwrap();
        let patches = dir.path().join("patches");
        std::fs::create_dir(&patches).unwrap();
        std::fs::write(
            patches.join("ports.toml"),
            "target = \"Service.web\"\n[[op]]\npath = \"spec.port\"\nvalue = 8080\n[[op]]\npath = \"metadata.labels.temp\"\nop = \"delete\"\n",
        )
        .unwrap();
        let (loaded, issues) = walk_patches(dir.path(), None);
        assert!(issues.is_empty());
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].body.contains("[Service.web]"));
        assert!(loaded[0].body.contains("spec.port: 8080"));
        assert!(loaded[0].body.contains("delete metadata.labels.temp"));
    }
}
