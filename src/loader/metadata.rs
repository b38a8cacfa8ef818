//! `kurel.yaml` / `parameters.yaml` loading (spec §4.1 steps 2-3).

use std::path::Path;

use crate::error::{ErrorKind, Result};
use crate::issues::IssueList;
use crate::model::{KurelMetadata, ParameterMap, Value};

/// Loads `kurel.yaml` if present; otherwise synthesizes metadata with
/// `name=basename(root)`, `version="0.0.0"` (spec §4.1 step 2). A malformed
/// `kurel.yaml` is fatal (spec §7: "parse/file errors on the root metadata
/// file").
pub fn load_metadata(root: &Path) -> Result<KurelMetadata> {
    let path = root.join("kurel.yaml");
    if !path.exists() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "package".to_string());
        return Ok(KurelMetadata::synthesized(name));
    }
    let text = std::fs::read_to_string(&path).map_err(|_| ErrorKind::File(path.clone()))?;
    let meta: KurelMetadata =
        serde_yaml::from_str(&text).map_err(|e| ErrorKind::Parse(path.clone(), e.to_string()))?;
    meta.verify()?;
    Ok(meta)
}

/// Loads `parameters.yaml` if present (spec §4.1 step 3). A malformed file
/// is non-fatal: the issue is recorded and an empty map is returned so the
/// load can continue (spec §7: best-effort for non-critical files).
pub fn load_parameters(root: &Path) -> (ParameterMap, IssueList) {
    let mut issues = IssueList::new();
    let path = root.join("parameters.yaml");
    if !path.exists() {
        return (ParameterMap::new(), issues);
    }
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => {
            issues.record(ErrorKind::File(path.clone()), Some(path));
            return (ParameterMap::new(), issues);
        }
    };
    match serde_yaml::from_str::<serde_yaml::Value>(&text) {
        Ok(yaml) => match Value::from_yaml(&yaml) {
            Value::Map(map) => (map, issues),
            _ => {
                issues.record(ErrorKind::Parse(path.clone(), "parameters.yaml must be a mapping".to_string()), Some(path));
                (ParameterMap::new(), issues)
            }
        },
        Err(e) => {
            issues.record(ErrorKind::Parse(path.clone(), e.to_string()), Some(path));
            (ParameterMap::new(), issues)
        }
    }
}
