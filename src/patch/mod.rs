//! Patch Processor (spec §4.3): selects patches by boolean conditions,
//! resolves `requires`/`conflicts`, topologically orders them, and applies
//! them to a deep-copied resource set.

pub mod apply;
pub mod dependency;
pub mod enable;
pub mod path;

use std::collections::BTreeMap;

use crate::error::{ErrorKind, Result};
use crate::model::{ParameterMapWithSource, Value};
use crate::varref::{partial_ref_re, whole_ref_re};

pub use apply::apply_patches;
pub use dependency::{debug_patch_graph, resolve_dependencies, PatchGraph};

/// One field operation parsed out of a patch body (spec §3, §4.3).
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    Replace,
    Delete,
    Add,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldOp {
    pub path: String,
    pub op: OpKind,
    pub value: Value,
}

/// A `[Kind.name]`-scoped run of field operations. A body with no header
/// line at all produces a single section with `target: None`, meaning "use
/// the patch's own `target`" (spec §4.3, §6).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchSection {
    pub target: Option<String>,
    pub ops: Vec<FieldOp>,
}

fn header_re() -> regex::Regex {
    regex::Regex::new(r"^\[(.+)\]$").unwrap()
}

fn kurel_header_re() -> regex::Regex {
    regex::Regex::new(r"^#\s*kurel:(\w+):\s*(.*)$").unwrap()
}

/// Parsed sidecar/inline metadata lines, keyed by recognized key (spec
/// §4.1 step 5: `{enabled, description, requires, conflicts}`).
#[derive(Clone, Debug, Default)]
pub struct ParsedHeaderMetadata {
    pub enabled: Option<String>,
    pub description: Option<String>,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Extracts any leading `# kurel:<key>: <value>` comment lines from a patch
/// body (spec §4.1 step 5). Scanning stops at the first non-comment,
/// non-blank line.
pub fn parse_inline_metadata(text: &str) -> ParsedHeaderMetadata {
    let mut meta = ParsedHeaderMetadata::default();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = kurel_header_re().captures(trimmed) {
            let key = caps.get(1).unwrap().as_str();
            let value = caps.get(2).unwrap().as_str().trim().to_string();
            match key {
                "enabled" => meta.enabled = Some(value),
                "description" => meta.description = Some(value),
                "requires" => meta.requires = value.split_whitespace().map(str::to_string).collect(),
                "conflicts" => meta.conflicts = value.split_whitespace().map(str::to_string).collect(),
                _ => {}
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        break;
    }
    meta
}

/// Parses a patch body into one or more `[Kind.name]`-scoped sections of
/// field operations (spec §4.3, §6). Each non-header, non-comment,
/// non-blank line is `[<op> ]path: value`, where `<op>` is an optional
/// leading `delete`/`add`/`replace` keyword (default `replace`) and `value`
/// is parsed as YAML (so scalars, flow lists/maps, etc. all work). `delete`
/// lines need no value.
pub fn parse_body(text: &str) -> Result<Vec<PatchSection>> {
    let mut sections = vec![PatchSection::default()];
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = header_re().captures(line) {
            sections.push(PatchSection { target: Some(caps.get(1).unwrap().as_str().to_string()), ops: Vec::new() });
            continue;
        }
        let op = parse_op_line(line)?;
        sections.last_mut().unwrap().ops.push(op);
    }
    Ok(sections.into_iter().filter(|s| !s.ops.is_empty() || s.target.is_some()).collect())
}

fn parse_op_line(line: &str) -> Result<FieldOp> {
    let (kind, rest) = if let Some(r) = line.strip_prefix("delete ") {
        (OpKind::Delete, r)
    } else if let Some(r) = line.strip_prefix("add ") {
        (OpKind::Add, r)
    } else if let Some(r) = line.strip_prefix("replace ") {
        (OpKind::Replace, r)
    } else {
        (OpKind::Replace, line)
    };

    match kind {
        OpKind::Delete => {
            let path = rest.split(':').next().unwrap_or(rest).trim().to_string();
            Ok(FieldOp { path, op: OpKind::Delete, value: Value::Null })
        }
        _ => {
            let (path, value_text) = rest.split_once(':').ok_or_else(|| ErrorKind::Patch {
                patch: String::new(),
                target: String::new(),
                path: rest.to_string(),
                reason: "expected 'path: value'".to_string(),
            })?;
            let yaml: serde_yaml::Value = serde_yaml::from_str(value_text.trim())
                .unwrap_or_else(|_| serde_yaml::Value::String(value_text.trim().to_string()));
            Ok(FieldOp { path: path.trim().to_string(), op: kind, value: Value::from_yaml(&yaml) })
        }
    }
}

/// Flattens resolved parameters into the dotted "values" namespace used for
/// patch-body substitution (spec §4.3): `app.name`, `items[0]`, etc. Keys
/// under `feature.*` are additionally mirrored under `features.*` (spec
/// §4.3 "mirrored into a parallel features map").
pub fn flatten_values(params: &ParameterMapWithSource) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    for (key, source) in params {
        flatten_into(key, &source.value, &mut flat);
    }
    let mirrored: Vec<(String, Value)> = flat
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("feature.").map(|rest| (format!("features.{}", rest), v.clone())))
        .collect();
    flat.extend(mirrored);
    flat
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    out.insert(prefix.to_string(), value.clone());
    match value {
        Value::Map(map) => {
            for (k, v) in map {
                flatten_into(&format!("{}.{}", prefix, k), v, out);
            }
        }
        Value::List(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&format!("{}[{}]", prefix, i), v, out);
            }
        }
        _ => {}
    }
}

/// Substitutes every `${...}` reference in a raw patch body against the
/// flattened values namespace, *before* the body grammar is parsed (spec
/// §4.3: "All variable substitution inside a patch body happens before
/// parsing"). A line whose value is a single whole `${path}` reference is
/// substituted with a JSON rendering of the value (valid YAML flow syntax,
/// and the only way to keep lists/maps on one line in this line-oriented
/// grammar); any other occurrence is substituted as the value's canonical
/// string form.
pub fn substitute_body(text: &str, flat: &BTreeMap<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(&substitute_line(line, flat)?);
        out.push('\n');
    }
    Ok(out)
}

fn substitute_line(line: &str, flat: &BTreeMap<String, Value>) -> Result<String> {
    if let Some(idx) = line.find(':') {
        let (prefix, rest) = line.split_at(idx);
        let value_part = &rest[1..];
        if let Some(caps) = whole_ref_re().captures(value_part.trim()) {
            let path = caps.get(1).unwrap().as_str();
            let value = lookup(flat, path)?;
            let rendered = serde_json::to_string(&value.to_json()).unwrap_or_default();
            return Ok(format!("{}: {}", prefix, rendered));
        }
    }

    let matches: Vec<(usize, usize, String)> = partial_ref_re()
        .captures_iter(line)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.start(), m.end(), c.get(1).unwrap().as_str().to_string())
        })
        .collect();
    if matches.is_empty() {
        return Ok(line.to_string());
    }

    let mut out = String::new();
    let mut last = 0;
    for (start, end, path) in matches {
        out.push_str(&line[last..start]);
        let value = lookup(flat, &path)?;
        out.push_str(&value.to_canonical_string());
        last = end;
    }
    out.push_str(&line[last..]);
    Ok(out)
}

fn lookup(flat: &BTreeMap<String, Value>, path: &str) -> Result<Value> {
    flat.get(path).cloned().ok_or_else(|| ErrorKind::UndefinedVariable(path.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_ops_with_default_section() {
        let body = "spec.replicas: 5\ndelete metadata.labels.temp\n";
        let sections = parse_body(body).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].target, None);
        assert_eq!(sections[0].ops.len(), 2);
        assert_eq!(sections[0].ops[0], FieldOp { path: "spec.replicas".into(), op: OpKind::Replace, value: Value::Int(5) });
        assert_eq!(sections[0].ops[1].op, OpKind::Delete);
    }

    #[test]
    fn scoped_sections_split_on_header() {
        let body = "[Deployment.app1]\nspec.replicas: 5\n[Deployment.app2]\nspec.replicas: 1\n";
        let sections = parse_body(body).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].target.as_deref(), Some("Deployment.app1"));
        assert_eq!(sections[1].target.as_deref(), Some("Deployment.app2"));
    }

    #[test]
    fn add_op_parses_list_value() {
        let body = "add spec.tags: [a, b]\n";
        let sections = parse_body(body).unwrap();
        assert_eq!(sections[0].ops[0].op, OpKind::Add);
        assert_eq!(sections[0].ops[0].value, Value::List(vec![Value::String("a".into()), Value::String("b".into())]));
    }

    #[test]
    fn inline_metadata_headers_parse_requires_and_conflicts() {
        let body = "# kurel:enabled: ${feature.x}\n# kurel:requires: base other\nspec.replicas: 2\n";
        let meta = parse_inline_metadata(body);
        assert_eq!(meta.enabled.as_deref(), Some("${feature.x}"));
        assert_eq!(meta.requires, vec!["base".to_string(), "other".to_string()]);
    }

    #[test]
    fn flatten_mirrors_feature_prefix() {
        let mut params = ParameterMapWithSource::new();
        let mut feature = std::collections::BTreeMap::new();
        feature.insert("enabled".to_string(), Value::Bool(true));
        params.insert(
            "feature".to_string(),
            crate::model::ParameterSource::new(Value::Map(feature), crate::model::Provenance::Package, None),
        );
        let flat = flatten_values(&params);
        assert_eq!(flat.get("feature.enabled"), Some(&Value::Bool(true)));
        assert_eq!(flat.get("features.enabled"), Some(&Value::Bool(true)));
    }

    #[test]
    fn substitute_whole_list_reference_inline() {
        let mut flat = BTreeMap::new();
        flat.insert("tags".to_string(), Value::List(vec![Value::String("a".into()), Value::String("b".into())]));
        let out = substitute_body("spec.tags: ${tags}\n", &flat).unwrap();
        assert_eq!(out.trim(), r#"spec.tags: ["a","b"]"#);
    }

    #[test]
    fn substitute_partial_reference_stringifies() {
        let mut flat = BTreeMap::new();
        flat.insert("name".to_string(), Value::String("myapp".into()));
        let out = substitute_body("metadata.name: ${name}-db\n", &flat).unwrap();
        assert_eq!(out.trim(), "metadata.name: myapp-db");
    }

    #[test]
    fn substitute_undefined_reference_errors() {
        let flat = BTreeMap::new();
        let err = substitute_body("spec.replicas: ${missing}\n", &flat).unwrap_err();
        assert!(format!("{}", err).contains("missing"));
    }
}
