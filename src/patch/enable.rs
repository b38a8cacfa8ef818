//! Enable-expression evaluation (spec §4.3, §9).
//!
//! The enable-expression language is deliberately restricted to a literal
//! boolean/string or a single `${...}` reference — no `==`/`&&`; richer
//! expressions are an explicit non-goal (spec §9).

use std::collections::BTreeMap;

use crate::error::{ErrorKind, Result};
use crate::model::{Patch, Value};
use crate::varref::whole_ref_re;

/// Whether `patch` is enabled given the flattened values namespace (spec
/// §4.3): a patch without metadata, or without an `enabled` clause, is
/// enabled. An `enabled` string that is a sole `${path}` reference is
/// evaluated via `Value::is_truthy`; any other literal string is evaluated
/// the same way directly (covers bare `"true"`/`"false"` literals).
pub fn is_enabled(patch: &Patch, flat: &BTreeMap<String, Value>) -> Result<bool> {
    let expr = match patch.enabled_expr() {
        Some(e) => e,
        None => return Ok(true),
    };
    let trimmed = expr.trim();
    if let Some(caps) = whole_ref_re().captures(trimmed) {
        let path = caps.get(1).unwrap().as_str();
        let value = flat
            .get(path)
            .ok_or_else(|| ErrorKind::UndefinedVariable(path.to_string()))?;
        return Ok(value.is_truthy());
    }
    Ok(Value::String(trimmed.to_string()).is_truthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatchMetadata;

    fn patch_with_enabled(expr: &str) -> Patch {
        let mut p = Patch::new("p", "");
        p.metadata = Some(PatchMetadata { enabled: Some(expr.to_string()), ..Default::default() });
        p
    }

    #[test]
    fn absent_metadata_is_enabled() {
        let p = Patch::new("p", "");
        assert!(is_enabled(&p, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn variable_reference_evaluated_by_truthiness() {
        let p = patch_with_enabled("${feature.x}");
        let mut flat = BTreeMap::new();
        flat.insert("feature.x".to_string(), Value::Bool(true));
        assert!(is_enabled(&p, &flat).unwrap());
        flat.insert("feature.x".to_string(), Value::Bool(false));
        assert!(!is_enabled(&p, &flat).unwrap());
    }

    #[test]
    fn literal_false_string_disables() {
        let p = patch_with_enabled("false");
        assert!(!is_enabled(&p, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn undefined_reference_errors() {
        let p = patch_with_enabled("${missing}");
        let err = is_enabled(&p, &BTreeMap::new()).unwrap_err();
        assert!(format!("{}", err).contains("missing"));
    }
}
