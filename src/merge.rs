//! Merge helpers shared by the resolver and extension merger.
//!
//! Spec §9's open question preserves two distinct merge policies on
//! purpose: the resolver's merge of user values over package parameters is
//! *shallow* at the top level (`shallow_merge`); the extension merger's
//! merge of an overlay document is a recursive *deep* merge
//! (`deep_merge`). Do not unify them.

use crate::model::value::Value;
use crate::model::ParameterMap;

/// Shallow merge: a top-level key present in `overrides` replaces the one
/// in `base` wholesale, with no recursion into nested maps (spec §4.2).
pub fn shallow_merge(base: &ParameterMap, overrides: &ParameterMap) -> ParameterMap {
    let mut merged = base.clone();
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Deep merge: nested maps are merged key-by-key recursively; any other
/// pairing (scalar/list on either side) replaces `base`'s value outright
/// (spec §4.4 "merge" extension type).
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Map(b), Value::Map(o)) => {
            let mut merged = b.clone();
            for (k, v) in o {
                match merged.get(k) {
                    Some(existing) => {
                        let new_v = deep_merge(existing, v);
                        merged.insert(k.clone(), new_v);
                    }
                    None => {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
            Value::Map(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

pub fn deep_merge_maps(base: &ParameterMap, overlay: &ParameterMap) -> ParameterMap {
    let base_v = Value::Map(base.clone());
    let overlay_v = Value::Map(overlay.clone());
    match deep_merge(&base_v, &overlay_v) {
        Value::Map(m) => m,
        _ => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, Value)]) -> ParameterMap {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    #[test]
    fn shallow_merge_replaces_whole_nested_map() {
        let mut nested = BTreeMap::new();
        nested.insert("x".to_string(), Value::Int(1));
        nested.insert("y".to_string(), Value::Int(2));
        let base = map(&[("a", Value::Map(nested))]);

        let mut override_nested = BTreeMap::new();
        override_nested.insert("x".to_string(), Value::Int(99));
        let overrides = map(&[("a", Value::Map(override_nested))]);

        let merged = shallow_merge(&base, &overrides);
        let a = merged.get("a").unwrap().as_map().unwrap();
        assert_eq!(a.get("x"), Some(&Value::Int(99)));
        assert_eq!(a.get("y"), None, "shallow merge must not preserve sibling keys");
    }

    #[test]
    fn deep_merge_preserves_sibling_keys() {
        let mut nested = BTreeMap::new();
        nested.insert("x".to_string(), Value::Int(1));
        nested.insert("y".to_string(), Value::Int(2));
        let base = map(&[("a", Value::Map(nested))]);

        let mut overlay_nested = BTreeMap::new();
        overlay_nested.insert("x".to_string(), Value::Int(99));
        let overlay = map(&[("a", Value::Map(overlay_nested))]);

        let merged = deep_merge_maps(&base, &overlay);
        let a = merged.get("a").unwrap().as_map().unwrap();
        assert_eq!(a.get("x"), Some(&Value::Int(99)));
        assert_eq!(a.get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn deep_merge_replaces_list_and_scalar() {
        let base = Value::List(vec![Value::Int(1)]);
        let overlay = Value::List(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(deep_merge(&base, &overlay), overlay);
    }
}
