//! Patch field-operation path grammar (spec §4.3, §9):
//!
//! ```text
//! segment ( "." segment )*
//! segment := name | name[index] | name[key=value]
//! ```
//!
//! This is a distinct, richer grammar than `resolver::path` (which only
//! needs numeric indices into already-resolved parameter values): patch
//! paths additionally select an array element by a child-field match, and
//! navigation must be able to *construct* missing intermediate maps for
//! `replace`/`add` (the resolver only ever reads existing values).

use crate::error::{ErrorKind, Result};
use crate::model::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// Plain map key, or the first segment of the path.
    Key(String),
    /// `name[N]`: the Nth element of the list at `name`.
    Index(String, usize),
    /// `name[key=value]`: the element of the list at `name` whose `key`
    /// field equals `value` (string-compared).
    KeyedIndex(String, String, String),
}

pub fn parse(path: &str) -> Result<Vec<Selector>> {
    path.split('.').map(|s| parse_segment(path, s)).collect()
}

fn parse_segment(full_path: &str, seg: &str) -> Result<Selector> {
    match seg.find('[') {
        None => Ok(Selector::Key(seg.to_string())),
        Some(idx) => {
            if !seg.ends_with(']') {
                return Err(ErrorKind::Patch {
                    patch: String::new(),
                    target: String::new(),
                    path: full_path.to_string(),
                    reason: "unterminated '[' in path segment".to_string(),
                }
                .into());
            }
            let name = seg[..idx].to_string();
            let inner = &seg[idx + 1..seg.len() - 1];
            if let Some((key, value)) = inner.split_once('=') {
                Ok(Selector::KeyedIndex(name, key.to_string(), value.to_string()))
            } else {
                let index: usize = inner.parse().map_err(|_| ErrorKind::Patch {
                    patch: String::new(),
                    target: String::new(),
                    path: full_path.to_string(),
                    reason: format!("invalid array index '{}'", inner),
                })?;
                Ok(Selector::Index(name, index))
            }
        }
    }
}

fn find_in_list<'a>(list: &'a [Value], key: &str, value: &str) -> Option<usize> {
    list.iter().position(|item| {
        item.as_map()
            .and_then(|m| m.get(key))
            .map(|v| v.to_canonical_string() == value)
            .unwrap_or(false)
    })
}

/// Read-only navigation, used by `delete` and read checks. Returns `None`
/// if any segment does not resolve.
pub fn get<'a>(root: &'a Value, path: &[Selector]) -> Option<&'a Value> {
    let mut current = root;
    for sel in path {
        current = match sel {
            Selector::Key(k) => current.as_map()?.get(k)?,
            Selector::Index(k, i) => current.as_map()?.get(k)?.as_list()?.get(*i)?,
            Selector::KeyedIndex(k, field, val) => {
                let list = current.as_map()?.get(k)?.as_list()?;
                let idx = find_in_list(list, field, val)?;
                &list[idx]
            }
        };
    }
    Some(current)
}

/// Navigate to the parent container and final key/index of `path`,
/// constructing intermediate maps as needed (spec §4.3: "constructing
/// intermediate maps only when they are absent for non-terminal segments of
/// a replace/add"). Returns `None` if an existing non-terminal segment
/// resolves to something that isn't a map (can't construct through it) or
/// a `[key=value]`/`[index]` element is missing (those are never
/// constructed, only matched).
enum Parent<'a> {
    Map(&'a mut std::collections::BTreeMap<String, Value>, String),
    ListIndex(&'a mut Vec<Value>, usize),
}

fn navigate_mut<'a>(root: &'a mut Value, path: &[Selector]) -> Result<Parent<'a>> {
    let (last, init) = path.split_last().expect("path must be non-empty");
    let mut current = root;
    for sel in init {
        current = match sel {
            Selector::Key(k) => {
                if current.as_map().is_none() {
                    *current = Value::Map(Default::default());
                }
                let map = current.as_map_mut().unwrap();
                if !map.contains_key(k) {
                    map.insert(k.clone(), Value::Map(Default::default()));
                }
                map.get_mut(k).unwrap()
            }
            Selector::Index(k, i) => {
                let map = current.as_map_mut().ok_or_else(missing_path_error)?;
                let list = map.get_mut(k).and_then(Value::as_list_mut).ok_or_else(missing_path_error)?;
                list.get_mut(*i).ok_or_else(missing_path_error)?
            }
            Selector::KeyedIndex(k, field, val) => {
                let map = current.as_map_mut().ok_or_else(missing_path_error)?;
                let list = map.get(k).and_then(Value::as_list).ok_or_else(missing_path_error)?;
                let idx = find_in_list(list, field, val).ok_or_else(missing_path_error)?;
                map.get_mut(k).unwrap().as_list_mut().unwrap().get_mut(idx).unwrap()
            }
        };
    }

    match last {
        Selector::Key(k) => {
            if current.as_map().is_none() {
                *current = Value::Map(Default::default());
            }
            Ok(Parent::Map(current.as_map_mut().unwrap(), k.clone()))
        }
        Selector::Index(k, i) => {
            let map = current.as_map_mut().ok_or_else(missing_path_error)?;
            let list = map.get_mut(k).and_then(Value::as_list_mut).ok_or_else(missing_path_error)?;
            if *i >= list.len() {
                return Err(missing_path_error());
            }
            Ok(Parent::ListIndex(list, *i))
        }
        Selector::KeyedIndex(k, field, val) => {
            let map = current.as_map_mut().ok_or_else(missing_path_error)?;
            let list = map.get(k).and_then(Value::as_list).ok_or_else(missing_path_error)?;
            let idx = find_in_list(list, field, val).ok_or_else(missing_path_error)?;
            let list = map.get_mut(k).unwrap().as_list_mut().unwrap();
            Ok(Parent::ListIndex(list, idx))
        }
    }
}

fn missing_path_error() -> failure::Error {
    ErrorKind::Patch {
        patch: String::new(),
        target: String::new(),
        path: String::new(),
        reason: "path segment not found".to_string(),
    }
    .into()
}

/// `replace` (or unspecified): assign `value` at `path`, constructing
/// intermediate maps as needed.
pub fn set(root: &mut Value, path: &[Selector], value: Value) -> Result<()> {
    match navigate_mut(root, path)? {
        Parent::Map(map, key) => {
            map.insert(key, value);
        }
        Parent::ListIndex(list, idx) => {
            list[idx] = value;
        }
    }
    Ok(())
}

/// `delete`: remove the terminal key. Missing paths are a no-op per the
/// processor's tolerant deletion semantics (nothing to remove).
pub fn delete(root: &mut Value, path: &[Selector]) -> Result<()> {
    let (last, init) = path.split_last().expect("path must be non-empty");
    let mut current = root;
    for sel in init {
        current = match sel {
            Selector::Key(k) => match current.as_map_mut().and_then(|m| m.get_mut(k)) {
                Some(v) => v,
                None => return Ok(()),
            },
            Selector::Index(k, i) => {
                match current.as_map().and_then(|m| m.get(k)).and_then(Value::as_list).map(|l| l.len()) {
                    Some(len) if *i < len => current.as_map_mut().unwrap().get_mut(k).unwrap().as_list_mut().unwrap().get_mut(*i).unwrap(),
                    _ => return Ok(()),
                }
            }
            Selector::KeyedIndex(k, field, val) => {
                let idx = current
                    .as_map()
                    .and_then(|m| m.get(k))
                    .and_then(Value::as_list)
                    .and_then(|l| find_in_list(l, field, val));
                match idx {
                    Some(idx) => current.as_map_mut().unwrap().get_mut(k).unwrap().as_list_mut().unwrap().get_mut(idx).unwrap(),
                    None => return Ok(()),
                }
            }
        };
    }

    match last {
        Selector::Key(k) => {
            if let Some(map) = current.as_map_mut() {
                map.remove(k);
            }
        }
        Selector::Index(k, i) => {
            if let Some(list) = current.as_map_mut().and_then(|m| m.get_mut(k)).and_then(Value::as_list_mut) {
                if *i < list.len() {
                    list.remove(*i);
                }
            }
        }
        Selector::KeyedIndex(k, field, val) => {
            if let Some(list) = current.as_map_mut().and_then(|m| m.get_mut(k)).and_then(Value::as_list_mut) {
                if let Some(idx) = find_in_list(list, field, val) {
                    list.remove(idx);
                }
            }
        }
    }
    Ok(())
}

/// `add`: append to an existing list at `path`; fall back to `replace` if
/// the target is not a list (spec §4.3).
pub fn add(root: &mut Value, path: &[Selector], value: Value) -> Result<()> {
    if let Some(existing) = get(root, path) {
        if existing.as_list().is_some() {
            match navigate_mut(root, path)? {
                Parent::Map(map, key) => {
                    map.get_mut(&key).unwrap().as_list_mut().unwrap().push(value);
                }
                Parent::ListIndex(list, idx) => {
                    list[idx].as_list_mut().unwrap().push(value);
                }
            }
            return Ok(());
        }
    }
    set(root, path, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map_value(pairs: &[(&str, Value)]) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn replace_constructs_missing_intermediate_maps() {
        let mut root = map_value(&[]);
        let path = parse("spec.replicas").unwrap();
        set(&mut root, &path, Value::Int(5)).unwrap();
        assert_eq!(get(&root, &path), Some(&Value::Int(5)));
    }

    #[test]
    fn delete_removes_terminal_key() {
        let mut root = map_value(&[("spec", map_value(&[("replicas", Value::Int(2))]))]);
        let path = parse("spec.replicas").unwrap();
        delete(&mut root, &path).unwrap();
        assert_eq!(get(&root, &path), None);
    }

    #[test]
    fn delete_missing_path_is_noop() {
        let mut root = map_value(&[]);
        let path = parse("spec.replicas").unwrap();
        assert!(delete(&mut root, &path).is_ok());
    }

    #[test]
    fn add_appends_to_existing_list() {
        let mut root = map_value(&[("items", Value::List(vec![Value::Int(1)]))]);
        let path = parse("items").unwrap();
        add(&mut root, &path, Value::Int(2)).unwrap();
        assert_eq!(get(&root, &path), Some(&Value::List(vec![Value::Int(1), Value::Int(2)])));
    }

    #[test]
    fn add_falls_back_to_replace_for_non_list() {
        let mut root = map_value(&[("replicas", Value::Int(1))]);
        let path = parse("replicas").unwrap();
        add(&mut root, &path, Value::Int(9)).unwrap();
        assert_eq!(get(&root, &path), Some(&Value::Int(9)));
    }

    #[test]
    fn keyed_index_selects_matching_element() {
        let containers = Value::List(vec![
            map_value(&[("name", Value::String("a".into())), ("image", Value::String("x".into()))]),
            map_value(&[("name", Value::String("b".into())), ("image", Value::String("y".into()))]),
        ]);
        let mut root = map_value(&[("containers", containers)]);
        let path = parse("containers[name=b].image").unwrap();
        set(&mut root, &path, Value::String("z".into())).unwrap();
        assert_eq!(get(&root, &path), Some(&Value::String("z".into())));
        let other = parse("containers[name=a].image").unwrap();
        assert_eq!(get(&root, &other), Some(&Value::String("x".into())));
    }
}
