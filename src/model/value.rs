//! The generic value tree shared by parameters, patch bodies and resource
//! trees (spec §3 `ParameterMap`, §4.3 patch field operations).
//!
//! A single `Value` type is used everywhere a YAML/JSON-shaped tree is
//! needed so the resolver, patch processor and schema validator can walk the
//! same representation. Map keys are kept in a `BTreeMap` so iteration order
//! is always lexicographic, satisfying the determinism contract of spec §5.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The truthiness rule used by the patch processor's enable evaluation
    /// (spec §4.3): bool -> itself; number -> nonzero; string -> nonempty
    /// and not a recognized falsy literal; nil -> false; otherwise truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => {
                let lower = s.to_lowercase();
                !s.is_empty() && !matches!(lower.as_str(), "false" | "no" | "0" | "disabled")
            }
            Value::Null => false,
            Value::List(_) | Value::Map(_) => true,
        }
    }

    /// Canonical textual form used when a value is interpolated into a
    /// larger string (spec §4.2): bools as `true`/`false`, numbers in their
    /// shortest exact representation.
    pub fn to_canonical_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_yaml::to_string(&self.to_yaml()).unwrap_or_default()
            }
        }
    }

    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Value::Null => serde_yaml::Value::Null,
            Value::Bool(b) => serde_yaml::Value::Bool(*b),
            Value::Int(i) => serde_yaml::Value::Number((*i).into()),
            Value::Float(f) => serde_yaml::Value::Number((*f).into()),
            Value::String(s) => serde_yaml::Value::String(s.clone()),
            Value::List(l) => serde_yaml::Value::Sequence(l.iter().map(Value::to_yaml).collect()),
            Value::Map(m) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (k, v) in m {
                    mapping.insert(serde_yaml::Value::String(k.clone()), v.to_yaml());
                }
                serde_yaml::Value::Mapping(mapping)
            }
        }
    }

    pub fn from_yaml(v: &serde_yaml::Value) -> Value {
        match v {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_yaml::Value::String(s) => Value::String(s.clone()),
            serde_yaml::Value::Sequence(s) => Value::List(s.iter().map(Value::from_yaml).collect()),
            serde_yaml::Value::Mapping(m) => {
                let mut map = BTreeMap::new();
                for (k, v) in m {
                    if let serde_yaml::Value::String(key) = k {
                        map.insert(key.clone(), Value::from_yaml(v));
                    }
                }
                Value::Map(map)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(a) => Value::List(a.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                let mut map = BTreeMap::new();
                for (k, v) in o {
                    map.insert(k.clone(), Value::from_json(v));
                }
                Value::Map(map)
            }
        }
    }

    pub fn from_toml(v: &toml::Value) -> Value {
        match v {
            toml::Value::String(s) => Value::String(s.clone()),
            toml::Value::Integer(i) => Value::Int(*i),
            toml::Value::Float(f) => Value::Float(*f),
            toml::Value::Boolean(b) => Value::Bool(*b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(a) => Value::List(a.iter().map(Value::from_toml).collect()),
            toml::Value::Table(t) => {
                let mut map = BTreeMap::new();
                for (k, v) in t {
                    map.insert(k.clone(), Value::from_toml(v));
                }
                Value::Map(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}
