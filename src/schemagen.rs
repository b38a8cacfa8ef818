//! JSON-schema-subset generation (spec §4.5, §6 `schema` command): a
//! deliberately small schema shape covering types, required fields, string
//! length/pattern, numeric min/max, array `minItems`, enum membership and
//! recursive `properties` — not full JSON Schema (spec §1 Non-goals:
//! "schema JSON-syntax design beyond the subset used here").

use std::collections::BTreeMap;

use crate::model::Value;

/// One schema node. Every field is optional/defaulted so a hand-authored
/// `values_schema` document only needs to specify the constraints it
/// cares about.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub required: Vec<String>,
    pub properties: BTreeMap<String, Schema>,
    pub items: Option<Box<Schema>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_items: Option<usize>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<serde_yaml::Value>>,
}

/// Infers a schema from an example value tree (spec §6 `schema` command).
/// `required` lists every key observed on a map (the only evidence
/// available from a single example); a list's `items` schema is inferred
/// from its first element only.
pub fn generate_schema(value: &Value) -> Schema {
    match value {
        Value::Null => Schema { ty: Some("null".to_string()), ..Default::default() },
        Value::Bool(_) => Schema { ty: Some("boolean".to_string()), ..Default::default() },
        Value::Int(_) => Schema { ty: Some("integer".to_string()), ..Default::default() },
        Value::Float(_) => Schema { ty: Some("number".to_string()), ..Default::default() },
        Value::String(_) => Schema { ty: Some("string".to_string()), ..Default::default() },
        Value::List(items) => Schema {
            ty: Some("array".to_string()),
            items: items.first().map(|v| Box::new(generate_schema(v))),
            ..Default::default()
        },
        Value::Map(map) => Schema {
            ty: Some("object".to_string()),
            required: map.keys().cloned().collect(),
            properties: map.iter().map(|(k, v)| (k.clone(), generate_schema(v))).collect(),
            ..Default::default()
        },
    }
}

/// Renders `schema` to pretty JSON, the `schema` CLI command's output
/// format (spec §6).
pub fn to_json(schema: &Schema) -> crate::error::Result<String> {
    serde_json::to_string_pretty(schema)
        .map_err(|e| crate::error::ErrorKind::Parse(std::path::PathBuf::from("<schema>"), e.to_string()).into())
}

/// Loads a hand-authored schema document (spec §3 `KurelMetadata.valuesSchema`)
/// off disk.
pub fn load_schema_file(path: &std::path::Path) -> crate::error::Result<Schema> {
    let text = std::fs::read_to_string(path).map_err(|_| crate::error::ErrorKind::File(path.to_path_buf()))?;
    serde_yaml::from_str(&text).map_err(|e| crate::error::ErrorKind::Parse(path.to_path_buf(), e.to_string()).into())
}
