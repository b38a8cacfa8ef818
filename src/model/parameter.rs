//! `ParameterMap` and `ParameterSource` (spec §3).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::model::value::Value;

/// Mapping from top-level key to a (possibly nested) value tree. Top-level
/// keys merge package -> local -> user (later wins); nested maps are not
/// deep-merged here (that lives in the extension merger, spec §9).
pub type ParameterMap = BTreeMap<String, Value>;

/// Where a resolved top-level parameter came from (spec §3, §4.2).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Provenance {
    /// Present in user-supplied override values.
    Local,
    /// Present in the package's own `parameters.yaml`.
    Package,
    /// Not present anywhere; a synthesized/default value.
    Default,
}

/// A single resolved top-level parameter plus its provenance, produced by
/// the resolver (spec §4.2). Provenance is debug-only: it plays no role in
/// determinism or validation (spec §9).
#[derive(Clone, Debug)]
pub struct ParameterSource {
    pub value: Value,
    pub provenance: Provenance,
    pub source_file: Option<PathBuf>,
}

impl ParameterSource {
    pub fn new(value: Value, provenance: Provenance, source_file: Option<PathBuf>) -> Self {
        ParameterSource { value, provenance, source_file }
    }
}

/// Resolved parameters keyed by top-level name, each carrying its source.
pub type ParameterMapWithSource = BTreeMap<String, ParameterSource>;
