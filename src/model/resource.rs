//! `Resource` (spec §3): a single Kubernetes object, either fully decoded or
//! kept as a raw template awaiting variable resolution (spec §4.1, §9).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::model::value::Value;

/// Decoded `metadata` block fields the launcher core actually cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceMetadata {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Bytes the loader could not decode as a well-formed Kubernetes object,
/// because they still contain unresolved `${...}` template expressions
/// (spec §4.1 step 4, §9 "Template resources"). Kept verbatim so the
/// emitter can re-parse once variables are substituted.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateData {
    pub raw: String,
}

/// A single resource, immutable after load (spec §3). Mutations happen only
/// on a deep copy produced by the patch processor.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub metadata: ResourceMetadata,
    /// The full decoded object tree, including `apiVersion`/`kind`/`metadata`
    /// duplicated for convenience of patch/path navigation.
    pub object: Value,
    /// Present when this resource could not be strictly decoded and is
    /// instead a template awaiting resolution (spec §9).
    pub template: Option<TemplateData>,
    /// The file this resource was loaded from, for diagnostics.
    pub source_file: Option<PathBuf>,
}

impl Resource {
    pub fn new(api_version: String, kind: String, metadata: ResourceMetadata, object: Value) -> Self {
        Resource {
            api_version,
            kind,
            metadata,
            object,
            template: None,
            source_file: None,
        }
    }

    /// `kind/namespace/name` identity used for duplicate detection
    /// (spec §4.5 semantic validation).
    pub fn identity(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind.to_lowercase(),
            self.metadata.namespace.as_deref().unwrap_or(""),
            self.metadata.name
        )
    }

    /// Returns true if `target` (one of `Kind`, `Kind.name` or `Kind/name`,
    /// case-insensitive on kind, spec §4.3) selects this resource. Empty
    /// target selects every resource.
    pub fn matches_target(&self, target: &str) -> bool {
        if target.is_empty() {
            return true;
        }
        let (kind, name) = if let Some((k, n)) = target.split_once('.') {
            (k, Some(n))
        } else if let Some((k, n)) = target.split_once('/') {
            (k, Some(n))
        } else {
            (target, None)
        };
        if !self.kind.eq_ignore_ascii_case(kind) {
            return false;
        }
        match name {
            Some(n) => self.metadata.name == n,
            None => true,
        }
    }

    pub fn deep_copy(&self) -> Resource {
        self.clone()
    }
}
