//! `Patch` (spec §3, §4.3): a named set of field operations with optional
//! enable/requires/conflicts metadata.

/// Sidecar or inline-comment metadata for a patch (spec §4.1 step 5, §6).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchMetadata {
    /// Enable expression: a literal boolean or single `${...}` reference
    /// (spec §4.3, §9). Absent metadata or absent `enabled` means enabled.
    pub enabled: Option<String>,
    pub description: Option<String>,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
}

/// A patch as loaded from disk. The body is kept as raw text and parsed
/// lazily by the patch processor (spec §3 "body parsed lazily"): variable
/// substitution against the flattened values namespace must happen first
/// (spec §4.3), so parsing the field-operation grammar eagerly at load time
/// would be premature.
#[derive(Clone, Debug)]
pub struct Patch {
    pub name: String,
    /// Target selector this patch applies to, e.g. `Deployment.app1`. Empty
    /// string selects all resources. May be overridden per-section by an
    /// inline `[Kind.name]` header inside the body (spec §6).
    pub target: String,
    pub body: String,
    pub metadata: Option<PatchMetadata>,
    pub source_file: Option<std::path::PathBuf>,
}

impl Patch {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Patch {
            name: name.into(),
            target: String::new(),
            body: body.into(),
            metadata: None,
            source_file: None,
        }
    }

    pub fn requires(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.requires.as_slice()).unwrap_or(&[])
    }

    pub fn conflicts(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.conflicts.as_slice()).unwrap_or(&[])
    }

    pub fn enabled_expr(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.enabled.as_deref())
    }

    pub fn deep_copy(&self) -> Patch {
        self.clone()
    }
}
