//! `KurelMetadata` (spec §3): package name, version and descriptive fields.

use regex::Regex;
use semver::Version;

use crate::error::{ErrorKind, Result};

/// `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$` from spec §3.
fn name_re() -> Regex {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct KurelMetadata {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default)]
    pub values_schema: Option<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl KurelMetadata {
    /// Synthesize metadata for a package without a `kurel.yaml` (spec §4.1
    /// step 2): `name=basename(root)`, `version="0.0.0"`.
    pub fn synthesized(name: impl Into<String>) -> Self {
        KurelMetadata {
            name: name.into(),
            version: default_version(),
            app_version: None,
            description: None,
            schema: None,
            values_schema: None,
            maintainers: Vec::new(),
        }
    }

    pub fn verify(&self) -> Result<()> {
        if !name_re().is_match(&self.name) {
            return Err(ErrorKind::ValidationSemantic(format!(
                "package name '{}' does not match ^[a-z0-9]([-a-z0-9]*[a-z0-9])?$",
                self.name
            ))
            .into());
        }
        Version::parse(&self.version).map_err(|e| {
            ErrorKind::ValidationSemantic(format!("invalid version '{}': {}", self.version, e))
        })?;
        Ok(())
    }
}
