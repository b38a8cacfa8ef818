//! `PackageDefinition` and `PackageInstance` (spec §3).

use std::path::PathBuf;

use crate::model::metadata::KurelMetadata;
use crate::model::parameter::{ParameterMap, ParameterMapWithSource};
use crate::model::patch::Patch;
use crate::model::resource::Resource;

/// The immutable, loaded shape of a package (spec §3). Any transformation
/// (patch application, extension merge) returns a deep copy rather than
/// mutating in place; concurrent readers are allowed, writers must not
/// exist once construction has finished (spec §5).
#[derive(Clone, Debug)]
pub struct PackageDefinition {
    pub path: PathBuf,
    pub metadata: KurelMetadata,
    pub parameters: ParameterMap,
    pub resources: Vec<Resource>,
    pub patches: Vec<Patch>,
}

impl PackageDefinition {
    pub fn new(path: PathBuf, metadata: KurelMetadata) -> Self {
        PackageDefinition {
            path,
            metadata,
            parameters: ParameterMap::new(),
            resources: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Explicit copy-on-write boundary (spec §9): call at every stage entry
    /// rather than relying on an implicit `Clone`, so each transformation's
    /// input is plainly never aliased with its output.
    pub fn deep_copy(&self) -> PackageDefinition {
        self.clone()
    }

    pub fn patch_by_name(&self, name: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.name == name)
    }
}

/// A transient, per-build-invocation view over a `PackageDefinition` (spec
/// §3): the definition plus resolved parameters and the enabled-patch
/// subset computed for this particular build.
#[derive(Clone, Debug)]
pub struct PackageInstance {
    pub definition: PackageDefinition,
    pub user_values: ParameterMap,
    pub resolved: ParameterMapWithSource,
    pub enabled_patches: Vec<String>,
    pub local_path: Option<PathBuf>,
}

impl PackageInstance {
    pub fn new(definition: PackageDefinition, user_values: ParameterMap) -> Self {
        PackageInstance {
            definition,
            user_values,
            resolved: ParameterMapWithSource::new(),
            enabled_patches: Vec::new(),
            local_path: None,
        }
    }
}
