//! Core data model (spec §3).

pub mod metadata;
pub mod package;
pub mod parameter;
pub mod patch;
pub mod resource;
pub mod value;

pub use metadata::{KurelMetadata, Maintainer};
pub use package::{PackageDefinition, PackageInstance};
pub use parameter::{ParameterMap, ParameterMapWithSource, ParameterSource, Provenance};
pub use patch::{Patch, PatchMetadata};
pub use resource::{Resource, ResourceMetadata, TemplateData};
pub use value::Value;
