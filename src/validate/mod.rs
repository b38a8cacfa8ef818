//! Validator (spec §4.5): schema, semantic and per-kind checks producing a
//! `ValidationResult{errors, warnings}`. Validation never mutates its input.

pub mod kinds;
pub mod schema;
pub mod semantic;

use log::debug;

use crate::model::{PackageDefinition, ParameterMapWithSource, Value};
use crate::schemagen::Schema;

#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub message: String,
}

impl From<semantic::SemanticIssue> for ValidationIssue {
    fn from(i: semantic::SemanticIssue) -> Self {
        ValidationIssue { message: i.message }
    }
}

impl From<kinds::KindIssue> for ValidationIssue {
    fn from(i: kinds::KindIssue) -> Self {
        ValidationIssue { message: i.message }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ValidateOptions {
    pub strict: bool,
    pub max_errors: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions { strict: false, max_errors: 100 }
    }
}

/// Runs every validation check over `def` (spec §4.5). When
/// `def.metadata.values_schema` names a file, `resolved` is validated
/// against it; otherwise schema validation is a no-op, since a package
/// without a values schema has nothing to validate the resolved values
/// against.
pub fn validate(def: &PackageDefinition, resolved: &ParameterMapWithSource, opts: &ValidateOptions) -> ValidationResult {
    let mut result = ValidationResult::default();

    if let Some(schema_path) = &def.metadata.values_schema {
        match crate::schemagen::load_schema_file(std::path::Path::new(schema_path)) {
            Ok(schema) => schema_check(resolved, &schema, &mut result, opts.max_errors),
            Err(e) => result.errors.push(ValidationIssue { message: format!("failed to load values schema: {}", e) }),
        }
    }

    if !at_cap(&result, opts.max_errors) {
        let (errors, warnings) = semantic::check(def);
        result.errors.extend(errors.into_iter().map(ValidationIssue::from));
        result.warnings.extend(warnings.into_iter().map(ValidationIssue::from));
    }

    for resource in &def.resources {
        if at_cap(&result, opts.max_errors) {
            break;
        }
        let (errors, warnings) = kinds::check(resource);
        result.errors.extend(errors.into_iter().map(ValidationIssue::from));
        result.warnings.extend(warnings.into_iter().map(ValidationIssue::from));
    }

    if at_cap(&result, opts.max_errors) {
        result.errors.truncate(opts.max_errors);
        result.errors.push(ValidationIssue { message: format!("stopped after {} errors", opts.max_errors) });
    }

    if opts.strict {
        result.errors.append(&mut result.warnings);
    }

    debug!("validation: {} errors, {} warnings", result.errors.len(), result.warnings.len());
    result
}

fn at_cap(result: &ValidationResult, max_errors: usize) -> bool {
    result.errors.len() >= max_errors
}

fn schema_check(resolved: &ParameterMapWithSource, schema: &Schema, result: &mut ValidationResult, max_errors: usize) {
    let map: crate::model::ParameterMap = resolved.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect();
    let value = Value::Map(map);
    for message in schema::validate(&value, schema) {
        if result.errors.len() >= max_errors {
            break;
        }
        result.errors.push(ValidationIssue { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KurelMetadata, Patch, PatchMetadata, ParameterSource, Provenance, Resource, ResourceMetadata};
    use std::path::PathBuf;

    fn def() -> PackageDefinition {
        PackageDefinition::new(PathBuf::from("demo.kurel"), KurelMetadata::synthesized("demo"))
    }

    #[test]
    fn clean_definition_validates_without_errors() {
        let d = def();
        let resolved = ParameterMapWithSource::new();
        let result = validate(&d, &resolved, &ValidateOptions::default());
        assert!(result.is_valid());
    }

    #[test]
    fn semantic_errors_surface_through_validate() {
        let mut d = def();
        let mut p = Patch::new("a", "");
        p.metadata = Some(PatchMetadata { requires: vec!["missing".to_string()], ..Default::default() });
        d.patches.push(p);
        let result = validate(&d, &ParameterMapWithSource::new(), &ValidateOptions::default());
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("requires unknown patch")));
    }

    #[test]
    fn kind_errors_surface_through_validate() {
        let mut d = def();
        d.resources.push(Resource::new(
            "v1".into(),
            "ConfigMap".into(),
            ResourceMetadata { name: "cfg".into(), ..Default::default() },
            crate::model::Value::Map(Default::default()),
        ));
        let result = validate(&d, &ParameterMapWithSource::new(), &ValidateOptions::default());
        assert!(result.errors.iter().any(|e| e.message.contains("no data section")));
    }

    #[test]
    fn strict_mode_promotes_warnings_to_errors() {
        let mut d = def();
        let mut p = Patch::new("a", "");
        p.metadata = Some(PatchMetadata { conflicts: vec!["missing".to_string()], ..Default::default() });
        d.patches.push(p);

        let lenient = validate(&d, &ParameterMapWithSource::new(), &ValidateOptions::default());
        assert!(lenient.is_valid());
        assert!(!lenient.warnings.is_empty());

        let strict_opts = ValidateOptions { strict: true, ..ValidateOptions::default() };
        let strict = validate(&d, &ParameterMapWithSource::new(), &strict_opts);
        assert!(!strict.is_valid());
    }

    #[test]
    fn max_errors_caps_and_reports_truncation() {
        let mut d = def();
        for i in 0..10 {
            let mut p = Patch::new(format!("p{}", i), "");
            p.metadata = Some(PatchMetadata { requires: vec!["missing".to_string()], ..Default::default() });
            d.patches.push(p);
        }
        let opts = ValidateOptions { strict: false, max_errors: 3 };
        let result = validate(&d, &ParameterMapWithSource::new(), &opts);
        assert_eq!(result.errors.len(), 4);
        assert!(result.errors.last().unwrap().message.contains("stopped after"));
    }

    #[test]
    fn values_schema_violations_are_reported() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("values.schema.yaml");
        let mut f = std::fs::File::create(&schema_path).unwrap();
        writeln!(f, "type: object\nrequired: [replicas]\nproperties:\n  replicas:\n    type: integer\n    minimum: 1\n").unwrap();

        let mut d = def();
        d.metadata.values_schema = Some(schema_path.to_string_lossy().to_string());
        let mut resolved = ParameterMapWithSource::new();
        resolved.insert(
            "replicas".to_string(),
            ParameterSource::new(crate::model::Value::Int(0), Provenance::Package, None),
        );
        let result = validate(&d, &resolved, &ValidateOptions::default());
        assert!(result.errors.iter().any(|e| e.message.contains("below minimum")));
    }
}
