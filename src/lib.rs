#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[cfg(feature = "filesystem")]
extern crate dirs;
#[cfg(feature = "filesystem")]
extern crate walkdir;

extern crate petgraph;
extern crate regex;
extern crate semver;
extern crate toml;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Errors and the critical/warning split (spec §7).
pub mod error;
pub use error::{ErrorKind, KurelError};

/// Non-fatal problems accumulated across a build (spec §7).
pub mod issues;
pub use issues::{Issue, IssueList, Severity};

/// Cooperative cancellation and the top-level build timeout (spec §5).
pub mod cancel;
pub use cancel::CancellationToken;

/// Core data model (spec §3).
pub mod model;
pub use model::{
    KurelMetadata, Maintainer, PackageDefinition, PackageInstance, ParameterMap,
    ParameterMapWithSource, ParameterSource, Patch, PatchMetadata, Provenance, Resource,
    ResourceMetadata, TemplateData, Value,
};

/// Package Loader (spec §4.1).
pub mod loader;
pub use loader::{load_definition, LoadOptions};

/// Extension Merger (spec §4.4).
pub mod extensions;
pub use extensions::{load_with_extensions, ExtensionDocument, ExtensionType, Selector};

/// Variable Resolver (spec §4.2).
pub mod resolver;
pub use resolver::{debug_variable_graph, resolve, ResolveOptions, VariableGraph};

/// Patch Processor (spec §4.3).
pub mod patch;
pub use patch::{apply_patches, debug_patch_graph, resolve_dependencies, PatchGraph};

/// Validator (spec §4.5).
pub mod validate;
pub use validate::{validate, ValidateOptions, ValidationIssue, ValidationResult};

/// Schema inference and the values-schema subset the validator checks
/// against (spec §4.5, §6 `schema generate`).
pub mod schemagen;
pub use schemagen::Schema;

/// Emitter (spec §2 step 6, §6 `build`).
pub mod emit;
pub use emit::{install_phase, EmitOptions, InstallPhase};

/// A read-write-locked handle to a built `PackageDefinition` (spec §5).
pub mod shared;
pub use shared::SharedDefinition;

// Dependency graph and toposort shared by the resolver and validator.
mod graph;
// Shallow/deep parameter-map merge, shared by the resolver and extensions.
mod merge;
// `${...}` reference regexes, shared by the resolver and patch processor.
mod varref;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// The full set of knobs accepted by [`build`] (spec §6 `build` options,
/// §10.3): one struct per stage, plus the handful of cross-cutting choices
/// (extension toggling, an explicit local-overrides path, the top-level
/// timeout) that don't belong to any single stage.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub load: LoadOptions,
    pub resolve: ResolveOptions,
    pub validate: ValidateOptions,
    pub emit: EmitOptions,
    /// Skips the Extension Merger stage entirely (spec §4.4 is opt-out, not
    /// opt-in: extensions are discovered and applied by default).
    pub disable_extensions: bool,
    /// Overrides the discovery order's first candidate (spec §4.4).
    pub explicit_local_path: Option<PathBuf>,
    /// Applied as a deadline on a fresh [`CancellationToken`] when the
    /// caller does not supply its own (spec §5 `opts.Timeout`, default 30s).
    /// Ignored when a token is passed into [`build`] directly, since that
    /// token's own cancellation and any deadline it was constructed with
    /// already govern the run.
    pub timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            load: LoadOptions::default(),
            resolve: ResolveOptions::default(),
            validate: ValidateOptions::default(),
            emit: EmitOptions::default(),
            disable_extensions: false,
            explicit_local_path: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a caller needs out of one `build()` run: the final patched
/// definition, the resolved parameter values with provenance, the patch
/// names that ended up enabled and in what order, validation results, the
/// emitted resource list, and any non-fatal issues collected along the way.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub definition: PackageDefinition,
    pub resolved: ParameterMapWithSource,
    pub enabled_patches: Vec<String>,
    pub validation: ValidationResult,
    pub resources: Vec<Resource>,
    pub issues: IssueList,
}

/// Runs the full pipeline (spec §2): Loader, optionally the Extension
/// Merger, Resolver, Patch Processor, Validator, Emitter, in that order.
/// A validation error never aborts the pipeline early (spec §4.5: the
/// validator reports, it doesn't gate); everything else that's fatal
/// (a malformed `kurel.yaml`, a cycle, a missing patch dependency, an
/// oversized package, cancellation) returns `Err` with no partial
/// `BuildOutput`.
pub fn build(
    root: &Path,
    user_values: &ParameterMap,
    opts: &BuildOptions,
    cancel: Option<&CancellationToken>,
) -> Result<BuildOutput> {
    let owned_token;
    let token = match cancel {
        Some(t) => t,
        None => {
            owned_token = CancellationToken::with_timeout(opts.timeout);
            &owned_token
        }
    };

    let (loaded, mut issues) = loader::load_definition(root, Some(token), &opts.load)?;

    let def = if opts.disable_extensions {
        loaded
    } else {
        let (merged, ext_issues) = extensions::load_with_extensions(
            &loaded,
            opts.explicit_local_path.as_deref(),
            Some(token),
            opts.validate.strict,
        )?;
        issues.extend(ext_issues);
        merged
    };

    let resolved = resolver::resolve(&def.parameters, user_values, &opts.resolve)?;

    let enabled_patches = patch::resolve_dependencies(&def.patches, &resolved)?;
    let patched = patch::apply_patches(&def, &enabled_patches, &resolved, Some(token))?;

    let validation = validate::validate(&patched, &resolved, &opts.validate);

    let resolved_plain: ParameterMap = resolved.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect();
    let resources = emit::emit(&patched.resources, &resolved_plain, &opts.resolve, &opts.emit)?;

    Ok(BuildOutput { definition: patched, resolved, enabled_patches, validation, resources, issues })
}
