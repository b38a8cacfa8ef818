//! Package Loader (spec §4.1): reads a package directory off disk into a
//! `PackageDefinition`, the entry stage of the build pipeline.

pub mod metadata;
pub mod patches;
pub mod resources;

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, Result};
use crate::issues::IssueList;
use crate::model::PackageDefinition;

/// Knobs threaded through the loader (spec §10.3). `max_package_bytes` is
/// enforced up front against the directory's total size; `max_resources`
/// is enforced by `loader::resources::walk_resources` against the file
/// count.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub max_package_bytes: u64,
    pub max_resources: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { max_package_bytes: 50 * 1024 * 1024, max_resources: 1000 }
    }
}

/// `LoadDefinition` (spec §4.1): walks `root` in the step order metadata,
/// parameters, resources, patches, assembling one `PackageDefinition`.
/// Non-fatal problems along the way (malformed `parameters.yaml`,
/// unreadable resource files, duplicate patch names) are collected into the
/// returned `IssueList` rather than aborting the load; only a missing or
/// malformed `kurel.yaml`, an oversized package, or a filesystem error on a
/// required file is fatal (spec §7).
pub fn load_definition(
    root: &Path,
    cancel: Option<&CancellationToken>,
    opts: &LoadOptions,
) -> Result<(PackageDefinition, IssueList)> {
    let mut issues = IssueList::new();

    let root = stat_root(root)?;
    let root = root.as_path();

    check_package_size(root, opts.max_package_bytes)?;

    let meta = metadata::load_metadata(root)?;
    debug!("loaded metadata for package '{}'", meta.name);

    let (parameters, param_issues) = metadata::load_parameters(root);
    issues.extend(param_issues);
    debug!("loaded {} top-level parameters", parameters.len());

    let (resources, resource_issues) = resources::walk_resources(root, cancel, opts.max_resources)?;
    issues.extend(resource_issues);
    for r in &resources {
        debug!("discovered resource {}", r.identity());
    }

    let (patches, patch_issues) = patches::walk_patches(root, cancel);
    issues.extend(patch_issues);
    for p in &patches {
        debug!("discovered patch '{}'", p.name);
    }

    for issue in issues.warnings() {
        log::warn!("{}", issue);
    }

    let mut def = PackageDefinition::new(root.to_path_buf(), meta);
    def.parameters = parameters;
    def.resources = resources;
    def.patches = patches;

    info!(
        "loaded package '{}': {} resources, {} patches, {} issues",
        def.metadata.name,
        def.resources.len(),
        def.patches.len(),
        issues.len()
    );

    Ok((def, issues))
}

/// Stats `root` (spec §4.1 step 1): a missing or unreadable path is fatal.
/// If `root` names a file rather than a directory, its parent directory is
/// used as the package root.
fn stat_root(root: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(root).map_err(|_| ErrorKind::File(root.to_path_buf()))?;
    if meta.is_dir() {
        Ok(root.to_path_buf())
    } else {
        Ok(root.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")))
    }
}

/// Rejects a package whose on-disk footprint exceeds `max_bytes` before any
/// parsing is attempted (spec §5).
fn check_package_size(root: &Path, max_bytes: u64) -> Result<()> {
    let total = dir_size(root);
    if total > max_bytes {
        return Err(crate::error::ErrorKind::Size(format!(
            "package at {} is {} bytes, exceeds cap of {}",
            root.display(),
            total,
            max_bytes
        ))
        .into());
    }
    Ok(())
}

fn dir_size(root: &Path) -> u64 {
    let mut total = 0u64;
    #[cfg(feature = "filesystem")]
    {
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    total += meta.len();
                }
            }
        }
    }
    total
}
