//! Extension Merger (spec §4.4): `LoadWithExtensions(def, localPath)`
//! overlays `*.local.kurel`/`*.local.yaml` files onto a loaded definition.

pub mod discovery;
pub mod merge;

use std::path::Path;

use log::warn;

use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, Result};
use crate::issues::IssueList;
use crate::model::PackageDefinition;

pub use merge::{ExtensionDocument, ExtensionType, PatchOverlay, ResourceOverlay, Selector};

/// `LoadWithExtensions` (spec §4.4): applies every discovered extension
/// file, in discovery order, to `def`, each overlay's result feeding the
/// next. A single extension's I/O or parse failure is recorded as a
/// warning and skipped, unless `strict` is set, in which case it aborts
/// the build (spec §4.4: "Failures in any single extension do not abort
/// the build unless strict mode is on").
pub fn load_with_extensions(
    def: &PackageDefinition,
    explicit_local_path: Option<&Path>,
    cancel: Option<&CancellationToken>,
    strict: bool,
) -> Result<(PackageDefinition, IssueList)> {
    let mut issues = IssueList::new();
    let mut current = def.deep_copy();

    let files = discovery::discover_extension_files(&def.path, explicit_local_path);
    for file in files {
        if let Some(token) = cancel {
            token.check("extension-merger")?;
        }

        let text = match std::fs::read_to_string(&file) {
            Ok(t) => t,
            Err(_) => {
                let kind = ErrorKind::File(file.clone());
                if strict {
                    return Err(kind.into());
                }
                warn!("extension {} unreadable, skipped", file.display());
                issues.record(kind, Some(file));
                continue;
            }
        };

        match merge::parse_extension_document(&text) {
            Ok(doc) => {
                current = merge::apply_extension(&current, &doc);
            }
            Err(e) => {
                if strict {
                    return Err(e);
                }
                warn!("extension {} failed to parse, skipped: {}", file.display(), e);
                issues.record(ErrorKind::Parse(file.clone(), e.to_string()), Some(file));
            }
        }
    }

    Ok((current, issues))
}
