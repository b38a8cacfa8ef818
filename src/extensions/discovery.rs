//! Extension file discovery (spec §4.4): explicit localPath → package
//! directory → parent directory → current working directory →
//! `~/.kurel/extensions`, deduplicated by absolute path. Within each
//! directory, matching files are sorted lexicographically by basename
//! (filenames conventionally start with a two-digit priority).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn candidate_dirs(package_path: &Path, explicit_local_path: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(p) = explicit_local_path {
        dirs.push(p.to_path_buf());
    }
    dirs.push(package_path.to_path_buf());
    if let Some(parent) = package_path.parent() {
        dirs.push(parent.to_path_buf());
    }
    #[cfg(feature = "filesystem")]
    {
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        if let Some(home) = dirs::home_dir() {
            dirs.push(home.join(".kurel").join("extensions"));
        }
    }

    let mut seen = BTreeSet::new();
    let mut deduped = Vec::new();
    for d in dirs {
        let key = d.canonicalize().unwrap_or_else(|_| d.clone());
        if seen.insert(key) {
            deduped.push(d);
        }
    }
    deduped
}

fn is_extension_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.ends_with(".local.kurel") || name.ends_with(".local.yaml"),
        None => false,
    }
}

/// Discovers every extension file, in discovery order (spec §4.4).
pub fn discover_extension_files(package_path: &Path, explicit_local_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in candidate_dirs(package_path, explicit_local_path) {
        if !dir.is_dir() {
            continue;
        }
        let mut in_dir: Vec<PathBuf> = std::fs::read_dir(&dir)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_extension_file(p))
            .collect();
        in_dir.sort_by_key(|p| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        files.extend(in_dir);
    }
    files
}
