use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{DatakitError, Result};

/// Enumerate files under `workdir` subject to include/exclude glob rules.
///
/// Exclusion applies to *names*, not full paths: a directory whose name
/// matches an exclude pattern is pruned before descent, and a file whose
/// name matches is dropped. Of the remaining files, only those whose name
/// matches at least one include pattern are kept. An empty include set
/// matches nothing.
///
/// Returned paths are relative to `workdir`. Traversal order is
/// filesystem-dependent; callers must not rely on it.
pub fn discover_files(
    workdir: &Path,
    includes: &[String],
    excludes: &[String],
) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(includes)?;
    let exclude_set = build_globset(excludes)?;

    let mut matched = Vec::new();

    let walker = WalkDir::new(workdir).into_iter().filter_entry(|entry| {
        // Prune excluded directories before descending into them. The root
        // itself is never pruned, even when its name matches.
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        !exclude_set.is_match(Path::new(entry.file_name()))
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            DatakitError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let name = Path::new(entry.file_name());
        if exclude_set.is_match(name) || !include_set.is_match(name) {
            continue;
        }

        let relative = pathdiff::diff_paths(entry.path(), workdir)
            .unwrap_or_else(|| entry.path().to_path_buf());
        matched.push(relative);
    }

    Ok(matched)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            DatakitError::InvalidConfig(format!("invalid glob pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DatakitError::InvalidConfig(format!("invalid glob set: {}", e)))
}
