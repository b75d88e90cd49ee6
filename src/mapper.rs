use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// One file scheduled for staging: where it lives on disk and where it
/// lands inside the repository working copy.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
}

/// Rewrites discovered file paths into repository-relative destinations
/// using a directory-mapping table. The most specific (longest) matching
/// prefix wins; a key only matches at a directory boundary, so "data" does
/// not capture "database/x.csv".
#[derive(Debug, Clone)]
pub struct ImportMapper {
    // Keys sorted by descending length so the first hit is the longest.
    ordered: Vec<(String, String)>,
}

impl ImportMapper {
    pub fn new(mapping: &IndexMap<String, String>) -> Self {
        let mut ordered: Vec<(String, String)> = mapping
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { ordered }
    }

    /// Straight prefix substitution: the first key `k` where the path
    /// starts with `k/` has that prefix replaced by its mapped value. No
    /// key matching leaves the path unchanged.
    pub fn map(&self, relative: &Path) -> PathBuf {
        let path = relative.to_string_lossy();

        for (key, value) in &self.ordered {
            let prefix = format!("{}/", key);
            if let Some(rest) = path.strip_prefix(&prefix) {
                return PathBuf::from(format!("{}{}", value, rest));
            }
        }

        relative.to_path_buf()
    }

    /// Build the staging entry for a discovered file.
    pub fn entry(&self, workdir: &Path, relative: &Path) -> FileEntry {
        FileEntry {
            source_path: workdir.join(relative),
            relative_path: self.map(relative),
        }
    }
}
