use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use datakit::Config;

/// Config rooted in a throwaway workspace, with the progress bar off so
/// test output stays plain.
pub fn test_config() -> Result<(TempDir, Config)> {
    let temp_dir = TempDir::new()?;
    let mut config = Config::with_workspace_root(&temp_dir.path().join("workspace"));
    config.collect_settings.show_progress = false;
    Ok((temp_dir, config))
}

/// Write a file, creating parent directories as needed.
pub fn write_file(root: &Path, relative: &str, contents: &str) -> Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Lay out a working directory with a mix of files the default rules
/// should and should not pick up.
pub fn sample_working_dir(base: &Path) -> Result<PathBuf> {
    let work = base.join("work");
    write_file(&work, "a.csv", "id,value\n1,2\n")?;
    write_file(&work, "b.txt", "notes\n")?;
    write_file(&work, ".git/HEAD", "ref: refs/heads/master\n")?;
    Ok(work)
}
