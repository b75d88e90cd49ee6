use colored::*;
use std::path::Path;
use std::process::Command;

use crate::error::{DatakitError, Result};

/// Secondary store that hosts the canonical remote copy of a repository.
///
/// The repository manager always talks plain git to a local bare
/// repository; a backend's job is to move that bare repository to and from
/// the real remote location. This is what makes the two-hop clone work:
/// non-native stores are faked as a local bare repo and git never needs to
/// understand their transport.
pub trait StorageBackend {
    fn name(&self) -> &'static str;

    /// Canonical remote URL for (username, reponame) on this backend.
    fn url(&self, username: &str, reponame: &str) -> String;

    /// Upload a freshly initialized local bare repository to the store.
    fn init_repo(&self, username: &str, reponame: &str, server_repodir: &Path) -> Result<()>;

    /// Stage the store's copy into a local bare repository directory.
    fn clone_repo(&self, url: &str, server_repodir: &Path) -> Result<()>;
}

/// Object-store backend shelling out to the `aws` CLI. Selected whenever a
/// remote URL carries the `s3://` scheme.
#[derive(Debug, Clone)]
pub struct S3Backend {
    bucket: String,
}

impl S3Backend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    /// Derive the backend from a URL like `s3://bucket/git/user/repo.git`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("s3://")
            .ok_or_else(|| DatakitError::InvalidRemoteUrl {
                url: url.to_string(),
            })?;
        let bucket = rest.split('/').next().unwrap_or_default();
        if bucket.is_empty() {
            return Err(DatakitError::InvalidRemoteUrl {
                url: url.to_string(),
            });
        }
        Ok(Self::new(bucket))
    }

    fn run_aws(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("aws")
            .args(args)
            .output()
            .map_err(|e| DatakitError::Backend(format!("failed to run aws: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DatakitError::Backend(format!(
                "aws {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl StorageBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn url(&self, username: &str, reponame: &str) -> String {
        format!("s3://{}/git/{}/{}.git", self.bucket, username, reponame)
    }

    fn init_repo(&self, username: &str, reponame: &str, server_repodir: &Path) -> Result<()> {
        let target = self.url(username, reponame);
        println!(
            "{} Uploading bare repository to {}",
            "☁️".bright_blue(),
            target.bright_white()
        );
        self.run_aws(&[
            "s3",
            "sync",
            &server_repodir.display().to_string(),
            &target,
        ])
    }

    fn clone_repo(&self, url: &str, server_repodir: &Path) -> Result<()> {
        println!(
            "{} Staging {} as a local bare repository",
            "☁️".bright_blue(),
            url.bright_white()
        );
        std::fs::create_dir_all(server_repodir)?;
        self.run_aws(&["s3", "sync", url, &server_repodir.display().to_string()])
    }
}

/// Pick the backend for a remote URL. Plain git transport URLs need no
/// backend; only `s3://` selects the composed git+s3 setup.
pub fn backend_for_url(url: &str) -> Result<Option<Box<dyn StorageBackend>>> {
    if url.starts_with("s3://") {
        Ok(Some(Box::new(S3Backend::from_url(url)?)))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_backend_url_derivation() {
        let backend = S3Backend::new("datasets-bucket");
        assert_eq!(
            backend.url("alice", "survey-data"),
            "s3://datasets-bucket/git/alice/survey-data.git"
        );
    }

    #[test]
    fn test_s3_backend_from_url() {
        let backend = S3Backend::from_url("s3://my-bucket/git/alice/demo.git").unwrap();
        assert_eq!(backend.url("bob", "x"), "s3://my-bucket/git/bob/x.git");

        assert!(S3Backend::from_url("https://example.com/repo.git").is_err());
        assert!(S3Backend::from_url("s3://").is_err());
    }

    #[test]
    fn test_backend_selection_by_scheme() {
        assert!(backend_for_url("s3://bucket/git/a/b.git")
            .unwrap()
            .is_some());
        assert!(backend_for_url("https://example.com/a/b.git")
            .unwrap()
            .is_none());
        assert!(backend_for_url("/srv/git/a/b.git").unwrap().is_none());
    }
}
