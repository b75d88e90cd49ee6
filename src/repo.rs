use colored::*;
use git2::Repository;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

use crate::backend::StorageBackend;
use crate::config::Config;
use crate::error::{DatakitError, Result};
use crate::mapper::FileEntry;

/// Identity of one dataset repository. At most one local working copy and
/// one server-side repository exist per key, and the manager never hands
/// out two registrations for the same key within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub username: String,
    pub reponame: String,
}

impl RepoKey {
    pub fn new(username: impl Into<String>, reponame: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            reponame: reponame.into(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.username, self.reponame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Plain git transport; the remote is whatever URL git understands.
    Git,
    /// git composed with an object store holding the canonical copy.
    GitS3,
}

impl BackendKind {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("s3://") {
            BackendKind::GitS3
        } else {
            BackendKind::Git
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    pub username: String,
    pub reponame: String,
    /// Local working copy directory.
    pub rootdir: PathBuf,
    pub remote_url: String,
    pub backend_kind: BackendKind,
}

impl RepositoryHandle {
    pub fn key(&self) -> RepoKey {
        RepoKey::new(self.username.clone(), self.reponame.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Success,
    Error,
}

/// Outcome of a best-effort repository operation. Failures here are
/// expected (network, auth, nothing to commit) and reported as data rather
/// than raised; the type is must_use so callers cannot drop a reported
/// error on the floor without the compiler noticing.
#[must_use = "operational failures are reported here, not raised; check status before proceeding"]
#[derive(Debug, Clone)]
pub struct OpResult {
    pub status: OpStatus,
    pub message: String,
}

impl OpResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OpStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OpStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OpStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == OpStatus::Error
    }
}

/// Settings recognized by [`GitRepoManager::apply_settings`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub enable: bool,
    pub per_dataset_repo: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            enable: true,
            per_dataset_repo: true,
        }
    }
}

/// Git-backed repository manager keyed by (username, reponame).
///
/// Structural problems (repo already exists, repo not found, invalid
/// settings) raise [`DatakitError`]; git porcelain failures on push,
/// commit, status, log, stash and staging come back as [`OpResult`].
pub struct GitRepoManager {
    config: Config,
    repos: HashMap<RepoKey, RepositoryHandle>,
}

impl GitRepoManager {
    pub fn new(config: Config) -> Result<Self> {
        which::which("git").map_err(|_| DatakitError::GitBinaryMissing)?;
        Ok(Self {
            config,
            repos: HashMap::new(),
        })
    }

    /// Create a new server-side repository plus a local working copy.
    ///
    /// With `force` the pre-existing directories are destroyed and
    /// recreated; callers are expected to confirm with the user first.
    /// A backend, when supplied, receives the freshly initialized bare
    /// repository and owns the remote-location lifecycle.
    pub async fn init(
        &mut self,
        username: &str,
        reponame: &str,
        force: bool,
        backend: Option<&dyn StorageBackend>,
    ) -> Result<RepositoryHandle> {
        let server_repodir = self.config.server_repo_path(username, reponame);

        if server_repodir.exists() && !force {
            return Err(DatakitError::AlreadyExists {
                username: username.to_string(),
                reponame: reponame.to_string(),
            });
        }
        if server_repodir.exists() {
            fs::remove_dir_all(&server_repodir).await?;
        }
        fs::create_dir_all(&server_repodir).await?;

        self.run_git(&server_repodir, &["init", "--bare"]).await?;
        // Pin the unborn HEAD so fresh clones agree on the default branch
        // regardless of the host git's init.defaultBranch.
        let head_ref = format!("refs/heads/{}", self.config.git_settings.default_branch);
        self.run_git(&server_repodir, &["symbolic-ref", "HEAD", head_ref.as_str()])
            .await?;

        if let Some(backend) = backend {
            backend.init_repo(username, reponame, &server_repodir)?;
        }

        let repodir = self.config.repo_path(username, reponame);
        if repodir.exists() && !force {
            return Err(DatakitError::AlreadyExists {
                username: username.to_string(),
                reponame: reponame.to_string(),
            });
        }
        if repodir.exists() {
            fs::remove_dir_all(&repodir).await?;
        }
        let parent = repodir
            .parent()
            .ok_or_else(|| DatakitError::CannotLoadRepo(repodir.display().to_string()))?;
        fs::create_dir_all(parent).await?;

        let server = server_repodir.display().to_string();
        self.run_git(parent, &["clone", "--no-hardlinks", &server, reponame])
            .await?;
        self.ensure_commit_identity(&repodir).await?;

        let remote_url = match backend {
            Some(backend) => backend.url(username, reponame),
            None => server,
        };

        let handle = RepositoryHandle {
            username: username.to_string(),
            reponame: reponame.to_string(),
            rootdir: repodir,
            remote_url: remote_url.clone(),
            backend_kind: BackendKind::from_url(&remote_url),
        };
        self.register(handle.clone());

        Ok(handle)
    }

    /// Clone an existing repository. The reponame is the URL's final path
    /// segment minus any `.git` suffix.
    ///
    /// Without a backend this is a direct `git clone`. With one, the
    /// backend first stages a server-side bare copy locally and the clone
    /// runs against that stage (two-hop clone).
    pub async fn clone_from(
        &mut self,
        username: &str,
        url: &str,
        backend: Option<&dyn StorageBackend>,
    ) -> Result<RepositoryHandle> {
        let reponame = reponame_from_url(url)?;
        let repodir = self.config.repo_path(username, &reponame);

        if repodir.exists() {
            return Err(DatakitError::AlreadyExists {
                username: username.to_string(),
                reponame,
            });
        }

        let parent = repodir
            .parent()
            .ok_or_else(|| DatakitError::CannotLoadRepo(repodir.display().to_string()))?;
        fs::create_dir_all(parent).await?;

        match backend {
            None => {
                self.run_git(parent, &["clone", url, &reponame]).await?;
            }
            Some(backend) => {
                let server_repodir = self.config.server_repo_path(username, &reponame);
                if server_repodir.exists() {
                    return Err(DatakitError::AlreadyExists {
                        username: username.to_string(),
                        reponame,
                    });
                }
                backend.clone_repo(url, &server_repodir)?;

                let server = server_repodir.display().to_string();
                self.run_git(parent, &["clone", "--no-hardlinks", &server, &reponame])
                    .await?;
            }
        }

        let handle = RepositoryHandle {
            username: username.to_string(),
            reponame: reponame.clone(),
            rootdir: repodir,
            remote_url: url.to_string(),
            backend_kind: BackendKind::from_url(url),
        };
        self.register(handle.clone());

        Ok(handle)
    }

    /// Return the handle registered for `key`. Registration happens only
    /// through `init`, `clone_from`, or the workspace rescan in
    /// `apply_settings`.
    pub fn lookup(&self, key: &RepoKey) -> Result<RepositoryHandle> {
        self.repos
            .get(key)
            .cloned()
            .ok_or_else(|| DatakitError::NotFound {
                username: key.username.clone(),
                reponame: key.reponame.clone(),
            })
    }

    pub fn registered_keys(&self) -> Vec<RepoKey> {
        self.repos.keys().cloned().collect()
    }

    /// Push the default branch to "origin". Never raises for git failures:
    /// push errors are common (network, auth) and must not abort the
    /// broader workflow.
    pub async fn push(&self, key: &RepoKey) -> Result<OpResult> {
        let repo = self.lookup(key)?;
        println!(
            "{} Pushing to {} from {}",
            "⬆️".bright_cyan(),
            self.config.git_settings.remote_name.bright_white(),
            repo.rootdir.display()
        );

        let result = match self
            .run_git(
                &repo.rootdir,
                &[
                    "push",
                    &self.config.git_settings.remote_name,
                    &self.config.git_settings.default_branch,
                ],
            )
            .await
        {
            Ok(output) => OpResult::success(output),
            Err(e) => OpResult::error(e.to_string()),
        };

        Ok(result)
    }

    /// Stage all tracked changes and commit with the given message.
    pub async fn commit(&self, key: &RepoKey, message: &str) -> Result<OpResult> {
        let repo = self.lookup(key)?;
        let result = match self
            .run_git(&repo.rootdir, &["commit", "-a", "-m", message])
            .await
        {
            Ok(output) => OpResult::success(output),
            Err(e) => OpResult::error(e.to_string()),
        };
        Ok(result)
    }

    /// Working-copy status summary, built in-process via libgit2.
    pub fn status(&self, key: &RepoKey) -> Result<OpResult> {
        let repo = self.lookup(key)?;

        let result = match Repository::open(&repo.rootdir) {
            Ok(git_repo) => match git_repo.statuses(None) {
                Ok(statuses) => {
                    let mut lines = Vec::new();
                    for entry in statuses.iter() {
                        let path = entry.path().unwrap_or("").to_string();
                        let flags = entry.status();
                        let marker = if flags.is_wt_new() || flags.is_index_new() {
                            "A"
                        } else if flags.is_wt_deleted() || flags.is_index_deleted() {
                            "D"
                        } else {
                            "M"
                        };
                        lines.push(format!("{} {}", marker, path));
                    }
                    if lines.is_empty() {
                        OpResult::success("working copy clean")
                    } else {
                        OpResult::success(lines.join("\n"))
                    }
                }
                Err(e) => OpResult::error(e.to_string()),
            },
            Err(e) => OpResult::error(e.to_string()),
        };

        Ok(result)
    }

    pub async fn log(&self, key: &RepoKey) -> Result<OpResult> {
        let repo = self.lookup(key)?;
        let result = match self.run_git(&repo.rootdir, &["log"]).await {
            Ok(output) => OpResult::success(output),
            Err(e) => OpResult::error(e.to_string()),
        };
        Ok(result)
    }

    pub async fn stash(&self, key: &RepoKey) -> Result<OpResult> {
        let repo = self.lookup(key)?;
        let result = match self.run_git(&repo.rootdir, &["stash"]).await {
            Ok(output) => OpResult::success(output),
            Err(e) => OpResult::error(e.to_string()),
        };
        Ok(result)
    }

    /// Stage paths that are already present inside the working copy.
    pub async fn add_raw(&self, key: &RepoKey, files: &[PathBuf]) -> Result<OpResult> {
        let repo = self.lookup(key)?;

        let mut args: Vec<String> = vec!["add".to_string(), "--".to_string()];
        args.extend(files.iter().map(|f| f.display().to_string()));
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

        let result = match self.run_git(&repo.rootdir, &arg_refs).await {
            Ok(_) => OpResult::success(format!("staged {} path(s)", files.len())),
            Err(e) => OpResult::error(e.to_string()),
        };
        Ok(result)
    }

    /// Copy external files into the working copy at their mapped relative
    /// path and stage them. Existing destinations are overwritten without
    /// warning: re-collection is idempotent.
    pub async fn add_files(&self, key: &RepoKey, entries: &[FileEntry]) -> Result<OpResult> {
        let repo = self.lookup(key)?;

        let progress = if self.config.collect_settings.show_progress && !entries.is_empty() {
            let bar = ProgressBar::new(entries.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message("staging");
            Some(bar)
        } else {
            None
        };

        let mut staged = 0usize;
        for entry in entries {
            let target = repo.rootdir.join(&entry.relative_path);

            let copy_and_stage = async {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::copy(&entry.source_path, &target).await?;
                let relative = entry.relative_path.display().to_string();
                self.run_git(&repo.rootdir, &["add", "--", &relative])
                    .await?;
                Ok::<(), DatakitError>(())
            };

            if let Err(e) = copy_and_stage.await {
                if let Some(bar) = &progress {
                    bar.finish_and_clear();
                }
                return Ok(OpResult::error(format!(
                    "failed to stage {}: {}",
                    entry.source_path.display(),
                    e
                )));
            }

            staged += 1;
            if let Some(bar) = &progress {
                bar.inc(1);
            } else {
                println!(
                    "   {} => {}",
                    entry.source_path.display().to_string().dimmed(),
                    entry.relative_path.display()
                );
            }
        }

        if let Some(bar) = &progress {
            bar.finish_and_clear();
        }

        Ok(OpResult::success(format!("staged {} file(s)", staged)))
    }

    /// Declared configuration schema: recognized settings and defaults.
    pub fn config_schema(&self) -> serde_json::Value {
        json!({
            "name": "git",
            "nature": "repomanager",
            "variables": ["enable", "per_dataset_repo"],
            "defaults": {
                "enable": {
                    "value": true,
                    "description": "Use git for storing datasets",
                },
                "per_dataset_repo": {
                    "value": true,
                    "description": "Use one repository for each dataset",
                },
            }
        })
    }

    /// Apply manager settings. When enabled, rescans the workspace and
    /// rebuilds the in-memory registry from on-disk repositories carrying
    /// a valid package descriptor.
    pub async fn apply_settings(&mut self, settings: &ManagerSettings) -> Result<()> {
        if !settings.enable {
            return Ok(());
        }
        if !settings.per_dataset_repo {
            return Err(DatakitError::InvalidConfig(
                "a global repository for all datasets is not supported".to_string(),
            ));
        }

        self.refresh_registry().await
    }

    /// Rescan `<workspace>/datasets/<user>/<repo>` and re-register every
    /// directory with a valid package descriptor. Directories missing (or
    /// with an unreadable) descriptor are skipped with a warning.
    async fn refresh_registry(&mut self) -> Result<()> {
        let datasets_dir = self.config.datasets_dir();
        if !datasets_dir.exists() {
            return Ok(());
        }

        let mut users = fs::read_dir(&datasets_dir).await?;
        while let Some(user_entry) = users.next_entry().await? {
            if !user_entry.file_type().await?.is_dir() {
                continue;
            }
            let username = user_entry.file_name().to_string_lossy().into_owned();

            let mut repos = fs::read_dir(user_entry.path()).await?;
            while let Some(repo_entry) = repos.next_entry().await? {
                if !repo_entry.file_type().await?.is_dir() {
                    continue;
                }
                let reponame = repo_entry.file_name().to_string_lossy().into_owned();
                let rootdir = repo_entry.path();

                let descriptor = rootdir.join(crate::defaults::PACKAGE_DESCRIPTOR);
                let valid = match fs::read_to_string(&descriptor).await {
                    Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents).is_ok(),
                    Err(_) => false,
                };
                if !valid {
                    println!(
                        "{} Invalid dataset: {}/{} at {} (missing or unreadable {}), skipping",
                        "⚠️".bright_yellow(),
                        username,
                        reponame,
                        rootdir.display(),
                        crate::defaults::PACKAGE_DESCRIPTOR
                    );
                    continue;
                }

                let remote_url = remote_url_of(&rootdir, &self.config.git_settings.remote_name)
                    .unwrap_or_default();

                self.register(RepositoryHandle {
                    username: username.clone(),
                    reponame,
                    rootdir,
                    backend_kind: BackendKind::from_url(&remote_url),
                    remote_url,
                });
            }
        }

        Ok(())
    }

    fn register(&mut self, handle: RepositoryHandle) {
        self.repos.insert(handle.key(), handle);
    }

    /// Run a git subcommand in `cwd`; non-zero exit becomes
    /// a structural `CommandFailed`. Callers that treat failure as
    /// operational convert it into an `OpResult` at the call site.
    async fn run_git(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(cwd)
            .args(args)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(DatakitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Automated commits need an identity; leave any user-level identity
    /// alone and pin a repo-local one only when none resolves.
    async fn ensure_commit_identity(&self, repodir: &Path) -> Result<()> {
        if self.run_git(repodir, &["config", "user.email"]).await.is_err() {
            self.run_git(repodir, &["config", "user.email", "datakit@localhost"])
                .await?;
            self.run_git(repodir, &["config", "user.name", "datakit"])
                .await?;
        }
        Ok(())
    }
}

/// Final URL path segment minus any `.git` suffix.
pub fn reponame_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() {
        return Err(DatakitError::InvalidRemoteUrl {
            url: url.to_string(),
        });
    }
    Ok(name.to_string())
}

fn remote_url_of(rootdir: &Path, remote_name: &str) -> Option<String> {
    let repo = Repository::open(rootdir).ok()?;
    let remote = repo.find_remote(remote_name).ok()?;
    remote.url().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reponame_from_url() {
        assert_eq!(
            reponame_from_url("s3://bucket/git/alice/hello.git").unwrap(),
            "hello"
        );
        assert_eq!(
            reponame_from_url("https://example.com/alice/hello").unwrap(),
            "hello"
        );
        assert_eq!(reponame_from_url("/srv/git/data.git/").unwrap(), "data");
        assert!(reponame_from_url("").is_err());
    }

    #[test]
    fn test_backend_kind_from_url() {
        assert_eq!(
            BackendKind::from_url("s3://bucket/git/a/b.git"),
            BackendKind::GitS3
        );
        assert_eq!(
            BackendKind::from_url("https://example.com/a/b.git"),
            BackendKind::Git
        );
    }

    #[test]
    fn test_op_result_accessors() {
        assert!(OpResult::success("ok").is_success());
        assert!(OpResult::error("boom").is_error());
    }

    #[test]
    fn test_config_schema_declares_settings_and_defaults() {
        let manager = GitRepoManager::new(Config::default()).unwrap();
        let schema = manager.config_schema();

        assert_eq!(schema["name"], "git");
        assert_eq!(schema["nature"], "repomanager");

        let variables: Vec<&str> = schema["variables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(variables, vec!["enable", "per_dataset_repo"]);

        assert_eq!(schema["defaults"]["enable"]["value"], true);
        assert_eq!(schema["defaults"]["per_dataset_repo"]["value"], true);
    }
}
