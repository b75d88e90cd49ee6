use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Global tool configuration, persisted at `~/.config/datakit/config.toml`.
/// Per-project settings live in `datakit.json` next to the data; see
/// [`crate::project::ProjectConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub git_settings: GitSettings,
    pub collect_settings: CollectSettings,
    pub backend_settings: BackendSettings,
    pub metadata_settings: MetadataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    pub default_branch: String,
    pub remote_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectSettings {
    /// What to do when the push to the remote reports failure: keep going
    /// and post metadata anyway, or abort the run.
    pub on_push_failure: PushFailurePolicy,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushFailurePolicy {
    Continue,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// S3 bucket hosting canonical remote copies. When set, generated
    /// remote URL candidates take the form `s3://<bucket>/git/<user>/<repo>.git`.
    pub s3_bucket: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Metadata servers that collected dataset summaries are posted to.
    #[serde(default)]
    pub servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            workspace_root: home_dir.join(".datakit"),
            git_settings: GitSettings {
                default_branch: "master".to_string(),
                remote_name: "origin".to_string(),
            },
            collect_settings: CollectSettings {
                on_push_failure: PushFailurePolicy::Continue,
                show_progress: true,
            },
            backend_settings: BackendSettings { s3_bucket: None },
            metadata_settings: MetadataSettings::default(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;

            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("datakit");

        Ok(config_dir.join("config.toml"))
    }

    /// Root directory for local working copies: `<workspace>/datasets/<user>/<repo>`.
    pub fn datasets_dir(&self) -> PathBuf {
        self.workspace_root.join("datasets")
    }

    /// Root directory for server-side bare repositories. The local
    /// filesystem acts as the "server" when no object-store backend is
    /// composed in.
    pub fn server_dir(&self) -> PathBuf {
        self.workspace_root.join("server")
    }

    pub fn repo_path(&self, username: &str, reponame: &str) -> PathBuf {
        self.datasets_dir().join(username).join(reponame)
    }

    pub fn server_repo_path(&self, username: &str, reponame: &str) -> PathBuf {
        self.server_dir()
            .join(username)
            .join(format!("{}.git", reponame))
    }

    pub fn metadata_servers(&self) -> Vec<String> {
        self.metadata_settings.servers.clone()
    }

    /// Config rooted at an explicit workspace directory; used by tests and
    /// by anyone running several isolated workspaces side by side.
    pub fn with_workspace_root(root: &Path) -> Self {
        Self {
            workspace_root: root.to_path_buf(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.git_settings.default_branch, "master");
        assert_eq!(config.git_settings.remote_name, "origin");
        assert_eq!(
            config.collect_settings.on_push_failure,
            PushFailurePolicy::Continue
        );
        assert!(config.backend_settings.s3_bucket.is_none());
    }

    #[tokio::test]
    async fn test_config_paths() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_workspace_root(temp.path());

        let repo_path = config.repo_path("alice", "survey-data");
        assert!(repo_path.ends_with("datasets/alice/survey-data"));

        let server_path = config.server_repo_path("alice", "survey-data");
        assert!(server_path.ends_with("server/alice/survey-data.git"));
    }

    #[tokio::test]
    async fn test_config_toml_round_trip() {
        let mut config = Config::default();
        config.collect_settings.on_push_failure = PushFailurePolicy::Abort;
        config.backend_settings.s3_bucket = Some("datasets-bucket".to_string());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let reloaded: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(
            reloaded.collect_settings.on_push_failure,
            PushFailurePolicy::Abort
        );
        assert_eq!(
            reloaded.backend_settings.s3_bucket.as_deref(),
            Some("datasets-bucket")
        );
    }
}
