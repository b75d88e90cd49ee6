use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{DatakitError, Result};
use crate::prompt::DecisionProvider;

/// Per-project settings, persisted as `datakit.json` in the project
/// directory. The on-disk key names are fixed; loading a previously
/// written file must reproduce an equivalent structure with no data loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub username: String,
    pub reponame: String,
    pub remoteurl: String,
    #[serde(rename = "working-directory")]
    pub working_directory: PathBuf,
    #[serde(default)]
    pub track: TrackRules,
    #[serde(default)]
    pub import: ImportRules,
    #[serde(default)]
    pub validate: ValidateRules,
    #[serde(
        rename = "metadata-management",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<MetadataOptions>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackRules {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportRules {
    /// Ordered prefix -> prefix rewrite table. Selection is
    /// longest-prefix-first regardless of insertion order; the order is
    /// kept only so the file round-trips byte-stable.
    #[serde(rename = "directory-mapping", default)]
    pub directory_mapping: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidateRules {
    #[serde(rename = "content-rule-validator", default)]
    pub content_rule_validator: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataOptions {
    pub servers: Vec<String>,
    #[serde(rename = "include-code-history", default)]
    pub include_code_history: Vec<String>,
    #[serde(
        rename = "include-preview",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub include_preview: Option<PreviewOptions>,
    #[serde(rename = "include-data-history", default)]
    pub include_data_history: bool,
    #[serde(rename = "include-schema", default)]
    pub include_schema: Vec<String>,
    #[serde(rename = "include-tab-diffs", default)]
    pub include_tab_diffs: Vec<String>,
    #[serde(rename = "include-platform", default)]
    pub include_platform: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewOptions {
    pub length: usize,
    pub files: Vec<String>,
}

/// Result of resolving the project config at the start of a run.
#[derive(Debug)]
pub enum ProjectInit {
    /// An existing config file was loaded.
    Loaded(ProjectConfig),
    /// A fresh config was generated; the user should edit it and rerun.
    Generated(PathBuf),
}

impl ProjectConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(|e| {
            DatakitError::InvalidConfig(format!(
                "{}: {}",
                path.display(),
                e
            ))
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| DatakitError::InvalidConfig(e.to_string()))?;
        fs::write(path, contents).await?;
        Ok(())
    }

    /// Load the config at `path`, or interactively generate one when it is
    /// missing (or when `force_init` asks for regeneration). Generation is
    /// a terminal state for the run: the user is expected to review the
    /// file before the first real collection.
    pub async fn load_or_generate(
        path: &Path,
        force_init: bool,
        prompter: &dyn DecisionProvider,
        config: &Config,
    ) -> Result<ProjectInit> {
        if path.exists() && !force_init {
            return Ok(ProjectInit::Loaded(Self::load(path).await?));
        }

        let generated = Self::generate(path, prompter, config).await?;
        generated.save(path).await?;
        Ok(ProjectInit::Generated(path.to_path_buf()))
    }

    async fn generate(
        path: &Path,
        prompter: &dyn DecisionProvider,
        config: &Config,
    ) -> Result<Self> {
        let username = prompter.input_with_default("Please specify username", &default_username())?;

        let reponame_default = std::env::current_dir()
            .ok()
            .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let reponame = prompter.input_with_default("Please specify repo name", &reponame_default)?;

        // Offer a candidate URL only when an object-store backend is
        // configured; a plain local setup has no meaningful remote to guess.
        let url_candidate = config
            .backend_settings
            .s3_bucket
            .as_ref()
            .map(|bucket| format!("s3://{}/git/{}/{}.git", bucket, username, reponame))
            .unwrap_or_default();
        let remoteurl = prompter.input_with_default("Please specify remote URL", &url_candidate)?;

        let config_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::defaults::PROJECT_CONFIG_NAME.to_string());

        let mut directory_mapping = IndexMap::new();
        directory_mapping.insert(".".to_string(), "".to_string());

        let mut project = ProjectConfig {
            username,
            reponame,
            remoteurl,
            working_directory: PathBuf::from("."),
            track: TrackRules {
                includes: ["*.csv", "*.tsv", "*.txt", "*.json"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                excludes: vec![".git".to_string(), ".svn".to_string(), config_filename],
            },
            import: ImportRules { directory_mapping },
            validate: ValidateRules {
                content_rule_validator: vec!["*.csv".to_string(), "*.tsv".to_string()],
            },
            metadata: None,
        };

        if !config.metadata_servers().is_empty() {
            project.metadata = Some(MetadataOptions {
                servers: config.metadata_servers(),
                include_code_history: find_executable_files(Path::new(".")),
                include_preview: Some(PreviewOptions {
                    length: 512,
                    files: vec!["*.txt".to_string(), "*.csv".to_string(), "*.tsv".to_string()],
                }),
                include_data_history: true,
                include_schema: vec!["*.csv".to_string(), "*.tsv".to_string()],
                include_tab_diffs: vec!["*.csv".to_string(), "*.tsv".to_string()],
                include_platform: true,
            });
        }

        Ok(project)
    }
}

/// Best-guess login name for the username prompt default. Minimal
/// environments (containers, cron) often run without `USER`/`USERNAME`
/// set; the home directory's name covers those.
fn default_username() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
        .or_else(|| {
            dirs::home_dir()
                .and_then(|home| home.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_default()
}

/// Find up to five executables near the project root; recorded in the
/// generated metadata block as the code responsible for this dataset.
pub fn find_executable_files(root: &Path) -> Vec<String> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if is_executable(entry.path()) {
            let relative = pathdiff::diff_paths(entry.path(), root)
                .unwrap_or_else(|| entry.path().to_path_buf());
            found.push(relative.to_string_lossy().into_owned());
            if found.len() >= 5 {
                break;
            }
        }
    }

    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> ProjectConfig {
        let mut directory_mapping = IndexMap::new();
        directory_mapping.insert("data/raw".to_string(), "".to_string());
        directory_mapping.insert(".".to_string(), "archive/".to_string());

        ProjectConfig {
            username: "alice".to_string(),
            reponame: "survey-data".to_string(),
            remoteurl: "s3://bucket/git/alice/survey-data.git".to_string(),
            working_directory: PathBuf::from("."),
            track: TrackRules {
                includes: vec!["*.csv".to_string(), "*.tsv".to_string()],
                excludes: vec![".git".to_string(), "datakit.json".to_string()],
            },
            import: ImportRules { directory_mapping },
            validate: ValidateRules {
                content_rule_validator: vec!["*.csv".to_string()],
            },
            metadata: None,
        }
    }

    #[test]
    fn test_json_round_trip_preserves_structure() {
        let project = sample_project();

        let serialized = serde_json::to_string_pretty(&project).unwrap();
        let reloaded: ProjectConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(project, reloaded);

        // Include/exclude entry order survives the trip.
        assert_eq!(reloaded.track.includes, vec!["*.csv", "*.tsv"]);
        let keys: Vec<&str> = reloaded
            .import
            .directory_mapping
            .keys()
            .map(|k| k.as_str())
            .collect();
        assert_eq!(keys, vec!["data/raw", "."]);
    }

    #[test]
    fn test_on_disk_key_names() {
        let project = sample_project();
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&project).unwrap()).unwrap();

        assert!(value.get("working-directory").is_some());
        assert!(value["track"].get("includes").is_some());
        assert!(value["import"].get("directory-mapping").is_some());
        assert!(value["validate"].get("content-rule-validator").is_some());
        // Absent optional block is omitted entirely, not serialized as null.
        assert!(value.get("metadata-management").is_none());
    }

    #[test]
    fn test_missing_optional_blocks_default_to_absent() {
        let minimal = r#"{
            "username": "bob",
            "reponame": "demo",
            "remoteurl": "",
            "working-directory": "."
        }"#;

        let project: ProjectConfig = serde_json::from_str(minimal).unwrap();
        assert!(project.metadata.is_none());
        assert!(project.track.includes.is_empty());
        assert!(project.import.directory_mapping.is_empty());
    }

    #[test]
    fn test_default_username_falls_back_to_home_dir_name() {
        let saved_user = std::env::var("USER").ok();
        let saved_username = std::env::var("USERNAME").ok();
        std::env::remove_var("USER");
        std::env::remove_var("USERNAME");

        let fallback = default_username();
        let home_name = dirs::home_dir()
            .and_then(|home| home.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        assert_eq!(fallback, home_name);

        if let Some(value) = saved_user {
            std::env::set_var("USER", value);
        }
        if let Some(value) = saved_username {
            std::env::set_var("USERNAME", value);
        }
    }

    #[test]
    fn test_metadata_block_round_trip() {
        let mut project = sample_project();
        project.metadata = Some(MetadataOptions {
            servers: vec!["https://metadata.example.com".to_string()],
            include_code_history: vec!["run.sh".to_string()],
            include_preview: Some(PreviewOptions {
                length: 512,
                files: vec!["*.csv".to_string()],
            }),
            include_data_history: true,
            include_schema: vec!["*.csv".to_string()],
            include_tab_diffs: vec![],
            include_platform: true,
        });

        let serialized = serde_json::to_string(&project).unwrap();
        let reloaded: ProjectConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(project, reloaded);
    }
}
