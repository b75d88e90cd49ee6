use chrono::Utc;
use colored::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;

use crate::error::Result;
use crate::mapper::FileEntry;
use crate::project::ProjectConfig;
use crate::repo::{OpResult, RepositoryHandle};

/// Package descriptor written to the repository root. Its presence is the
/// marker that workspace rescans use to recognize a managed repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub owner: String,
    pub remoteurl: String,
    #[serde(rename = "collected-at")]
    pub collected_at: String,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
}

/// Write (or refresh) the package descriptor for this collection run and
/// return its path inside the working copy so it can be staged.
pub async fn write_package_descriptor(
    handle: &RepositoryHandle,
    project: &ProjectConfig,
    entries: &[FileEntry],
) -> Result<PathBuf> {
    let descriptor = PackageDescriptor {
        name: handle.reponame.clone(),
        owner: handle.username.clone(),
        remoteurl: project.remoteurl.clone(),
        collected_at: Utc::now().to_rfc3339(),
        resources: entries
            .iter()
            .map(|e| Resource {
                path: e.relative_path.display().to_string(),
            })
            .collect(),
    };

    let path = handle.rootdir.join(crate::defaults::PACKAGE_DESCRIPTOR);
    let contents = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| crate::error::DatakitError::InvalidConfig(e.to_string()))?;
    fs::write(&path, contents).await?;

    Ok(path)
}

/// Posts collection summaries to the configured metadata servers.
/// Best-effort by design: a dead metadata server must never fail a
/// collection run.
pub struct MetadataPoster {
    client: reqwest::Client,
}

impl MetadataPoster {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Hand the collected repository over to the metadata collaborators.
    /// Returns success when no servers are configured; otherwise reports
    /// per-server delivery as one aggregated result.
    pub async fn post(
        &self,
        handle: &RepositoryHandle,
        project: &ProjectConfig,
        entries: &[FileEntry],
    ) -> OpResult {
        let options = match &project.metadata {
            Some(options) if !options.servers.is_empty() => options,
            _ => return OpResult::success("no metadata servers configured"),
        };

        let mut summary = json!({
            "package": {
                "name": handle.reponame,
                "owner": handle.username,
                "remoteurl": project.remoteurl,
                "resources": entries
                    .iter()
                    .map(|e| e.relative_path.display().to_string())
                    .collect::<Vec<_>>(),
            },
            "include-data-history": options.include_data_history,
            "include-schema": options.include_schema,
            "include-tab-diffs": options.include_tab_diffs,
        });

        if !options.include_code_history.is_empty() {
            summary["code-history"] = json!(options.include_code_history);
        }
        if options.include_platform {
            summary["platform"] = json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            });
        }

        let mut failures = Vec::new();
        for server in &options.servers {
            let endpoint = format!("{}/api/datasets", server.trim_end_matches('/'));
            let response = self.client.post(&endpoint).json(&summary).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    println!(
                        "{} Posted metadata to {}",
                        "📬".bright_green(),
                        server.bright_white()
                    );
                }
                Ok(resp) => failures.push(format!("{}: HTTP {}", server, resp.status())),
                Err(e) => failures.push(format!("{}: {}", server, e)),
            }
        }

        if failures.is_empty() {
            OpResult::success(format!("posted to {} server(s)", options.servers.len()))
        } else {
            OpResult::error(failures.join("; "))
        }
    }
}

impl Default for MetadataPoster {
    fn default() -> Self {
        Self::new()
    }
}
