use anyhow::{Context, Result};
use chrono::Local;
use colored::*;
use std::path::{Path, PathBuf};

use crate::backend::backend_for_url;
use crate::config::{Config, PushFailurePolicy};
use crate::discovery::discover_files;
use crate::error::DatakitError;
use crate::mapper::ImportMapper;
use crate::metadata::{write_package_descriptor, MetadataPoster};
use crate::project::{ProjectConfig, ProjectInit};
use crate::prompt::DecisionProvider;
use crate::repo::{GitRepoManager, ManagerSettings, OpResult, RepoKey, RepositoryHandle};

/// Outcome of one `collect` invocation.
#[derive(Debug)]
pub enum CollectOutcome {
    /// First run: a config file was generated; the user should edit it and
    /// rerun. Not a failure.
    ConfigGenerated(PathBuf),
    Completed(CollectSummary),
}

#[derive(Debug)]
pub struct CollectSummary {
    pub key: RepoKey,
    pub staged: usize,
    pub commit: OpResult,
    pub push: OpResult,
    pub metadata: OpResult,
}

/// Sequential collection pipeline: load config, obtain the repository,
/// discover files, map and stage them, commit, push, post metadata. One
/// run owns the working copy exclusively; nothing here is concurrent.
pub struct Collector {
    config: Config,
    poster: MetadataPoster,
}

impl Collector {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            poster: MetadataPoster::new(),
        }
    }

    pub async fn run(
        &self,
        project_path: &Path,
        force_init: bool,
        prompter: &dyn DecisionProvider,
    ) -> Result<CollectOutcome> {
        // Configured
        let project = match ProjectConfig::load_or_generate(
            project_path,
            force_init,
            prompter,
            &self.config,
        )
        .await?
        {
            ProjectInit::Loaded(project) => project,
            ProjectInit::Generated(path) => {
                println!(
                    "{} Generated config file: {}",
                    "📝".bright_green(),
                    path.display()
                );
                println!("Please edit it and rerun the collection.");
                println!("You could consider committing it to the code repository.");
                return Ok(CollectOutcome::ConfigGenerated(path));
            }
        };

        let mut manager =
            GitRepoManager::new(self.config.clone()).context("Failed to set up the repository manager")?;
        manager
            .apply_settings(&ManagerSettings::default())
            .await
            .context("Failed to scan the workspace for existing repositories")?;

        // RepositoryReady
        let handle = self.resolve_repository(&mut manager, &project, prompter).await?;
        let key = handle.key();

        // FilesDiscovered
        let discovered = discover_files(
            &project.working_directory,
            &project.track.includes,
            &project.track.excludes,
        )?;
        println!(
            "{} Discovered {} file(s) to collect",
            "🔍".bright_cyan(),
            discovered.len()
        );

        // FilesStaged
        let mapper = ImportMapper::new(&project.import.directory_mapping);
        let entries: Vec<_> = discovered
            .iter()
            .map(|relative| mapper.entry(&project.working_directory, relative))
            .collect();

        let staging = manager.add_files(&key, &entries).await?;
        if staging.is_error() {
            println!(
                "{} Staging reported a failure: {}",
                "⚠️".bright_yellow(),
                staging.message
            );
        }

        let descriptor_path = write_package_descriptor(&handle, &project, &entries).await?;
        let descriptor_relative = descriptor_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or(descriptor_path);
        let descriptor_staged = manager.add_raw(&key, &[descriptor_relative]).await?;
        if descriptor_staged.is_error() {
            println!(
                "{} Could not stage the package descriptor: {}",
                "⚠️".bright_yellow(),
                descriptor_staged.message
            );
        }

        // Committed
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S");
        let commit = manager
            .commit(&key, &format!("Automatic commit on {}", timestamp))
            .await?;
        if commit.is_error() {
            println!(
                "{} Commit reported a failure: {}",
                "⚠️".bright_yellow(),
                commit.message.trim()
            );
        }

        // Pushed
        let push = manager.push(&key).await?;
        if push.is_error() {
            match self.config.collect_settings.on_push_failure {
                PushFailurePolicy::Abort => {
                    anyhow::bail!("push to remote failed, aborting run: {}", push.message.trim());
                }
                PushFailurePolicy::Continue => {
                    println!(
                        "{} Push reported a failure (continuing): {}",
                        "⚠️".bright_yellow(),
                        push.message.trim()
                    );
                }
            }
        }

        // MetadataPosted
        let metadata = self.poster.post(&handle, &project, &entries).await;
        if metadata.is_error() {
            println!(
                "{} Metadata posting reported a failure: {}",
                "⚠️".bright_yellow(),
                metadata.message
            );
        }

        Ok(CollectOutcome::Completed(CollectSummary {
            key,
            staged: entries.len(),
            commit,
            push,
            metadata,
        }))
    }

    /// Lookup, then clone, then (after user confirmation) force-create.
    /// Declining the final prompt aborts the run with `CannotLoadRepo`.
    async fn resolve_repository(
        &self,
        manager: &mut GitRepoManager,
        project: &ProjectConfig,
        prompter: &dyn DecisionProvider,
    ) -> Result<RepositoryHandle> {
        let key = RepoKey::new(project.username.clone(), project.reponame.clone());

        if let Ok(handle) = manager.lookup(&key) {
            return Ok(handle);
        }

        println!(
            "{} Repository {} not registered, trying to clone {}",
            "📦".bright_cyan(),
            key.to_string().bright_white(),
            project.remoteurl
        );

        let clone_attempt = async {
            let backend = backend_for_url(&project.remoteurl)?;
            manager
                .clone_from(&project.username, &project.remoteurl, backend.as_deref())
                .await
        };
        match clone_attempt.await {
            Ok(handle) => {
                println!("{} Clone successful", "✅".bright_green());
                return Ok(handle);
            }
            Err(e) => {
                println!("{} Could not clone: {}", "ℹ️".bright_yellow(), e);
            }
        }

        let create = prompter.confirm(
            "Repository does not exist and could not be cloned. Create a new one?",
            false,
        )?;
        if !create {
            return Err(DatakitError::CannotLoadRepo(key.to_string()).into());
        }

        // force=true: the user just confirmed the destructive path.
        let backend = backend_for_url(&project.remoteurl).ok().flatten();
        let handle = manager
            .init(&project.username, &project.reponame, true, backend.as_deref())
            .await?;
        println!(
            "{} Initialized new repository {}",
            "✅".bright_green(),
            key.to_string().bright_white()
        );

        Ok(handle)
    }
}
