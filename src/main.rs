use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::Path;

use datakit::backend::backend_for_url;
use datakit::cli::{Cli, Commands};
use datakit::{
    CollectOutcome, Collector, Config, DecisionProvider, GitRepoManager, ManagerSettings,
    OpResult, ProjectConfig, RepoKey, TerminalPrompter,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect { config, force_init } => {
            handle_collect_command(&config, force_init).await?;
        }
        Commands::Init {
            username,
            reponame,
            force,
            remote,
        } => {
            handle_init_command(&username, &reponame, force, remote.as_deref()).await?;
        }
        Commands::Clone { url, username } => {
            handle_clone_command(&url, &username).await?;
        }
        Commands::List => {
            handle_list_command().await?;
        }
        Commands::Config => {
            let config = Config::load().await?;
            let manager = GitRepoManager::new(config)?;
            println!("{}", serde_json::to_string_pretty(&manager.config_schema())?);
        }
        Commands::Status => {
            let (manager, key) = project_manager().await?;
            report("Status", manager.status(&key)?);
        }
        Commands::Log => {
            let (manager, key) = project_manager().await?;
            report("Log", manager.log(&key).await?);
        }
        Commands::Push => {
            let (manager, key) = project_manager().await?;
            report("Push", manager.push(&key).await?);
        }
        Commands::Stash => {
            let (manager, key) = project_manager().await?;
            report("Stash", manager.stash(&key).await?);
        }
        Commands::Completion { shell } => {
            handle_completion_command(&shell);
        }
    }

    Ok(())
}

async fn handle_collect_command(config_path: &Path, force_init: bool) -> Result<()> {
    let config = Config::load()
        .await
        .context("Failed to load the datakit configuration")?;
    let collector = Collector::new(config);
    let prompter = TerminalPrompter::new();

    match collector.run(config_path, force_init, &prompter).await? {
        CollectOutcome::ConfigGenerated(_) => {
            // Expected interruption on first run, not a failure.
            Ok(())
        }
        CollectOutcome::Completed(summary) => {
            println!();
            println!(
                "{} Collection complete for {}",
                "✅".bright_green(),
                summary.key.to_string().bright_white()
            );
            println!("   staged: {}", summary.staged);
            print_op_line("commit", &summary.commit);
            print_op_line("push", &summary.push);
            print_op_line("metadata", &summary.metadata);
            Ok(())
        }
    }
}

fn print_op_line(label: &str, result: &OpResult) {
    let status = if result.is_success() {
        "ok".bright_green()
    } else {
        "failed".bright_red()
    };
    println!("   {}: {}", label, status);
}

async fn handle_init_command(
    username: &str,
    reponame: &str,
    force: bool,
    remote: Option<&str>,
) -> Result<()> {
    let config = Config::load().await?;
    let mut manager = GitRepoManager::new(config)?;
    manager.apply_settings(&ManagerSettings::default()).await?;

    let backend = match remote {
        Some(url) => backend_for_url(url)?,
        None => None,
    };

    if force {
        let prompter = TerminalPrompter::new();
        let confirmed = prompter.confirm(
            "Force-init destroys any existing repository at this location. Continue?",
            false,
        )?;
        if !confirmed {
            println!("{} Aborted.", "ℹ️".bright_yellow());
            return Ok(());
        }
    }

    let handle = manager
        .init(username, reponame, force, backend.as_deref())
        .await?;

    println!(
        "{} Initialized repository {}/{} at {}",
        "✅".bright_green(),
        username,
        reponame,
        handle.rootdir.display()
    );
    println!("   remote: {}", handle.remote_url);
    Ok(())
}

async fn handle_clone_command(url: &str, username: &str) -> Result<()> {
    let config = Config::load().await?;
    let mut manager = GitRepoManager::new(config)?;
    manager.apply_settings(&ManagerSettings::default()).await?;

    let backend = backend_for_url(url)?;
    let handle = manager
        .clone_from(username, url, backend.as_deref())
        .await?;

    println!(
        "{} Cloned {} to {}",
        "✅".bright_green(),
        url,
        handle.rootdir.display()
    );
    Ok(())
}

async fn handle_list_command() -> Result<()> {
    let config = Config::load().await?;
    let mut manager = GitRepoManager::new(config)?;
    manager.apply_settings(&ManagerSettings::default()).await?;

    let mut keys = manager.registered_keys();
    keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

    if keys.is_empty() {
        println!(
            "{} No datasets registered in the workspace.",
            "ℹ️".bright_yellow()
        );
        return Ok(());
    }

    for key in keys {
        let handle = manager.lookup(&key)?;
        println!("{} {}", "📦".bright_cyan(), key.to_string().bright_white());
        println!("   path:   {}", handle.rootdir.display());
        if !handle.remote_url.is_empty() {
            println!("   remote: {}", handle.remote_url);
        }
    }

    Ok(())
}

/// Build a manager with the workspace registry loaded and resolve the key
/// of the project config in the current directory.
async fn project_manager() -> Result<(GitRepoManager, RepoKey)> {
    let config = Config::load().await?;
    let project = ProjectConfig::load(Path::new(datakit::defaults::PROJECT_CONFIG_NAME))
        .await
        .context("No datakit.json found here. Run 'datakit collect' to create one.")?;

    let mut manager = GitRepoManager::new(config)?;
    manager.apply_settings(&ManagerSettings::default()).await?;

    Ok((manager, RepoKey::new(project.username, project.reponame)))
}

fn report(label: &str, result: OpResult) {
    if result.is_success() {
        println!("{} {}:", "📋".bright_cyan(), label);
        if !result.message.trim().is_empty() {
            println!("{}", result.message.trim_end());
        }
    } else {
        eprintln!(
            "{} {} failed: {}",
            "❌".bright_red(),
            label,
            result.message.trim()
        );
    }
}

fn handle_completion_command(shell: &clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::{generate, Generator};
    use std::io;

    fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
        generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    }

    let mut cmd = Cli::command();
    print_completions(*shell, &mut cmd);
}
