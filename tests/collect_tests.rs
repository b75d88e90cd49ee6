//! End-to-end collection runs driven by a scripted decision provider.

use anyhow::Result;
use serde_json::json;

use datakit::{CollectOutcome, Collector, ProjectConfig, PushFailurePolicy, ScriptedPrompter};

mod common;
use common::{sample_working_dir, test_config, write_file};

#[tokio::test]
async fn test_first_run_generates_config_and_stops() -> Result<()> {
    let (temp, config) = test_config()?;
    let config_path = temp.path().join("proj").join("datakit.json");
    std::fs::create_dir_all(config_path.parent().unwrap())?;

    let prompter = ScriptedPrompter::new().with_inputs(["alice", "survey", ""]);
    let collector = Collector::new(config);

    let outcome = collector.run(&config_path, false, &prompter).await?;
    assert!(matches!(outcome, CollectOutcome::ConfigGenerated(_)));

    // Generated defaults match the documented track rules.
    let project = ProjectConfig::load(&config_path).await?;
    assert_eq!(project.username, "alice");
    assert_eq!(project.reponame, "survey");
    assert!(project.track.includes.contains(&"*.csv".to_string()));
    assert!(project.track.excludes.contains(&".git".to_string()));
    assert!(project.track.excludes.contains(&"datakit.json".to_string()));
    assert_eq!(
        project.import.directory_mapping.get("."),
        Some(&String::new())
    );

    Ok(())
}

fn project_json(workdir: &std::path::Path) -> serde_json::Value {
    json!({
        "username": "alice",
        "reponame": "autodata",
        "remoteurl": "",
        "working-directory": workdir.display().to_string(),
        "track": {
            "includes": ["*.csv"],
            "excludes": [".git"]
        },
        "import": {
            "directory-mapping": { ".": "" }
        },
        "validate": {
            "content-rule-validator": ["*.csv"]
        }
    })
}

#[tokio::test]
async fn test_collect_stages_exactly_the_matching_files() -> Result<()> {
    let (temp, config) = test_config()?;
    let workdir = sample_working_dir(temp.path())?;

    let config_path = temp.path().join("datakit.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&project_json(&workdir))?,
    )?;

    // Lookup fails, the empty remote URL cannot be cloned, and the user
    // confirms creating a brand-new repository.
    let prompter = ScriptedPrompter::new().with_confirms([true]);
    let collector = Collector::new(config.clone());

    let outcome = collector.run(&config_path, false, &prompter).await?;
    let summary = match outcome {
        CollectOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {:?}", other),
    };

    assert_eq!(summary.staged, 1);
    assert!(summary.commit.is_success(), "{}", summary.commit.message);
    assert!(summary.push.is_success(), "{}", summary.push.message);
    assert!(summary.metadata.is_success());

    let rootdir = config.repo_path("alice", "autodata");
    assert!(rootdir.join("a.csv").exists());
    assert!(!rootdir.join("b.txt").exists());
    assert!(rootdir.join("datapackage.json").exists());

    Ok(())
}

#[tokio::test]
async fn test_second_run_finds_repo_without_prompting() -> Result<()> {
    let (temp, config) = test_config()?;
    let workdir = sample_working_dir(temp.path())?;

    let config_path = temp.path().join("datakit.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&project_json(&workdir))?,
    )?;

    let collector = Collector::new(config);

    let first = ScriptedPrompter::new().with_confirms([true]);
    let outcome = collector.run(&config_path, false, &first).await?;
    assert!(matches!(outcome, CollectOutcome::Completed(_)));

    // The package descriptor written by the first run makes the workspace
    // rescan find the repository; an exhausted prompter proves no prompt
    // fires.
    write_file(&workdir, "extra.csv", "id\n9\n")?;
    let second = ScriptedPrompter::new();
    let outcome = collector.run(&config_path, false, &second).await?;
    let summary = match outcome {
        CollectOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {:?}", other),
    };
    assert_eq!(summary.staged, 2);
    assert!(summary.commit.is_success());

    Ok(())
}

#[tokio::test]
async fn test_declining_repo_creation_aborts_the_run() -> Result<()> {
    let (temp, config) = test_config()?;
    let workdir = sample_working_dir(temp.path())?;

    let config_path = temp.path().join("datakit.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&project_json(&workdir))?,
    )?;

    let prompter = ScriptedPrompter::new().with_confirms([false]);
    let collector = Collector::new(config);

    let result = collector.run(&config_path, false, &prompter).await;
    let err = result.expect_err("declining creation must abort");
    assert!(err.to_string().contains("Cannot load repository"));

    Ok(())
}

#[tokio::test]
async fn test_abort_on_push_failure_policy() -> Result<()> {
    let (temp, mut config) = test_config()?;
    config.collect_settings.on_push_failure = PushFailurePolicy::Abort;
    let workdir = sample_working_dir(temp.path())?;

    let config_path = temp.path().join("datakit.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&project_json(&workdir))?,
    )?;

    let collector = Collector::new(config.clone());
    let prompter = ScriptedPrompter::new().with_confirms([true]);
    let outcome = collector.run(&config_path, false, &prompter).await?;
    assert!(matches!(outcome, CollectOutcome::Completed(_)));

    // Break the remote, then run again under the abort policy.
    std::fs::remove_dir_all(config.server_repo_path("alice", "autodata"))?;
    write_file(&workdir, "extra.csv", "id\n9\n")?;

    let prompter = ScriptedPrompter::new();
    let result = collector.run(&config_path, false, &prompter).await;
    let err = result.expect_err("push failure must abort under the policy");
    assert!(err.to_string().contains("push"));

    Ok(())
}
