//! datakit - Dataset Versioning Convenience Layer
//!
//! Discovers files matching configured patterns, stages them into a
//! per-user/per-dataset git repository, commits, pushes to a remote, and
//! triggers metadata collection.

pub mod backend;
pub mod cli;
pub mod collect;
pub mod config;
pub mod discovery;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod project;
pub mod prompt;
pub mod repo;

// Re-export commonly used types
pub use collect::{CollectOutcome, CollectSummary, Collector};
pub use config::{Config, PushFailurePolicy};
pub use error::DatakitError;
pub use mapper::{FileEntry, ImportMapper};
pub use project::{ProjectConfig, ProjectInit};
pub use prompt::{DecisionProvider, ScriptedPrompter, TerminalPrompter};
pub use repo::{
    GitRepoManager, ManagerSettings, OpResult, OpStatus, RepoKey, RepositoryHandle,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default per-project config filename
    pub const PROJECT_CONFIG_NAME: &str = "datakit.json";

    /// Marker file identifying a directory as a managed repository
    pub const PACKAGE_DESCRIPTOR: &str = "datapackage.json";

    /// Default branch name
    pub const DEFAULT_BRANCH: &str = "master";

    /// Default remote name
    pub const DEFAULT_REMOTE: &str = "origin";
}
