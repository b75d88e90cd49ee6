use thiserror::Error;

/// Two-tier failure taxonomy: every variant here is a *structural* error
/// that aborts the calling operation. Operational failures (push, commit,
/// status, staging) are reported as data through [`crate::repo::OpResult`]
/// and never surface as this type.
#[derive(Error, Debug)]
pub enum DatakitError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Repository already exists: {username}/{reponame}")]
    AlreadyExists { username: String, reponame: String },

    #[error("Repository not found: {username}/{reponame}")]
    NotFound { username: String, reponame: String },

    #[error("Cannot load repository: {0}")]
    CannotLoadRepo(String),

    #[error("Invalid remote URL: {url}")]
    InvalidRemoteUrl { url: String },

    #[error("Backend operation failed: {0}")]
    Backend(String),

    #[error("Command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("git binary not found on PATH")]
    GitBinaryMissing,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DatakitError>;
