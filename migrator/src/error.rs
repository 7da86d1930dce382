//! Migration error types and result alias.
//!
//! Errors fall into two tiers. Everything wrapped by [`MigrationError`] is
//! fatal: the run stops and no report is produced. [`TransferError`] is
//! recoverable: the driver logs it, counts it and moves on to the next chart.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for fatal, run-level operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Fatal errors that abort a migration run.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Helm version check failed: {0}")]
    Version(#[from] VersionError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to retrieve helm charts to migrate: {0}")]
    List(#[from] ListError),
}

impl MigrationError {
    /// Every run-level error stops the migration.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

/// Failures of the helm pre-flight version check.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Version output does not have exactly three dot-separated components.
    #[error("unable to extract version from helm output: {output:?}")]
    Parse { output: String },

    /// Three components were found but they are not a valid semantic version.
    #[error("invalid helm version format: {version}")]
    Format {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("helm version {found} is too old, requires version >= {required}")]
    TooOld {
        found: semver::Version,
        required: semver::Version,
    },

    /// `helm version` could not be run at all.
    #[error("failed to execute helm version command: {0}")]
    Probe(#[source] ToolError),
}

/// Credential rejection by either the Harbor API or `helm registry login`.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("failed to contact Harbor registry, check your credentials: {0}")]
    Registry(#[source] ApiError),

    #[error("helm registry login failed: {0}")]
    Login(#[source] ToolError),
}

/// Errors returned by the Harbor inventory API client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized request to {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid X-Total-Count header from {url}: {value:?}")]
    TotalCount { url: String, value: String },

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Inventory enumeration failure. Listing is all-or-nothing.
#[derive(Error, Debug)]
pub enum ListError {
    #[error("failed to list harbor projects of page {page}: {source}")]
    Projects {
        page: u64,
        #[source]
        source: ApiError,
    },

    #[error("failed to list charts of project {project}: {source}")]
    Charts {
        project: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to get chart {chart} in project {project}: {source}")]
    Versions {
        project: String,
        chart: String,
        #[source]
        source: ApiError,
    },
}

/// Failures of an external registry tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
}

/// Sub-step of a single chart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStep {
    Fetch,
    Push,
    Cleanup,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Fetch => "fetch",
            Self::Push => "push",
            Self::Cleanup => "cleanup",
        };
        f.write_str(step)
    }
}

/// Why a chart download failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("received status {0}")]
    Status(u16),

    #[error("failed to write chart file to disk: {0}")]
    Write(#[from] std::io::Error),

    #[error("invalid download URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("refusing chart file name {0:?}")]
    UnsafeFileName(String),
}

/// Recoverable failure of one chart transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to pull chart from chartmuseum: {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to push chart {file} to {destination}: {source}")]
    Push {
        file: PathBuf,
        destination: String,
        #[source]
        source: ToolError,
    },

    #[error("failed to remove chart file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Which transfer sub-step produced this error.
    pub fn step(&self) -> TransferStep {
        match self {
            Self::Fetch { .. } => TransferStep::Fetch,
            Self::Push { .. } => TransferStep::Push,
            Self::Cleanup { .. } => TransferStep::Cleanup,
        }
    }

    /// Transfer errors are isolated to one chart.
    pub fn is_fatal(&self) -> bool {
        false
    }
}
