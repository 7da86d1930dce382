//! Run configuration.
//!
//! Command-line flags (with environment fallbacks, optionally loaded from a
//! `.env` file) are parsed into [`Cli`] and validated into an immutable
//! [`RunConfig`] before any network activity happens.
//!
//! ```bash
//! HARBOR_URL=https://harbor.example.com
//! HARBOR_USERNAME=admin
//! HARBOR_PASSWORD=secret
//! HARBOR_DEST_PATH=/charts      # optional OCI sub-path
//! HARBOR_DEST_PROJECT=migrated  # optional, push every chart into one project
//! HELM_BIN=/usr/local/bin/helm
//! LOG_FORMAT=json
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::{MigrationError, Result};
use crate::models::{ArtifactDescriptor, DestinationCoordinate, TenantFilter};

/// Projects are listed this many at a time.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest page Harbor's project API serves.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Upper bound for a single chart download.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Migrate Helm charts from Harbor's ChartMuseum to OCI artifacts.
#[derive(Debug, Parser)]
#[command(name = "chartmuseum2oci", version)]
pub struct Cli {
    /// Harbor registry url
    #[arg(long, env = "HARBOR_URL")]
    pub url: Option<String>,

    /// Harbor registry username
    #[arg(long, env = "HARBOR_USERNAME")]
    pub username: Option<String>,

    /// Harbor registry password
    #[arg(long, env = "HARBOR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Destination subpath appended to the OCI repository of each project
    #[arg(long = "destpath", env = "HARBOR_DEST_PATH")]
    pub dest_path: Option<String>,

    /// Name of the project(s) to migrate, repeat for several projects
    #[arg(long = "project")]
    pub projects: Vec<String>,

    /// Push every chart into this project instead of its source project
    #[arg(long, env = "HARBOR_DEST_PROJECT")]
    pub dest_project: Option<String>,

    /// Skip TLS verification for helm operations
    #[arg(long)]
    pub insecure: bool,

    /// Use plain HTTP for helm operations
    #[arg(long)]
    pub plain_http: bool,

    /// Path to the helm binary
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    pub helm_bin: PathBuf,

    /// Directory receiving the temporary chart archives
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Number of Harbor projects requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u64).range(1..=MAX_PAGE_SIZE))]
    pub page_size: u64,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// JSON logs are requested by flag or by `LOG_FORMAT=json`.
    pub fn json_logs(&self) -> bool {
        self.log_json
            || std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
    }
}

/// Transport options forwarded to helm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportFlags {
    pub insecure: bool,
    pub plain_http: bool,
}

/// Registry credentials shared by the HTTP client and helm.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated, immutable configuration of one migration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub registry_url: Url,
    pub credentials: Credentials,
    pub dest_path: Option<String>,
    pub dest_project: Option<String>,
    pub projects: TenantFilter,
    pub transport: TransportFlags,
    pub helm_bin: PathBuf,
    pub work_dir: PathBuf,
    pub page_size: u64,
    pub fetch_timeout: Duration,
    pub show_progress: bool,
}

impl RunConfig {
    /// Config with defaults for everything but the required values.
    pub fn new(registry_url: &str, username: &str, password: &str) -> Result<Self> {
        let registry_url = parse_registry_url(registry_url)?;
        Ok(Self {
            registry_url,
            credentials: Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
            dest_path: None,
            dest_project: None,
            projects: TenantFilter::default(),
            transport: TransportFlags::default(),
            helm_bin: PathBuf::from("helm"),
            work_dir: PathBuf::from("."),
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: FETCH_TIMEOUT,
            show_progress: false,
        })
    }

    /// Validate parsed command-line arguments.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let url = required(cli.url, "url")?;
        let username = required(cli.username, "username")?;
        let password = required(cli.password, "password")?;

        let mut config = Self::new(&url, &username, &password)?;
        config.dest_path = cli.dest_path.filter(|p| !p.is_empty());
        config.dest_project = cli.dest_project.filter(|p| !p.is_empty());
        config.projects = TenantFilter::new(cli.projects);
        config.transport = TransportFlags {
            insecure: cli.insecure,
            plain_http: cli.plain_http,
        };
        config.helm_bin = cli.helm_bin;
        config.work_dir = cli.work_dir;
        config.page_size = cli.page_size;
        config.show_progress = !cli.no_progress;
        Ok(config)
    }

    /// Builder: restrict the run to the given projects
    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = TenantFilter::new(projects);
        self
    }

    /// Builder: set the OCI sub-path
    pub fn with_dest_path(mut self, dest_path: impl Into<String>) -> Self {
        self.dest_path = Some(dest_path.into());
        self
    }

    /// Builder: set the temporary file directory
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Builder: set the project page size
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Registry host as used in OCI references, keeping an explicit port.
    pub fn registry_host(&self) -> String {
        let host = self.registry_url.host_str().unwrap_or_default();
        match self.registry_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Where a chart gets pushed.
    pub fn destination_for(&self, chart: &ArtifactDescriptor) -> DestinationCoordinate {
        let tenant = self.dest_project.as_deref().unwrap_or(&chart.tenant);
        DestinationCoordinate::new(self.registry_host(), tenant, self.dest_path.as_deref())
    }
}

fn required(value: Option<String>, flag: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MigrationError::Config(format!("Missing required --{} flag", flag)))
}

fn parse_registry_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| MigrationError::Config(format!("fail to parse Harbor URL {}: {}", raw, e)))?;
    if url.host_str().is_none() {
        return Err(MigrationError::Config(format!(
            "Harbor URL {} must have a host",
            raw
        )));
    }
    Ok(url)
}
