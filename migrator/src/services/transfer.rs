//! Single chart transfer: ChartMuseum download, helm push, local cleanup.

use std::path::{Path, PathBuf};

use url::Url;

use crate::config::RunConfig;
use crate::error::{FetchError, TransferError};
use crate::models::ArtifactDescriptor;
use crate::services::harbor_client::endpoint_url;
use crate::services::helm::RegistryTool;

/// Mode of the temporary chart archive on Unix.
#[cfg(unix)]
const CHART_FILE_MODE: u32 = 0o600;

/// HTTP client used for chart downloads, bounded by the fetch timeout.
pub fn download_client(config: &RunConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
}

/// Moves charts from ChartMuseum to OCI one at a time.
///
/// The temporary archive is named after the chart file itself, so two
/// processes transferring the same chart into one work directory collide.
pub struct ChartTransfer<'a> {
    config: &'a RunConfig,
    tool: &'a dyn RegistryTool,
    client: reqwest::Client,
}

impl<'a> ChartTransfer<'a> {
    pub fn new(config: &'a RunConfig, tool: &'a dyn RegistryTool) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(config, tool, download_client(config)?))
    }

    pub fn with_client(
        config: &'a RunConfig,
        tool: &'a dyn RegistryTool,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            tool,
            client,
        }
    }

    /// ChartMuseum download URL of a chart archive, one encoded segment per
    /// path component.
    pub fn download_url(&self, chart: &ArtifactDescriptor) -> Result<Url, FetchError> {
        let file_name = chart.file_name();
        Ok(endpoint_url(
            &self.config.registry_url,
            &["chartrepo", chart.tenant.as_str(), "charts", file_name.as_str()],
        )?)
    }

    /// Local path of the temporary archive. Names that could escape the work
    /// directory are rejected.
    pub fn local_path(&self, chart: &ArtifactDescriptor) -> Result<PathBuf, FetchError> {
        let file_name = chart.file_name();
        if file_name.contains(['/', '\\']) || file_name.contains("..") {
            return Err(FetchError::UnsafeFileName(file_name));
        }
        Ok(self.config.work_dir.join(file_name))
    }

    /// Fetch, push and clean up one chart.
    ///
    /// Cleanup runs whenever the fetch succeeded, even if the push failed. The
    /// first failure wins: a cleanup error never replaces a push error.
    pub async fn transfer(&self, chart: &ArtifactDescriptor) -> Result<(), TransferError> {
        let file = self.fetch(chart).await?;
        let pushed = self.push(chart, &file).await;
        let cleaned = self.cleanup(&file).await;
        pushed?;
        cleaned
    }

    /// Download the archive into the work directory.
    pub async fn fetch(&self, chart: &ArtifactDescriptor) -> Result<PathBuf, TransferError> {
        let url = self
            .download_url(chart)
            .map_err(|source| TransferError::Fetch {
                url: chart.to_string(),
                source,
            })?;
        let fetch_err = |source: FetchError| TransferError::Fetch {
            url: url.to_string(),
            source,
        };
        let path = self.local_path(chart).map_err(fetch_err)?;
        tracing::debug!(chart = %chart, url = %url, "Pulling chart from chartmuseum");

        let response = self
            .client
            .get(url.clone())
            .basic_auth(
                &self.config.credentials.username,
                Some(&self.config.credentials.password),
            )
            .send()
            .await
            .map_err(|e| fetch_err(FetchError::Http(e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(fetch_err(FetchError::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_err(FetchError::Http(e)))?;

        if let Err(e) = write_chart_file(&path, &body).await {
            // Do not leave a truncated archive behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(fetch_err(FetchError::Write(e)));
        }

        Ok(path)
    }

    /// Push a downloaded archive to the chart's OCI destination.
    pub async fn push(&self, chart: &ArtifactDescriptor, file: &Path) -> Result<(), TransferError> {
        let destination = self.config.destination_for(chart);
        tracing::debug!(chart = %chart, destination = %destination, "Pushing chart to OCI");

        self.tool
            .push(file, &destination, self.config.transport)
            .await
            .map_err(|source| TransferError::Push {
                file: file.to_path_buf(),
                destination: destination.to_string(),
                source,
            })
    }

    /// Remove the temporary archive.
    pub async fn cleanup(&self, file: &Path) -> Result<(), TransferError> {
        tokio::fs::remove_file(file)
            .await
            .map_err(|source| TransferError::Cleanup {
                path: file.to_path_buf(),
                source,
            })
    }
}

async fn write_chart_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(CHART_FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    Ok(())
}
