//! Migration driver.
//!
//! Runs the phases of one migration in order:
//!
//! 1. **Init → Authenticated**: helm version gate, Harbor credential check,
//!    `helm registry login`.
//! 2. **Authenticated → Listed**: one full inventory listing.
//! 3. **Listed → Transferring**: every chart transferred in listed order.
//! 4. **Transferring → Reported**: the aggregate [`RunReport`].
//!
//! Failures in phases 1 and 2 abort the run. Transfer failures are logged,
//! counted and skipped.

use std::fmt;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use semver::Version;

use crate::config::RunConfig;
use crate::error::{AuthError, MigrationError, Result};
use crate::models::{ArtifactDescriptor, RunReport};
use crate::services::harbor_client::InventoryApi;
use crate::services::helm::RegistryTool;
use crate::services::inventory::InventoryLister;
use crate::services::transfer::{download_client, ChartTransfer};
use crate::services::version_gate::{verify_tool_version, MIN_HELM_VERSION};

/// Phase of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Authenticated,
    Listed,
    Transferring,
    Reported,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Listed => "listed",
            Self::Transferring => "transferring",
            Self::Reported => "reported",
        };
        f.write_str(phase)
    }
}

/// Drives a whole ChartMuseum to OCI migration.
pub struct MigrationService {
    config: RunConfig,
    inventory: Arc<dyn InventoryApi>,
    tool: Arc<dyn RegistryTool>,
    min_tool_version: Version,
    download_client: reqwest::Client,
}

impl MigrationService {
    /// Fails only when the chart download client cannot be built, before any
    /// request is sent.
    pub fn new(
        config: RunConfig,
        inventory: Arc<dyn InventoryApi>,
        tool: Arc<dyn RegistryTool>,
    ) -> Result<Self> {
        let download_client = download_client(&config).map_err(|e| {
            MigrationError::Config(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            config,
            inventory,
            tool,
            min_tool_version: MIN_HELM_VERSION,
            download_client,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the migration and return the per-chart outcome counts.
    pub async fn run(&self) -> Result<RunReport> {
        self.authenticate().await?;
        log_phase(RunPhase::Authenticated);

        let charts = self.list().await?;
        log_phase(RunPhase::Listed);
        tracing::info!("{} Helm charts to migrate from Chartmuseum to OCI", charts.len());

        let report = self.transfer_all(&charts).await;
        log_phase(RunPhase::Reported);
        if report.has_failures() {
            tracing::warn!(
                failed = report.failed,
                "{} Helm charts successfully migrated from Chartmuseum to OCI",
                report.succeeded()
            );
        } else {
            tracing::info!(
                "{} Helm charts successfully migrated from Chartmuseum to OCI",
                report.succeeded()
            );
        }
        Ok(report)
    }

    /// Version gate, Harbor credential check, then helm registry login.
    pub async fn authenticate(&self) -> Result<()> {
        log_phase(RunPhase::Init);
        verify_tool_version(self.tool.as_ref(), &self.min_tool_version).await?;

        self.inventory
            .verify_credentials()
            .await
            .map_err(AuthError::Registry)?;

        let host = self.config.registry_host();
        self.tool
            .login(&host, &self.config.credentials, self.config.transport)
            .await
            .map_err(AuthError::Login)?;
        tracing::info!(registry = %host, "Logged into OCI registry");
        Ok(())
    }

    /// Enumerate every chart to migrate.
    pub async fn list(&self) -> Result<Vec<ArtifactDescriptor>> {
        if !self.config.projects.is_empty() {
            let selected: Vec<&str> = self.config.projects.iter().collect();
            tracing::info!(projects = ?selected, "Restricting migration to selected projects");
        }
        let lister = InventoryLister::new(self.inventory.clone(), self.config.page_size);
        Ok(lister.list_artifacts(&self.config.projects).await?)
    }

    /// Transfer charts one at a time, isolating failures.
    pub async fn transfer_all(&self, charts: &[ArtifactDescriptor]) -> RunReport {
        log_phase(RunPhase::Transferring);
        let transfer = ChartTransfer::with_client(
            &self.config,
            self.tool.as_ref(),
            self.download_client.clone(),
        );
        let progress = self.progress_bar(charts.len());
        let mut report = RunReport::default();

        for (index, chart) in charts.iter().enumerate() {
            progress.set_message(chart.to_string());
            tracing::debug!(
                chart = %chart,
                position = index + 1,
                total = charts.len(),
                "Migrating chart"
            );

            match transfer.transfer(chart).await {
                Ok(()) => report.record_success(),
                Err(e) => {
                    progress.suspend(|| {
                        tracing::warn!(
                            chart = %chart,
                            step = %e.step(),
                            "fail to migrate helm chart: {}",
                            e
                        );
                    });
                    report.record_failure(chart, &e);
                }
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        report
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style);
        }
        bar
    }
}

fn log_phase(phase: RunPhase) {
    tracing::debug!(phase = %phase, "Migration phase");
}
