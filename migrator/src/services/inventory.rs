//! Chart inventory listing.
//!
//! Walks Harbor projects page by page and expands every retained project into
//! one [`ArtifactDescriptor`] per chart version. Listing is all-or-nothing:
//! the first API error aborts it and nothing accumulated so far is returned.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{pin_mut, Stream, TryStreamExt};

use crate::error::ListError;
use crate::models::{ArtifactDescriptor, TenantFilter};
use crate::services::harbor_client::{InventoryApi, ProjectPage};

/// Enumerates migratable charts from an [`InventoryApi`].
pub struct InventoryLister {
    api: Arc<dyn InventoryApi>,
    page_size: u64,
}

impl InventoryLister {
    pub fn new(api: Arc<dyn InventoryApi>, page_size: u64) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
        }
    }

    /// Lazy stream of project pages, starting over at page 1 on every call.
    ///
    /// Stops after the page for which `total_count <= page * page_size`, so
    /// the server-reported total is trusted to stay stable during a run. A
    /// product past `u64::MAX` also ends the listing.
    pub fn project_pages(&self) -> impl Stream<Item = Result<ProjectPage, ListError>> + '_ {
        try_stream! {
            let mut page: u64 = 1;
            loop {
                let listing = self
                    .api
                    .list_projects(page, self.page_size)
                    .await
                    .map_err(|source| ListError::Projects { page, source })?;
                let last = page
                    .checked_mul(self.page_size)
                    .map_or(true, |covered| listing.total_count <= covered);
                yield listing;
                if last {
                    break;
                }
                page += 1;
            }
        }
    }

    /// Every chart version of every project passing `filter`.
    pub async fn list_artifacts(
        &self,
        filter: &TenantFilter,
    ) -> Result<Vec<ArtifactDescriptor>, ListError> {
        let pages = self.project_pages();
        pin_mut!(pages);

        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut charts = Vec::new();

        while let Some(page) = pages.try_next().await? {
            for project in page.projects {
                if !filter.allows(&project.name) {
                    tracing::debug!(project = %project.name, "Skipping project not selected for migration");
                    continue;
                }
                if !visited.insert(project.name.clone()) {
                    tracing::debug!(project = %project.name, "Project listed twice, already enumerated");
                    continue;
                }

                for chart in self.list_project_artifacts(&project.name).await? {
                    if seen.insert(chart.clone()) {
                        charts.push(chart);
                    }
                }
            }
        }

        Ok(charts)
    }

    /// Expand one project into its chart versions, in backend order.
    pub async fn list_project_artifacts(
        &self,
        project: &str,
    ) -> Result<Vec<ArtifactDescriptor>, ListError> {
        let charts = self
            .api
            .list_charts(project)
            .await
            .map_err(|source| ListError::Charts {
                project: project.to_string(),
                source,
            })?;

        let mut artifacts = Vec::new();
        for chart in charts {
            let versions = self
                .api
                .list_chart_versions(project, &chart.name)
                .await
                .map_err(|source| ListError::Versions {
                    project: project.to_string(),
                    chart: chart.name.clone(),
                    source,
                })?;

            artifacts.extend(
                versions
                    .into_iter()
                    .map(|v| ArtifactDescriptor::new(project, chart.name.as_str(), v.version)),
            );
        }

        tracing::debug!(project, count = artifacts.len(), "Listed project charts");
        Ok(artifacts)
    }
}
