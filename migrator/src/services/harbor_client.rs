//! Harbor inventory API client.
//!
//! Lists projects through the Harbor v2.0 API and charts/versions through the
//! ChartMuseum chart repository API. The [`InventoryApi`] trait lets the
//! lister run against an in-memory inventory in tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::{Credentials, RunConfig};
use crate::error::ApiError;

/// A Harbor project (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// One page of the project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    /// Server-reported number of projects across all pages.
    pub total_count: u64,
}

/// Chart entry of a ChartMuseum repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartSummary {
    pub name: String,
    #[serde(default)]
    pub total_versions: Option<u64>,
}

/// Version entry of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartVersion {
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Source inventory used by the lister.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Check the credentials are accepted.
    async fn verify_credentials(&self) -> Result<(), ApiError>;

    /// List one page of projects (pages start at 1).
    async fn list_projects(&self, page: u64, page_size: u64) -> Result<ProjectPage, ApiError>;

    /// List chart names stored in a project's ChartMuseum repository.
    async fn list_charts(&self, project: &str) -> Result<Vec<ChartSummary>, ApiError>;

    /// List all versions of a chart.
    async fn list_chart_versions(
        &self,
        project: &str,
        chart: &str,
    ) -> Result<Vec<ChartVersion>, ApiError>;
}

/// [`InventoryApi`] over Harbor's REST API with basic authentication.
#[derive(Debug, Clone)]
pub struct HarborClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl HarborClient {
    pub fn new(base_url: Url, credentials: Credentials) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, ApiError> {
        Self::new(config.registry_url.clone(), config.credentials.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        Ok(endpoint_url(&self.base_url, segments)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, HeaderMap), ApiError> {
        tracing::debug!(url = %url, "Harbor API request");

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let value = serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((value, headers))
    }

    /// Harbor answers `null` instead of `[]` for some empty listings.
    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<(Vec<T>, HeaderMap), ApiError> {
        let (items, headers) = self.get_json::<Option<Vec<T>>>(url).await?;
        Ok((items.unwrap_or_default(), headers))
    }
}

/// Append path segments to `base`, percent-encoding each one.
///
/// A segment holding `/` or `..` stays a single encoded segment.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_total_count(
    headers: &HeaderMap,
    url: &Url,
    page: u64,
    page_size: u64,
    returned: usize,
) -> Result<u64, ApiError> {
    match headers.get("x-total-count") {
        Some(value) => {
            let raw = value.to_str().unwrap_or_default().trim();
            raw.parse::<u64>().map_err(|_| ApiError::TotalCount {
                url: url.to_string(),
                value: raw.to_string(),
            })
        }
        // Without a total, treat this page as the last one.
        None => Ok((page - 1) * page_size + returned as u64),
    }
}

#[async_trait]
impl InventoryApi for HarborClient {
    async fn verify_credentials(&self) -> Result<(), ApiError> {
        self.list_projects(1, 1).await.map(|_| ())
    }

    async fn list_projects(&self, page: u64, page_size: u64) -> Result<ProjectPage, ApiError> {
        let mut url = self.endpoint(&["api", "v2.0", "projects"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());

        let (projects, headers) = self.get_list::<Project>(url.clone()).await?;
        let total_count = parse_total_count(&headers, &url, page, page_size, projects.len())?;
        Ok(ProjectPage {
            projects,
            total_count,
        })
    }

    async fn list_charts(&self, project: &str) -> Result<Vec<ChartSummary>, ApiError> {
        let url = self.endpoint(&["api", "chartrepo", project, "charts"])?;
        let (charts, _) = self.get_list(url).await?;
        Ok(charts)
    }

    async fn list_chart_versions(
        &self,
        project: &str,
        chart: &str,
    ) -> Result<Vec<ChartVersion>, ApiError> {
        let url = self.endpoint(&["api", "chartrepo", project, "charts", chart])?;
        let (versions, _) = self.get_list(url).await?;
        Ok(versions)
    }
}
