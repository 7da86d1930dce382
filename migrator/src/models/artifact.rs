//! Chart descriptors, tenant filters and OCI destinations.

use std::fmt;

use serde::Serialize;

/// One version of one chart in one Harbor project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub tenant: String,
    pub version: String,
}

impl ArtifactDescriptor {
    pub fn new(
        tenant: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tenant: tenant.into(),
            version: version.into(),
        }
    }

    /// Archive name as served by ChartMuseum, e.g. `demo-1.0.0.tgz`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }
}

impl fmt::Display for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.tenant, self.name, self.version)
    }
}

/// Projects selected for migration. Empty means every project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantFilter {
    names: Vec<String>,
}

impl TenantFilter {
    /// Build a filter keeping the first occurrence of each name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        for name in names {
            let name = name.into();
            if !filter.names.contains(&name) {
                filter.names.push(name);
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a project passes the filter.
    pub fn allows(&self, tenant: &str) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| n == tenant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Push target of a chart: `oci://<host>/<tenant>[/<subpath>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCoordinate {
    host: String,
    tenant: String,
    sub_path: Option<String>,
}

impl DestinationCoordinate {
    pub fn new(host: impl Into<String>, tenant: impl Into<String>, sub_path: Option<&str>) -> Self {
        let sub_path = sub_path
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Self {
            host: host.into(),
            tenant: tenant.into(),
            sub_path,
        }
    }
}

impl fmt::Display for DestinationCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oci://{}/{}", self.host, self.tenant)?;
        if let Some(sub_path) = &self.sub_path {
            write!(f, "/{}", sub_path)?;
        }
        Ok(())
    }
}
