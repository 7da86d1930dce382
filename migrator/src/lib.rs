//! Migrate Helm charts from Harbor's ChartMuseum to OCI artifacts.
//!
//! The [`services::migration::MigrationService`] drives a run: it checks the
//! helm version, authenticates, lists every chart version of the selected
//! Harbor projects and pushes each one to `oci://<host>/<project>[/<subpath>]`
//! with `helm push`.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::RunConfig;
pub use error::{MigrationError, Result, TransferError};
pub use models::{ArtifactDescriptor, DestinationCoordinate, RunReport, TenantFilter};
pub use services::migration::MigrationService;
