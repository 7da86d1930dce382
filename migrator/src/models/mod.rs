//! Domain models.

pub mod artifact;
pub mod report;

pub use artifact::{ArtifactDescriptor, DestinationCoordinate, TenantFilter};
pub use report::{FailedTransfer, RunReport};
