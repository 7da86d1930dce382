//! Aggregate outcome of a migration run.

use serde::Serialize;

use crate::error::{TransferError, TransferStep};
use crate::models::artifact::ArtifactDescriptor;

/// A chart that could not be migrated.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTransfer {
    pub chart: ArtifactDescriptor,
    pub step: TransferStep,
    pub message: String,
}

/// Counts accumulated by the migration driver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub failed: usize,
    pub failures: Vec<FailedTransfer>,
}

impl RunReport {
    pub fn record_success(&mut self) {
        self.attempted += 1;
    }

    pub fn record_failure(&mut self, chart: &ArtifactDescriptor, err: &TransferError) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(FailedTransfer {
            chart: chart.clone(),
            step: err.step(),
            message: err.to_string(),
        });
    }

    /// Charts that went through every transfer step.
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed
    }

    /// The summary is logged at warn level when this holds.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
