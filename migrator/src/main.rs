//! chartmuseum2oci binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chartmuseum2oci::config::{Cli, RunConfig};
use chartmuseum2oci::logging::{self, LogFormat};
use chartmuseum2oci::services::harbor_client::HarborClient;
use chartmuseum2oci::services::helm::HelmCli;
use chartmuseum2oci::MigrationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(LogFormat::from_flag(cli.json_logs())).context("fail to initialise logging")?;

    let config = RunConfig::from_cli(cli)?;
    tracing::debug!(?config, "Loaded configuration");

    let inventory =
        HarborClient::from_config(&config).context("fail to create harbor client")?;
    let helm = HelmCli::with_path(&config.helm_bin);

    let service = MigrationService::new(config, Arc::new(inventory), Arc::new(helm))?;
    let report = service.run().await?;

    if report.has_failures() {
        tracing::warn!(
            failed = report.failed,
            "Some Helm charts could not be migrated, see the warnings above"
        );
    }
    Ok(())
}
