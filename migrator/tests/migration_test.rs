//! End-to-end migration runs against a mocked Harbor and an in-memory helm.
//!
//! Run with:
//!   cargo test -p chartmuseum2oci --test migration_test

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chartmuseum2oci::config::{Credentials, RunConfig, TransportFlags};
use chartmuseum2oci::error::{ListError, MigrationError, ToolError, TransferStep};
use chartmuseum2oci::services::harbor_client::HarborClient;
use chartmuseum2oci::services::helm::RegistryTool;
use chartmuseum2oci::{DestinationCoordinate, MigrationService};

#[derive(Debug, Clone)]
struct PushRecord {
    file: PathBuf,
    destination: String,
    file_existed: bool,
}

/// helm stand-in recording every push.
#[derive(Default)]
struct FakeHelm {
    fail_push_for: Option<&'static str>,
    logins: Mutex<Vec<String>>,
    pushes: Mutex<Vec<PushRecord>>,
}

#[async_trait]
impl RegistryTool for FakeHelm {
    async fn version(&self) -> Result<String, ToolError> {
        Ok("v3.19.0+gce43812".to_string())
    }

    async fn login(
        &self,
        registry_host: &str,
        credentials: &Credentials,
        _transport: TransportFlags,
    ) -> Result<(), ToolError> {
        assert_eq!(credentials.username, "admin");
        self.logins.lock().unwrap().push(registry_host.to_string());
        Ok(())
    }

    async fn push(
        &self,
        chart: &Path,
        destination: &DestinationCoordinate,
        _transport: TransportFlags,
    ) -> Result<(), ToolError> {
        self.pushes.lock().unwrap().push(PushRecord {
            file: chart.to_path_buf(),
            destination: destination.to_string(),
            file_existed: chart.exists(),
        });
        let name = chart.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.fail_push_for == Some(name) {
            return Err(ToolError::Failed {
                command: format!("helm push {}", name),
                exit_code: 1,
                stderr: "Error: failed to push".to_string(),
            });
        }
        Ok(())
    }
}

async fn mock_projects(server: &MockServer, page: &str, total: u64, names: &[&str]) {
    let body: Vec<_> = names.iter().map(|n| json!({ "name": n })).collect();
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects"))
        .and(query_param("page", page))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", total.to_string().as_str())
                .set_body_json(body),
        )
        .mount(server)
        .await;
}

async fn mock_charts(server: &MockServer, project: &str, charts: &[(&str, Vec<&str>)]) {
    let names: Vec<_> = charts.iter().map(|(n, _)| json!({ "name": n })).collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/chartrepo/{}/charts", project)))
        .respond_with(ResponseTemplate::new(200).set_body_json(names))
        .mount(server)
        .await;

    for (name, versions) in charts {
        let body: Vec<_> = versions
            .iter()
            .map(|v| json!({ "name": name, "version": v }))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/api/chartrepo/{}/charts/{}", project, name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn mock_download(server: &MockServer, project: &str, file: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/chartrepo/{}/charts/{}", project, file)))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(b"\x1f\x8b chart".as_slice()))
        .mount(server)
        .await;
}

fn service_for(config: RunConfig, helm: Arc<FakeHelm>) -> MigrationService {
    let inventory = HarborClient::from_config(&config).unwrap();
    MigrationService::new(config, Arc::new(inventory), helm).unwrap()
}

fn config_for(server: &MockServer, work_dir: &Path) -> RunConfig {
    RunConfig::new(&server.uri(), "admin", "secret")
        .unwrap()
        .with_work_dir(work_dir)
}

#[tokio::test]
async fn test_single_chart_end_to_end() {
    let server = MockServer::start().await;
    mock_projects(&server, "1", 2, &["team-a", "team-b"]).await;
    mock_charts(&server, "team-a", &[("demo", vec!["1.0.0"])]).await;
    mock_charts(&server, "team-b", &[]).await;
    mock_download(&server, "team-a", "demo-1.0.0.tgz", 200).await;

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm::default());
    let service = service_for(config_for(&server, work_dir.path()), helm.clone());

    let report = service.run().await.unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.succeeded(), 1);

    let host = service.config().registry_host();
    assert_eq!(*helm.logins.lock().unwrap(), vec![host.clone()]);

    let pushes = helm.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].file, work_dir.path().join("demo-1.0.0.tgz"));
    assert!(pushes[0].file_existed, "archive must exist while pushing");
    assert_eq!(pushes[0].destination, format!("oci://{}/team-a", host));
    assert!(!work_dir.path().join("demo-1.0.0.tgz").exists());
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let server = MockServer::start().await;
    mock_projects(&server, "1", 1, &["team-a"]).await;
    mock_charts(&server, "team-a", &[("broken", vec!["0.1.0"]), ("demo", vec!["1.0.0"])]).await;
    mock_download(&server, "team-a", "broken-0.1.0.tgz", 500).await;
    mock_download(&server, "team-a", "demo-1.0.0.tgz", 200).await;

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm::default());
    let service = service_for(config_for(&server, work_dir.path()), helm.clone());

    let report = service.run().await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].chart.name, "broken");
    assert_eq!(report.failures[0].step, TransferStep::Fetch);

    let pushes = helm.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].destination.ends_with("/team-a"));
    assert_eq!(pushes[0].file, work_dir.path().join("demo-1.0.0.tgz"));
}

#[tokio::test]
async fn test_push_failure_reported_and_cleaned() {
    let server = MockServer::start().await;
    mock_projects(&server, "1", 1, &["team-a"]).await;
    mock_charts(&server, "team-a", &[("demo", vec!["1.0.0", "1.1.0"])]).await;
    mock_download(&server, "team-a", "demo-1.0.0.tgz", 200).await;
    mock_download(&server, "team-a", "demo-1.1.0.tgz", 200).await;

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm {
        fail_push_for: Some("demo-1.0.0.tgz"),
        ..Default::default()
    });
    let service = service_for(config_for(&server, work_dir.path()), helm.clone());

    let report = service.run().await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].step, TransferStep::Push);
    assert!(report.failures[0].message.contains("failed to push"));
    assert!(!work_dir.path().join("demo-1.0.0.tgz").exists());
    assert!(!work_dir.path().join("demo-1.1.0.tgz").exists());
}

#[tokio::test]
async fn test_project_filter_and_pagination() {
    let server = MockServer::start().await;
    mock_projects(&server, "1", 3, &["pr1", "pr2"]).await;
    mock_projects(&server, "2", 3, &["pr3"]).await;
    mock_charts(&server, "pr1", &[("a", vec!["1.0.0"])]).await;
    mock_charts(&server, "pr2", &[("b", vec!["2.0.0"])]).await;
    mock_download(&server, "pr1", "a-1.0.0.tgz", 200).await;
    mock_download(&server, "pr2", "b-2.0.0.tgz", 200).await;
    // pr3 has no chart mocks: listing it would fail the whole run.

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm::default());
    let config = config_for(&server, work_dir.path())
        .with_projects(["pr1", "pr2"])
        .with_page_size(2)
        .with_dest_path("/migrated");
    let service = service_for(config, helm.clone());

    let report = service.run().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 0);

    let destinations: Vec<String> = helm
        .pushes
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.destination.clone())
        .collect();
    let host = service.config().registry_host();
    assert_eq!(
        destinations,
        vec![
            format!("oci://{}/pr1/migrated", host),
            format!("oci://{}/pr2/migrated", host),
        ]
    );
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    mock_projects(&server, "1", 3, &["pr1", "pr2"]).await;
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mock_charts(&server, "pr1", &[("a", vec!["1.0.0"])]).await;
    mock_charts(&server, "pr2", &[]).await;

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm::default());
    let config = config_for(&server, work_dir.path()).with_page_size(2);
    let service = service_for(config, helm.clone());

    let err = service.run().await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::List(ListError::Projects { page: 2, .. })
    ));
    assert!(helm.pushes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_credentials_stop_before_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2.0/projects"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let work_dir = tempfile::tempdir().unwrap();
    let helm = Arc::new(FakeHelm::default());
    let service = service_for(config_for(&server, work_dir.path()), helm.clone());

    let err = service.run().await.unwrap_err();
    assert!(matches!(err, MigrationError::Auth(_)));
    assert!(helm.logins.lock().unwrap().is_empty());
}
