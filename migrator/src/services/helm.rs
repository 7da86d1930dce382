//! Helm command execution.
//!
//! The migration only needs three helm operations: report the version, log
//! into the destination registry and push a chart archive. They sit behind
//! the [`RegistryTool`] trait so the driver can run against an in-memory fake.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::{Credentials, TransportFlags};
use crate::error::ToolError;
use crate::models::DestinationCoordinate;

/// External registry tool used to authenticate and push charts.
#[async_trait]
pub trait RegistryTool: Send + Sync {
    /// Raw self-reported version string.
    async fn version(&self) -> Result<String, ToolError>;

    /// Authenticate against the destination registry.
    async fn login(
        &self,
        registry_host: &str,
        credentials: &Credentials,
        transport: TransportFlags,
    ) -> Result<(), ToolError>;

    /// Push a local chart archive to an OCI coordinate.
    async fn push(
        &self,
        chart: &Path,
        destination: &DestinationCoordinate,
        transport: TransportFlags,
    ) -> Result<(), ToolError>;
}

/// Output from a helm invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// [`RegistryTool`] backed by the `helm` binary.
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm_path: PathBuf,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::with_path("helm")
    }
}

impl HelmCli {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            helm_path: path.into(),
        }
    }

    fn command_string(&self, args: &[String]) -> String {
        let mut parts = vec![self.helm_path.display().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run helm to completion, optionally feeding `stdin`.
    async fn execute(
        &self,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ToolError> {
        let spawn_err = |source: std::io::Error| ToolError::Spawn {
            program: self.helm_path.display().to_string(),
            source,
        };

        let mut command = Command::new(&self.helm_path);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(spawn_err)?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await.map_err(spawn_err)?;
            // Dropping the pipe closes stdin so helm stops reading.
            drop(pipe);
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !result.success() {
            debug!(
                "Helm command failed with exit code {}: {}",
                result.exit_code,
                result.stderr.trim()
            );
        }
        Ok(result)
    }

    async fn execute_checked(
        &self,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ToolError> {
        let output = self.execute(args, stdin).await?;
        if !output.success() {
            return Err(ToolError::Failed {
                command: self.command_string(args),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// `helm registry login` arguments. The password goes through stdin.
pub fn login_args(registry_host: &str, username: &str, transport: TransportFlags) -> Vec<String> {
    let mut args = vec![
        "registry".to_string(),
        "login".to_string(),
        registry_host.to_string(),
        "--username".to_string(),
        username.to_string(),
        "--password-stdin".to_string(),
    ];
    if transport.insecure {
        args.push("--insecure".to_string());
    }
    if transport.plain_http {
        args.push("--plain-http".to_string());
    }
    args
}

/// `helm push` arguments.
pub fn push_args(
    chart: &Path,
    destination: &DestinationCoordinate,
    transport: TransportFlags,
) -> Vec<String> {
    let mut args = vec![
        "push".to_string(),
        chart.display().to_string(),
        destination.to_string(),
    ];
    if transport.insecure {
        args.push("--insecure-skip-tls-verify".to_string());
    }
    if transport.plain_http {
        args.push("--plain-http".to_string());
    }
    args
}

#[async_trait]
impl RegistryTool for HelmCli {
    async fn version(&self) -> Result<String, ToolError> {
        let args = ["version".to_string(), "--short".to_string()];
        let output = self.execute_checked(&args, None).await?;
        Ok(output.stdout.trim().to_string())
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    async fn login(
        &self,
        registry_host: &str,
        credentials: &Credentials,
        transport: TransportFlags,
    ) -> Result<(), ToolError> {
        let args = login_args(registry_host, &credentials.username, transport);
        self.execute_checked(&args, Some(credentials.password.as_str()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, chart, destination), fields(chart = %chart.display(), destination = %destination))]
    async fn push(
        &self,
        chart: &Path,
        destination: &DestinationCoordinate,
        transport: TransportFlags,
    ) -> Result<(), ToolError> {
        let args = push_args(chart, destination, transport);
        self.execute_checked(&args, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_args() {
        let args = login_args("harbor.local", "admin", TransportFlags::default());
        assert_eq!(
            args,
            vec![
                "registry",
                "login",
                "harbor.local",
                "--username",
                "admin",
                "--password-stdin"
            ]
        );

        let args = login_args(
            "harbor.local:8080",
            "admin",
            TransportFlags {
                insecure: true,
                plain_http: true,
            },
        );
        assert!(args.ends_with(&["--insecure".to_string(), "--plain-http".to_string()]));
    }

    #[test]
    fn test_push_args_use_tls_skip_flag() {
        let dest = DestinationCoordinate::new("harbor.local", "team-a", Some("/charts"));
        let args = push_args(
            Path::new("demo-1.0.0.tgz"),
            &dest,
            TransportFlags {
                insecure: true,
                plain_http: false,
            },
        );
        assert_eq!(
            args,
            vec![
                "push",
                "demo-1.0.0.tgz",
                "oci://harbor.local/team-a/charts",
                "--insecure-skip-tls-verify"
            ]
        );
    }

    #[test]
    fn test_command_string_never_holds_password() {
        let helm = HelmCli::default();
        let args = login_args("harbor.local", "admin", TransportFlags::default());
        let cmd = helm.command_string(&args);
        assert_eq!(
            cmd,
            "helm registry login harbor.local --username admin --password-stdin"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let helm = HelmCli::with_path("/nonexistent/helm-binary-for-tests");
        let err = helm.version().await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let helm = HelmCli::with_path("sh");
        let args = vec![
            "-c".to_string(),
            "echo 'Error: denied' >&2; exit 3".to_string(),
        ];
        let err = helm.execute_checked(&args, None).await.unwrap_err();
        match err {
            ToolError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "Error: denied");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let helm = HelmCli::with_path("sh");
        let args = vec!["-c".to_string(), "cat".to_string()];
        let output = helm.execute_checked(&args, Some("s3cret")).await.unwrap();
        assert_eq!(output.stdout, "s3cret");
    }
}
