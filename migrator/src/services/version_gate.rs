//! Helm pre-flight version check.
//!
//! `helm version --short` prints strings like `v3.19.0+gce43812`. The numeric
//! core is extracted, validated as a semantic version and compared against
//! [`MIN_HELM_VERSION`].

use semver::Version;

use crate::error::VersionError;
use crate::services::helm::RegistryTool;

/// Oldest helm release able to push charts the way the migration needs.
pub const MIN_HELM_VERSION: Version = Version::new(3, 19, 0);

/// Extract `X.Y.Z` from tool output, dropping a `v` prefix and `+metadata`.
pub fn extract_version(output: &str) -> Result<&str, VersionError> {
    let trimmed = output.trim();
    let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let version = match version.find('+') {
        Some(idx) => &version[..idx],
        None => version,
    };

    if version.split('.').count() != 3 {
        return Err(VersionError::Parse {
            output: output.to_string(),
        });
    }
    Ok(version)
}

/// Parse raw version output and reject it when below `minimum`.
pub fn check_minimum_version(raw_output: &str, minimum: &Version) -> Result<Version, VersionError> {
    let version_str = extract_version(raw_output)?;
    let version = Version::parse(version_str).map_err(|source| VersionError::Format {
        version: version_str.to_string(),
        source,
    })?;

    if version < *minimum {
        return Err(VersionError::TooOld {
            found: version,
            required: minimum.clone(),
        });
    }
    Ok(version)
}

/// Ask the tool for its version and check it.
pub async fn verify_tool_version(
    tool: &dyn RegistryTool,
    minimum: &Version,
) -> Result<Version, VersionError> {
    let output = tool.version().await.map_err(VersionError::Probe)?;
    let version = check_minimum_version(&output, minimum)?;
    tracing::info!(version = %version, "Helm version check passed");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_prefix_and_metadata() {
        assert_eq!(extract_version("v3.19.0+gce43812").unwrap(), "3.19.0");
        assert_eq!(extract_version("v3.19.0").unwrap(), "3.19.0");
        assert_eq!(extract_version("3.19.0").unwrap(), "3.19.0");
        assert_eq!(extract_version("v3.20.1+g1234abc\n").unwrap(), "3.20.1");
    }

    #[test]
    fn test_extract_wrong_component_count() {
        for raw in ["3.19", "v3.19", "v3.19.0.1", "", "v", "+g123"] {
            assert!(
                matches!(extract_version(raw), Err(VersionError::Parse { .. })),
                "expected parse error for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_accepts_versions_at_or_above_minimum() {
        let v = check_minimum_version("v3.19.0+gce43812", &MIN_HELM_VERSION).unwrap();
        assert_eq!(v, Version::new(3, 19, 0));

        let v = check_minimum_version("v3.20.2", &MIN_HELM_VERSION).unwrap();
        assert_eq!(v, Version::new(3, 20, 2));

        let v = check_minimum_version("4.0.0", &MIN_HELM_VERSION).unwrap();
        assert_eq!(v.major, 4);
    }

    #[test]
    fn test_rejects_old_version() {
        let err = check_minimum_version("v3.18.9", &MIN_HELM_VERSION).unwrap_err();
        match err {
            VersionError::TooOld { found, required } => {
                assert_eq!(found, Version::new(3, 18, 9));
                assert_eq!(required, MIN_HELM_VERSION);
            }
            other => panic!("expected TooOld, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_not_lexicographic_ordering() {
        assert!(check_minimum_version("v3.100.0", &MIN_HELM_VERSION).is_ok());
        assert!(check_minimum_version("v3.9.0", &MIN_HELM_VERSION).is_err());
    }

    #[test]
    fn test_rejects_non_semver_components() {
        for raw in ["a.b.c", "v3.x.0", "03.19.0", "3..0"] {
            assert!(
                matches!(
                    check_minimum_version(raw, &MIN_HELM_VERSION),
                    Err(VersionError::Format { .. })
                ),
                "expected format error for {:?}",
                raw
            );
        }
    }

    struct BrokenHelm;

    #[async_trait::async_trait]
    impl RegistryTool for BrokenHelm {
        async fn version(&self) -> Result<String, crate::error::ToolError> {
            Err(crate::error::ToolError::Failed {
                command: "helm version --short".to_string(),
                exit_code: 2,
                stderr: "Error: unknown flag".to_string(),
            })
        }

        async fn login(
            &self,
            _registry_host: &str,
            _credentials: &crate::config::Credentials,
            _transport: crate::config::TransportFlags,
        ) -> Result<(), crate::error::ToolError> {
            unreachable!("login is never attempted by the version check")
        }

        async fn push(
            &self,
            _chart: &std::path::Path,
            _destination: &crate::models::DestinationCoordinate,
            _transport: crate::config::TransportFlags,
        ) -> Result<(), crate::error::ToolError> {
            unreachable!("push is never attempted by the version check")
        }
    }

    #[tokio::test]
    async fn test_failing_version_command() {
        let err = verify_tool_version(&BrokenHelm, &MIN_HELM_VERSION)
            .await
            .unwrap_err();
        match err {
            VersionError::Probe(crate::error::ToolError::Failed { exit_code, .. }) => {
                assert_eq!(exit_code, 2)
            }
            other => panic!("expected Probe, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_message_keeps_raw_output() {
        let err = check_minimum_version("v3.19", &MIN_HELM_VERSION).unwrap_err();
        assert!(err.to_string().contains("v3.19"));
    }
}
