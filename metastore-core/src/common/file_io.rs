//! File reading helpers with consistent error context

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use crate::error::{MetastoreError, MetastoreResult};

/// Read a text file, reporting failures as configuration errors
pub async fn read_text_file_with_context<P: AsRef<Path>>(
    path: P,
    context: &str,
) -> MetastoreResult<String> {
    let path = path.as_ref();
    debug!("Reading {} from {:?}", context, path);

    tokio::fs::read_to_string(path).await.map_err(|e| {
        MetastoreError::configuration(
            "file_io",
            format!("Failed to read {}: {} (path: {:?})", context, e, path),
        )
    })
}

/// Read and deserialize a configuration file (TOML or JSON)
///
/// The format follows the file extension; anything else is tried as TOML
/// and then as JSON.
pub async fn read_config_file<T, P>(path: P, file_type: &str) -> MetastoreResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content =
        read_text_file_with_context(path, &format!("{} configuration", file_type)).await?;

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "json" => serde_json::from_str(&content).map_err(|e| {
            MetastoreError::configuration(
                "json_parser",
                format!("Failed to parse JSON {}: {}", file_type, e),
            )
        }),
        "toml" => toml::from_str(&content).map_err(|e| {
            MetastoreError::configuration(
                "toml_parser",
                format!("Failed to parse TOML {}: {}", file_type, e),
            )
        }),
        _ => toml::from_str(&content)
            .or_else(|_| serde_json::from_str(&content))
            .map_err(|e| {
                MetastoreError::configuration(
                    "config_parser",
                    format!("Unrecognized format for {} ({:?}): {}", file_type, path, e),
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: u32,
    }

    #[tokio::test]
    async fn test_read_toml_and_json() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("sample.toml");
        let json_path = dir.path().join("sample.json");
        std::fs::write(&toml_path, "name = \"a\"\nvalue = 1\n").unwrap();
        std::fs::write(&json_path, r#"{"name":"b","value":2}"#).unwrap();

        let a: Sample = read_config_file(&toml_path, "sample").await.unwrap();
        let b: Sample = read_config_file(&json_path, "sample").await.unwrap();
        assert_eq!(a, Sample { name: "a".into(), value: 1 });
        assert_eq!(b, Sample { name: "b".into(), value: 2 });
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file::<Sample, _>(dir.path().join("absent.toml"), "sample")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetastoreError::ConfigurationError { ref component, .. } if component == "file_io"
        ));
    }
}
