//! Loading the Swagger document from a URL or a local file.

use std::path::PathBuf;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;

/// Where the Swagger document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Url(String),
    File(PathBuf),
}

impl SpecSource {
    /// `http(s)://` locations are fetched; anything else is a file path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::File(PathBuf::from(location))
        }
    }

    pub fn load(&self, client: &Client) -> Result<Value, SourceError> {
        let text = match self {
            Self::Url(url) => {
                debug!(%url, "fetching spec");
                client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.text())
                    .map_err(|source| SourceError::Fetch {
                        url: url.clone(),
                        source,
                    })?
            }
            Self::File(path) => {
                debug!(path = %path.display(), "reading spec");
                std::fs::read_to_string(path).map_err(|source| SourceError::Read {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        serde_json::from_str(&text).map_err(SourceError::Parse)
    }
}

/// Base URL declared by a Swagger 2.0 document (`schemes`, `host`, `basePath`).
pub fn base_url_from_spec(spec: &Value) -> Option<String> {
    let host = spec.get("host")?.as_str()?;
    let scheme = spec
        .get("schemes")
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
        .and_then(|s| s.as_str())
        .unwrap_or("https");
    let base_path = spec
        .get("basePath")
        .and_then(|b| b.as_str())
        .unwrap_or("/")
        .trim_end_matches('/');
    Some(format!("{scheme}://{host}{base_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_distinguishes_urls_from_paths() {
        assert_eq!(
            SpecSource::parse("https://dss.example.org/v1/swagger.json"),
            SpecSource::Url("https://dss.example.org/v1/swagger.json".into())
        );
        assert_eq!(
            SpecSource::parse("./swagger.json"),
            SpecSource::File(PathBuf::from("./swagger.json"))
        );
    }

    #[test]
    fn load_fetches_from_url() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/swagger.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"swagger":"2.0","paths":{}}"#)
            .create();

        let source = SpecSource::parse(&format!("{}/swagger.json", server.url()));
        let spec = source.load(&Client::new()).unwrap();
        assert_eq!(spec["swagger"], "2.0");
        mock.assert();
    }

    #[test]
    fn load_reports_fetch_failure_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/swagger.json").with_status(503).create();

        let source = SpecSource::parse(&format!("{}/swagger.json", server.url()));
        let err = source.load(&Client::new()).unwrap_err();
        assert!(matches!(err, SourceError::Fetch { .. }));
    }

    #[test]
    fn load_reads_local_file() {
        let path = std::env::temp_dir().join(format!("swagger-clap-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"paths":{"/x":{}}}"#).unwrap();

        let spec = SpecSource::File(path.clone()).load(&Client::new()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(spec["paths"]["/x"].is_object());
    }

    #[test]
    fn load_rejects_invalid_json_and_missing_files() {
        let path = std::env::temp_dir().join(format!("swagger-clap-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").unwrap();
        let err = SpecSource::File(path.clone()).load(&Client::new()).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, SourceError::Parse(_)));

        let err = SpecSource::File(PathBuf::from("/nonexistent/swagger.json"))
            .load(&Client::new())
            .unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }

    #[test]
    fn base_url_from_swagger_fields() {
        let spec = json!({"host": "dss.data.example.org", "basePath": "/v1/", "schemes": ["https"]});
        assert_eq!(
            base_url_from_spec(&spec).as_deref(),
            Some("https://dss.data.example.org/v1")
        );
        assert_eq!(
            base_url_from_spec(&json!({"host": "localhost:5000", "schemes": ["http"]})).as_deref(),
            Some("http://localhost:5000")
        );
        assert!(base_url_from_spec(&json!({})).is_none());
    }
}
