//! Zenodo repository resolver
//!
//! Looks up a numeric record id against the Zenodo records API and selects
//! the target file. Resolution is attempted exactly once; transient download
//! retries belong to the acquisition step, not here.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::reference::ReferenceError;
use crate::config::ZenodoConfig;

/// Resolved external metadata for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZenodoRecord {
    pub record_id: String,
    pub files: Vec<ZenodoFile>,
}

/// One downloadable file of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZenodoFile {
    pub filename: String,
    pub download_url: String,
}

/// The selected file of a resolved record, ready for acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub record_id: String,
    pub filename: String,
    pub download_url: String,
}

/// Resolution failures. Validation failures never reach this stage.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("zenodo record {0} was not found")]
    RecordNotFound(String),

    #[error("zenodo repository request failed: {0}")]
    Upstream(String),

    #[error("zenodo record has no files")]
    NoFiles,

    #[error("filename must be given, zenodo record contains more than one file")]
    AmbiguousFile,
}

// Wire format of the records API; only the parts this service reads.
#[derive(Debug, Deserialize)]
struct RecordResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    key: String,
    #[serde(default)]
    links: FileLinks,
}

#[derive(Debug, Default, Deserialize)]
struct FileLinks {
    #[serde(rename = "self")]
    download: Option<String>,
}

/// Client for the Zenodo records API.
#[derive(Debug, Clone)]
pub struct ZenodoClient {
    http: reqwest::Client,
    api_base: String,
    record_base: String,
}

impl ZenodoClient {
    /// Create a new client from configuration.
    pub fn new(config: &ZenodoConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(concat!("loader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            record_base: config.record_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Canonical download URL for a file within a record.
    pub fn file_url(&self, record_id: &str, filename: &str) -> String {
        format!("{}/record/{}/files/{}", self.record_base, record_id, filename)
    }

    /// Fetch record metadata from the records API.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_record(&self, record_id: &str) -> Result<ZenodoRecord, ResolveError> {
        let url = format!("{}/records/{}", self.api_base, record_id);
        debug!(url = %url, "querying zenodo records API");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Upstream(format!("zenodo API unreachable: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::GONE
        {
            return Err(ResolveError::RecordNotFound(record_id.to_string()));
        }

        if !response.status().is_success() {
            return Err(ResolveError::Upstream(format!(
                "zenodo API returned {} for record {}",
                response.status(),
                record_id
            )));
        }

        let body: RecordResponse = response
            .json()
            .await
            .map_err(|_| ResolveError::Upstream("unexpected response body from zenodo API".to_string()))?;

        let files = body
            .files
            .into_iter()
            .map(|entry| {
                let download_url = entry
                    .links
                    .download
                    .unwrap_or_else(|| self.file_url(record_id, &entry.key));
                ZenodoFile {
                    filename: entry.key,
                    download_url,
                }
            })
            .collect();

        Ok(ZenodoRecord {
            record_id: record_id.to_string(),
            files,
        })
    }

    /// Resolve a record id to the file to acquire.
    ///
    /// With an explicit `filename`, the file is selected by exact name. When
    /// the name is absent from the record's listing, the canonical download
    /// URL is still constructed so that the acquisition failure names exactly
    /// the remote file the caller asked for. Without a `filename`, a
    /// single-file record selects implicitly; multi-file records are an
    /// ambiguity error.
    pub async fn resolve(
        &self,
        record_id: &str,
        filename: Option<&str>,
    ) -> Result<ResolvedSource, ResolveError> {
        let record = self.fetch_record(record_id).await?;

        let (filename, download_url) = match filename {
            Some(name) => match record.files.iter().find(|f| f.filename == name) {
                Some(file) => (file.filename.clone(), file.download_url.clone()),
                None => {
                    warn!(
                        record_id = %record_id,
                        filename = %name,
                        "requested filename not in record listing"
                    );
                    (name.to_string(), self.file_url(record_id, name))
                },
            },
            None => match record.files.as_slice() {
                [] => return Err(ResolveError::NoFiles),
                [single] => (single.filename.clone(), single.download_url.clone()),
                _ => return Err(ResolveError::AmbiguousFile),
            },
        };

        Ok(ResolvedSource {
            record_id: record.record_id,
            filename,
            download_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ZenodoClient {
        ZenodoClient::new(&ZenodoConfig {
            api_base_url: "https://sandbox.zenodo.org/api/".to_string(),
            record_base_url: "https://sandbox.zenodo.org/".to_string(),
            allowed_hosts: vec!["sandbox.zenodo.org".to_string()],
            download_timeout_secs: 10,
            download_retries: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_file_url_strips_trailing_slash() {
        let client = client();
        assert_eq!(
            client.file_url("69114", "metatainer.zip"),
            "https://sandbox.zenodo.org/record/69114/files/metatainer.zip"
        );
    }

    #[test]
    fn test_record_response_deserializes_api_shape() {
        let body = r#"{
            "id": 69114,
            "files": [
                {
                    "key": "metatainer.zip",
                    "size": 4096,
                    "links": { "self": "https://sandbox.zenodo.org/api/files/x/metatainer.zip" }
                }
            ],
            "metadata": { "title": "A compendium" }
        }"#;

        let parsed: RecordResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].key, "metatainer.zip");
        assert!(parsed.files[0].links.download.as_deref().is_some());
    }

    #[test]
    fn test_record_response_tolerates_missing_links() {
        let body = r#"{ "files": [ { "key": "data.csv" } ] }"#;
        let parsed: RecordResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.files[0].links.download, None);
    }
}
