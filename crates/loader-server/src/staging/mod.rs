//! Content acquisition and staging
//!
//! Moves compendium content into the staging area, one directory per
//! generated compendium id. This is the only place network latency is
//! absorbed: remote downloads run with a configurable timeout and bounded
//! retries for transient transport failures.
//!
//! Error hygiene: the caller-facing download error carries the failing remote
//! URL and nothing else. Local staging paths stay out of every message;
//! failure details go to the operator log.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use loader_common::checksum::compute_file_checksum;

use crate::config::{StagingConfig, ZenodoConfig};

/// Staged compendium content, ready to be recorded and dispatched.
#[derive(Debug, Clone)]
pub struct StagedContent {
    pub compendium_id: String,
    pub dir: PathBuf,
    pub file_path: PathBuf,
    pub filename: String,
    pub source_description: String,
    pub checksum: String,
}

/// Where the content comes from.
#[derive(Debug, Clone)]
pub enum AcquireSource {
    /// Already resident in the incoming directory (direct upload).
    LocalUpload {
        incoming_path: PathBuf,
        original_filename: String,
    },
    /// Streamed from a resolved remote URL.
    Remote {
        download_url: String,
        filename: String,
    },
}

impl AcquireSource {
    fn description(&self) -> String {
        match self {
            AcquireSource::LocalUpload {
                original_filename, ..
            } => format!("upload of {original_filename}"),
            AcquireSource::Remote { download_url, .. } => download_url.clone(),
        }
    }
}

/// Acquisition failures.
///
/// `DownloadFailed`'s message is part of the API contract; it names the
/// remote URL and must never include a local path.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("download failed: {url}")]
    DownloadFailed { url: String },

    #[error("staging failed")]
    Staging(#[source] std::io::Error),
}

// Per-attempt download outcome, internal to the retry loop.
enum AttemptError {
    Transport { retryable: bool, cause: String },
    Io(std::io::Error),
}

/// Generate a fresh opaque compendium identifier.
///
/// Fixed-length, collision-resistant, never derived from caller input.
pub fn generate_compendium_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Acquires compendium content into the staging area.
#[derive(Debug, Clone)]
pub struct Acquirer {
    http: reqwest::Client,
    compendium_dir: PathBuf,
    download_timeout: Duration,
    max_retries: u32,
}

impl Acquirer {
    /// Create a new acquirer from configuration.
    pub fn new(staging: &StagingConfig, zenodo: &ZenodoConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("loader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            compendium_dir: staging.compendium_dir(),
            download_timeout: Duration::from_secs(zenodo.download_timeout_secs),
            max_retries: zenodo.download_retries,
        })
    }

    /// Acquire content into `<staging>/<compendium_id>/<filename>`.
    ///
    /// On any failure the staging directory for this id is discarded; no
    /// partial file outlives an error.
    #[tracing::instrument(skip(self, source), fields(compendium_id = %compendium_id))]
    pub async fn acquire(
        &self,
        source: AcquireSource,
        compendium_id: &str,
    ) -> Result<StagedContent, AcquireError> {
        let dir = self.compendium_dir.join(compendium_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(AcquireError::Staging)?;

        let staged = match &source {
            AcquireSource::LocalUpload {
                incoming_path,
                original_filename,
            } => self.stage_local(incoming_path, original_filename, &dir).await,
            AcquireSource::Remote {
                download_url,
                filename,
            } => self.download_with_retry(download_url, filename, &dir).await,
        };

        let file_path = match staged {
            Ok(path) => path,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(e);
            },
        };

        let checksum = match file_checksum(&file_path).await {
            Ok(checksum) => checksum,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(AcquireError::Staging(e));
            },
        };

        let filename = file_name_of(&file_path);
        info!(
            compendium_id = %compendium_id,
            filename = %filename,
            checksum = %checksum,
            "content staged"
        );

        Ok(StagedContent {
            compendium_id: compendium_id.to_string(),
            dir,
            file_path,
            filename,
            source_description: source.description(),
            checksum,
        })
    }

    /// Move an already-uploaded file into the staging directory.
    async fn stage_local(
        &self,
        incoming_path: &Path,
        original_filename: &str,
        dir: &Path,
    ) -> Result<PathBuf, AcquireError> {
        let metadata = tokio::fs::metadata(incoming_path)
            .await
            .map_err(AcquireError::Staging)?;

        if !metadata.is_file() {
            return Err(AcquireError::Staging(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "uploaded content is not a regular file",
            )));
        }

        let target = dir.join(sanitize_filename(original_filename));

        if let Err(rename_err) = tokio::fs::rename(incoming_path, &target).await {
            // Incoming and staging may live on different filesystems.
            debug!(error = %rename_err, "rename failed, copying instead");
            tokio::fs::copy(incoming_path, &target)
                .await
                .map_err(AcquireError::Staging)?;
            let _ = tokio::fs::remove_file(incoming_path).await;
        }

        Ok(target)
    }

    /// Stream a remote file to the staging directory, retrying transient
    /// transport failures with exponential backoff.
    async fn download_with_retry(
        &self,
        url: &str,
        filename: &str,
        dir: &Path,
    ) -> Result<PathBuf, AcquireError> {
        let target = dir.join(sanitize_filename(filename));

        for attempt in 1..=self.max_retries {
            match self.download_once(url, &target).await {
                Ok(()) => return Ok(target),
                Err(AttemptError::Io(e)) => {
                    // Local write failure, not a transport problem.
                    return Err(AcquireError::Staging(e));
                },
                Err(AttemptError::Transport { retryable, cause }) => {
                    let _ = tokio::fs::remove_file(&target).await;
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts = self.max_retries,
                        cause = %cause,
                        "download attempt failed"
                    );

                    if !retryable {
                        break;
                    }

                    if attempt < self.max_retries {
                        let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                        tokio::time::sleep(backoff).await;
                    }
                },
            }
        }

        Err(AcquireError::DownloadFailed {
            url: url.to_string(),
        })
    }

    async fn download_once(&self, url: &str, target: &Path) -> Result<(), AttemptError> {
        let response = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| AttemptError::Transport {
                retryable: true,
                cause: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Transport {
                retryable: status.is_server_error(),
                cause: format!("HTTP status {status}"),
            });
        }

        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(AttemptError::Io)?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AttemptError::Transport {
                retryable: true,
                cause: e.to_string(),
            })?;
            file.write_all(&chunk).await.map_err(AttemptError::Io)?;
        }

        file.flush().await.map_err(AttemptError::Io)?;

        Ok(())
    }
}

async fn file_checksum(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_file_checksum(&path))
        .await
        .map_err(std::io::Error::other)?
        .map_err(std::io::Error::other)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "compendium".to_string())
}

/// Keep only the final path component of a caller-supplied filename.
fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| "compendium".to_string())
}
