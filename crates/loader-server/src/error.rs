//! Server-specific error types
//!
//! One taxonomy across every source path: validation and resolution failures
//! return synchronously with no side effects; acquisition failures carry the
//! remote URL only; everything after record creation is absorbed into the
//! record's status and never surfaces here.
//!
//! Response bodies are `{"error": "<message>"}`. The messages for validation
//! and download failures are part of the public contract.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::staging::AcquireError;
use crate::zenodo::{ReferenceError, ResolveError};

/// Result type alias for request handling.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Application error type for the intake API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("Provided content_type not yet implemented, only \"compendium_v1\" is supported.")]
    UnsupportedContentType,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// The HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Reference(e) => reference_status(e),
            ApiError::Resolve(e) => match e {
                ResolveError::Reference(inner) => reference_status(inner),
                ResolveError::RecordNotFound(_) => StatusCode::NOT_FOUND,
                ResolveError::Upstream(_) => StatusCode::BAD_GATEWAY,
                ResolveError::NoFiles => StatusCode::INTERNAL_SERVER_ERROR,
                ResolveError::AmbiguousFile => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Acquire(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnsupportedContentType => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn reference_status(error: &ReferenceError) -> StatusCode {
    match error {
        ReferenceError::HostNotAllowed => StatusCode::FORBIDDEN,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store and internal failures are logged with their cause and
        // sanitized for the caller; everything else's Display is already
        // caller-safe (remote identifiers only, no local paths).
        let message = match &self {
            ApiError::Store(e) => {
                tracing::error!(error = ?e, "store error during request");
                "A database error occurred".to_string()
            },
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "internal error during request");
                "An internal error occurred".to_string()
            },
            other => other.to_string(),
        };

        let body = Json(json!({ "error": message }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn error_body(error: ApiError) -> (StatusCode, String) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, value["error"].as_str().unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_invalid_share_url_contract() {
        let (status, message) = error_body(ReferenceError::InvalidShareUrl.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "public share URL is invalid");
    }

    #[tokio::test]
    async fn test_host_not_allowed_contract() {
        let (status, message) = error_body(ReferenceError::HostNotAllowed.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, "host is not allowed");
    }

    #[tokio::test]
    async fn test_id_not_a_number_contract() {
        let (status, message) = error_body(ReferenceError::IdNotANumber.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "zenodo ID is not a number");
    }

    #[tokio::test]
    async fn test_invalid_doi_contract() {
        let (status, message) = error_body(ReferenceError::InvalidDoi.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "DOI is invalid");
    }

    #[tokio::test]
    async fn test_invalid_record_id_contract() {
        let (status, message) = error_body(ReferenceError::InvalidRecordId.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "zenodo_record_id is invalid");
    }

    #[tokio::test]
    async fn test_download_failed_contract() {
        let error = ApiError::Acquire(AcquireError::DownloadFailed {
            url: "https://sandbox.zenodo.org/record/69114/files/x.zip".to_string(),
        });
        let (status, message) = error_body(error).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            message,
            "download failed: https://sandbox.zenodo.org/record/69114/files/x.zip"
        );
    }

    #[tokio::test]
    async fn test_unsupported_content_type_contract() {
        let (status, message) = error_body(ApiError::UnsupportedContentType).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            message,
            "Provided content_type not yet implemented, only \"compendium_v1\" is supported."
        );
    }

    #[tokio::test]
    async fn test_resolution_failures_carry_distinct_statuses() {
        let (status, _) =
            error_body(ApiError::Resolve(ResolveError::RecordNotFound("9".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            error_body(ApiError::Resolve(ResolveError::Upstream("boom".into()))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = error_body(ApiError::Resolve(ResolveError::AmbiguousFile)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_store_error_is_sanitized() {
        let error = ApiError::Store(StoreError::Database(sqlx::Error::PoolClosed));
        let (status, message) = error_body(error).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "A database error occurred");
    }
}
