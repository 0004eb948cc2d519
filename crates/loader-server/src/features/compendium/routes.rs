//! Compendium HTTP routes
//!
//! The intake endpoint accepts both transports the loader has always spoken:
//! `multipart/form-data` for direct uploads and
//! `application/x-www-form-urlencoded` for reference-based intake.

use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::commands::create::{self, CreateCompendiumCommand};
use super::queries::get::{self as get_query, GetCompendiumQuery};
use crate::error::{ApiError, ApiResult};
use crate::features::FeatureState;
use crate::staging::generate_compendium_id;
use crate::zenodo::UploadedFile;

pub fn compendium_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", post(create_compendium))
        .route("/:id", get(get_compendium))
}

/// Reference-based intake body (urlencoded form).
#[derive(Debug, Deserialize)]
struct IntakeForm {
    content_type: Option<String>,
    share_url: Option<String>,
    doi: Option<String>,
    zenodo_record_id: Option<String>,
    filename: Option<String>,
}

#[tracing::instrument(skip(state, request))]
async fn create_compendium(
    State(state): State<FeatureState>,
    request: Request,
) -> ApiResult<Response> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let command = parse_intake_request(&state, request).await?;
    let upload_path = command
        .upload
        .as_ref()
        .map(|upload| upload.incoming_path.clone());

    let response = match create::handle(state.clone(), command).await {
        Ok(response) => response,
        Err(e) => {
            // A rejected request must leave nothing behind in the incoming
            // directory.
            if let Some(path) = upload_path {
                let _ = tokio::fs::remove_file(&path).await;
            }
            return Err(e);
        },
    };

    if let Some(notifier) = &state.notifier {
        let base = host.unwrap_or_else(|| {
            format!("{}:{}", state.config.server.host, state.config.server.port)
        });
        notifier.compendium_created(
            format!("http://{}/api/v1/compendium/{}", base, response.id),
            None,
        );
    }

    Ok((StatusCode::OK, Json(json!({ "id": response.id }))).into_response())
}

#[tracing::instrument(skip(state), fields(compendium_id = %id))]
async fn get_compendium(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let compendium = get_query::handle(
        state.store.clone(),
        GetCompendiumQuery { compendium_id: id },
    )
    .await?;

    Ok((StatusCode::OK, Json(compendium)).into_response())
}

/// Turn either transport shape into the intake command.
async fn parse_intake_request(
    state: &FeatureState,
    request: Request,
) -> ApiResult<CreateCompendiumCommand> {
    let content_type_header = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type_header.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| ApiError::BadRequest("invalid multipart body".to_string()))?;
        read_multipart(state, multipart).await
    } else {
        let Form(form) = Form::<IntakeForm>::from_request(request, &())
            .await
            .map_err(|_| ApiError::BadRequest("invalid form body".to_string()))?;

        Ok(CreateCompendiumCommand {
            content_type: form.content_type.unwrap_or_default(),
            share_url: form.share_url,
            doi: form.doi,
            zenodo_record_id: form.zenodo_record_id,
            filename: form.filename,
            upload: None,
        })
    }
}

async fn read_multipart(
    state: &FeatureState,
    mut multipart: Multipart,
) -> ApiResult<CreateCompendiumCommand> {
    let mut command = CreateCompendiumCommand {
        content_type: String::new(),
        share_url: None,
        doi: None,
        zenodo_record_id: None,
        filename: None,
        upload: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart body".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "content_type" => command.content_type = field_text(field).await?,
            "share_url" => command.share_url = Some(field_text(field).await?),
            "doi" => command.doi = Some(field_text(field).await?),
            "zenodo_record_id" => command.zenodo_record_id = Some(field_text(field).await?),
            "filename" => command.filename = Some(field_text(field).await?),
            "compendium" | "file" => {
                let original_filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "compendium.zip".to_string());

                let bytes = field.bytes().await.map_err(|_| {
                    ApiError::BadRequest("could not read uploaded file".to_string())
                })?;

                let incoming_path = state
                    .config
                    .staging
                    .incoming_dir()
                    .join(generate_compendium_id());

                tokio::fs::write(&incoming_path, &bytes).await.map_err(|e| {
                    ApiError::Internal(
                        anyhow::Error::new(e).context("failed to persist upload"),
                    )
                })?;

                command.upload = Some(UploadedFile {
                    incoming_path,
                    original_filename,
                });
            },
            _ => {
                // Drain and ignore unknown fields.
                let _ = field.bytes().await;
            },
        }
    }

    Ok(command)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart field".to_string()))
}
