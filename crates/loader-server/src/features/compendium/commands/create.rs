//! Create compendium command
//!
//! The one state-changing intake operation: normalize the reference, resolve
//! it against Zenodo (skipped for direct uploads), acquire the content, and
//! create the durable record. Returns before extraction begins; the
//! dispatcher continues in the background.

use mediator::Request;
use serde::Serialize;
use tracing::info;

use crate::db::NewCompendium;
use crate::error::ApiError;
use crate::features::FeatureState;
use crate::staging::{generate_compendium_id, AcquireSource};
use crate::zenodo::{normalize, remote_record_id, ExternalReference, IntakeFields, UploadedFile};

/// The only content type this service loads.
pub const SUPPORTED_CONTENT_TYPE: &str = "compendium_v1";

/// Intake request fields, as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct CreateCompendiumCommand {
    pub content_type: String,
    pub share_url: Option<String>,
    pub doi: Option<String>,
    pub zenodo_record_id: Option<String>,
    pub filename: Option<String>,
    pub upload: Option<UploadedFile>,
}

/// The caller gets the fresh compendium id and nothing else; everything
/// after record creation is observable via the status query.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCompendiumResponse {
    pub id: String,
}

impl Request<Result<CreateCompendiumResponse, ApiError>> for CreateCompendiumCommand {}

impl CreateCompendiumCommand {
    fn intake_fields(&self) -> IntakeFields {
        IntakeFields {
            share_url: self.share_url.clone(),
            doi: self.doi.clone(),
            zenodo_record_id: self.zenodo_record_id.clone(),
            upload: self.upload.clone(),
            filename: self.filename.clone(),
        }
    }
}

/// Reject anything but the supported compendium content type.
pub fn ensure_supported_content_type(content_type: &str) -> Result<(), ApiError> {
    if content_type == SUPPORTED_CONTENT_TYPE {
        Ok(())
    } else {
        Err(ApiError::UnsupportedContentType)
    }
}

#[tracing::instrument(skip(state, command))]
pub async fn handle(
    state: FeatureState,
    command: CreateCompendiumCommand,
) -> Result<CreateCompendiumResponse, ApiError> {
    ensure_supported_content_type(&command.content_type)?;

    let reference = normalize(
        &command.intake_fields(),
        &state.config.zenodo.allowed_hosts,
    )?;

    let compendium_id = generate_compendium_id();

    let source = match &reference {
        ExternalReference::DirectUpload {
            incoming_path,
            original_filename,
        } => AcquireSource::LocalUpload {
            incoming_path: incoming_path.clone(),
            original_filename: original_filename.clone(),
        },
        remote => {
            let record_id = remote_record_id(remote)
                .map_err(ApiError::Reference)?
                .ok_or_else(|| ApiError::BadRequest("missing compendium source".to_string()))?;

            let resolved = state
                .zenodo
                .resolve(&record_id, command.filename.as_deref())
                .await?;

            AcquireSource::Remote {
                download_url: resolved.download_url,
                filename: resolved.filename,
            }
        },
    };

    let staged = state.acquirer.acquire(source, &compendium_id).await?;

    let new = NewCompendium {
        id: compendium_id.clone(),
        source_kind: reference.kind().to_string(),
        source_reference: reference.reference(),
        original_filename: Some(staged.filename.clone()),
        checksum: staged.checksum.clone(),
    };

    if let Err(e) = state.store.create(&new).await {
        // No record, no staged content: release everything before surfacing.
        let _ = tokio::fs::remove_dir_all(&staged.dir).await;
        return Err(e.into());
    }

    state
        .dispatcher
        .dispatch_extraction(compendium_id.clone(), staged.dir.clone());

    info!(
        compendium_id = %compendium_id,
        source_kind = reference.kind(),
        source = %staged.source_description,
        "compendium created"
    );

    Ok(CreateCompendiumResponse { id: compendium_id })
}
