//! Reference normalization
//!
//! Parses the intake request fields into exactly one tagged
//! [`ExternalReference`] variant. Pure validation over input strings; network
//! access only ever happens after a reference has normalized successfully.
//!
//! Rejection messages are part of the public API contract and must stay
//! stable (clients match on them).

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Registrant/suffix DOI grammar.
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("hard-coded regex parses"));

/// Numeric Zenodo record id at the end of a DOI suffix, e.g. `zenodo.69114`.
static ZENODO_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)zenodo\.(\d+)$").expect("hard-coded regex parses"));

/// Raw intake fields as handed over by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct IntakeFields {
    pub share_url: Option<String>,
    pub doi: Option<String>,
    pub zenodo_record_id: Option<String>,
    pub upload: Option<UploadedFile>,
    pub filename: Option<String>,
}

/// A file the transport layer already wrote into the incoming directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub incoming_path: PathBuf,
    pub original_filename: String,
}

/// One canonical compendium source, exactly one per intake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalReference {
    DirectUpload {
        incoming_path: PathBuf,
        original_filename: String,
    },
    ShareUrl {
        url: Url,
        record_id: String,
    },
    Doi {
        doi: String,
    },
    RecordId {
        record_id: String,
    },
}

impl ExternalReference {
    /// Short tag persisted with the compendium record.
    pub fn kind(&self) -> &'static str {
        match self {
            ExternalReference::DirectUpload { .. } => "upload",
            ExternalReference::ShareUrl { .. } => "share_url",
            ExternalReference::Doi { .. } => "doi",
            ExternalReference::RecordId { .. } => "zenodo_record_id",
        }
    }

    /// The reference as the caller supplied it, for persistence and logs.
    pub fn reference(&self) -> String {
        match self {
            ExternalReference::DirectUpload {
                original_filename, ..
            } => original_filename.clone(),
            ExternalReference::ShareUrl { url, .. } => url.to_string(),
            ExternalReference::Doi { doi } => doi.clone(),
            ExternalReference::RecordId { record_id } => record_id.clone(),
        }
    }
}

/// Normalization failures, one per rejected input shape.
///
/// Display strings are the caller-facing error messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("public share URL is invalid")]
    InvalidShareUrl,

    #[error("host is not allowed")]
    HostNotAllowed,

    #[error("zenodo ID is not a number")]
    IdNotANumber,

    #[error("DOI is invalid")]
    InvalidDoi,

    #[error("zenodo_record_id is invalid")]
    InvalidRecordId,

    #[error("exactly one of share_url, doi, zenodo_record_id or an uploaded file must be provided")]
    AmbiguousSource,
}

/// Parse intake fields into exactly one [`ExternalReference`] variant.
///
/// `allowed_hosts` is the configured trust list for share URLs; it is matched
/// against the URL host case-insensitively, after URL syntax validation and
/// before record-id extraction.
pub fn normalize(
    fields: &IntakeFields,
    allowed_hosts: &[String],
) -> Result<ExternalReference, ReferenceError> {
    let provided = [
        fields.share_url.is_some(),
        fields.doi.is_some(),
        fields.zenodo_record_id.is_some(),
        fields.upload.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    if provided != 1 {
        return Err(ReferenceError::AmbiguousSource);
    }

    if let Some(raw) = &fields.share_url {
        return normalize_share_url(raw.trim(), allowed_hosts);
    }

    if let Some(doi) = &fields.doi {
        return normalize_doi(doi.trim());
    }

    if let Some(record_id) = &fields.zenodo_record_id {
        return normalize_record_id(record_id.trim());
    }

    let upload = fields
        .upload
        .as_ref()
        .ok_or(ReferenceError::AmbiguousSource)?;

    Ok(ExternalReference::DirectUpload {
        incoming_path: upload.incoming_path.clone(),
        original_filename: upload.original_filename.clone(),
    })
}

/// Numeric record id for remote variants; `None` for direct uploads.
///
/// DOI suffix extraction happens here rather than in [`normalize`]: the DOI
/// grammar alone does not pin the record, so a well-formed DOI without a
/// `zenodo.<n>` suffix is rejected at the resolution step.
pub fn remote_record_id(
    reference: &ExternalReference,
) -> Result<Option<String>, ReferenceError> {
    match reference {
        ExternalReference::DirectUpload { .. } => Ok(None),
        ExternalReference::ShareUrl { record_id, .. }
        | ExternalReference::RecordId { record_id } => Ok(Some(record_id.clone())),
        ExternalReference::Doi { doi } => Ok(Some(record_id_from_doi(doi)?)),
    }
}

fn normalize_share_url(
    raw: &str,
    allowed_hosts: &[String],
) -> Result<ExternalReference, ReferenceError> {
    let url = Url::parse(raw).map_err(|_| ReferenceError::InvalidShareUrl)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ReferenceError::InvalidShareUrl);
    }

    let host = url.host_str().ok_or(ReferenceError::InvalidShareUrl)?;

    if !allowed_hosts
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(host))
    {
        return Err(ReferenceError::HostNotAllowed);
    }

    let record_id = if is_doi_proxy(host) {
        // A doi.org share URL carries the DOI in its path; the record id is
        // the zenodo suffix of that DOI.
        let doi = url.path().trim_start_matches('/');
        record_id_from_doi(doi)?
    } else {
        record_id_from_record_path(&url)?
    };

    Ok(ExternalReference::ShareUrl { url, record_id })
}

fn normalize_doi(doi: &str) -> Result<ExternalReference, ReferenceError> {
    if !DOI_RE.is_match(doi) {
        return Err(ReferenceError::InvalidDoi);
    }

    Ok(ExternalReference::Doi {
        doi: doi.to_string(),
    })
}

fn normalize_record_id(record_id: &str) -> Result<ExternalReference, ReferenceError> {
    match record_id.parse::<u64>() {
        Ok(n) if n > 0 => Ok(ExternalReference::RecordId {
            record_id: record_id.to_string(),
        }),
        _ => Err(ReferenceError::InvalidRecordId),
    }
}

fn is_doi_proxy(host: &str) -> bool {
    host.eq_ignore_ascii_case("doi.org") || host.to_ascii_lowercase().ends_with(".doi.org")
}

/// Extract the numeric record id from a `zenodo.<n>` DOI suffix.
pub(crate) fn record_id_from_doi(doi: &str) -> Result<String, ReferenceError> {
    ZENODO_SUFFIX_RE
        .captures(doi)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ReferenceError::IdNotANumber)
}

/// Extract the record id from a zenodo record URL path.
///
/// Takes the segment following `record`/`records` when present, the last
/// path segment otherwise.
fn record_id_from_record_path(url: &Url) -> Result<String, ReferenceError> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = segments
        .iter()
        .position(|seg| *seg == "record" || *seg == "records")
        .and_then(|pos| segments.get(pos + 1))
        .or_else(|| segments.last())
        .ok_or(ReferenceError::IdNotANumber)?;

    match candidate.parse::<u64>() {
        Ok(n) if n > 0 => Ok((*candidate).to_string()),
        _ => Err(ReferenceError::IdNotANumber),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> Vec<String> {
        vec![
            "zenodo.org".to_string(),
            "sandbox.zenodo.org".to_string(),
            "doi.org".to_string(),
        ]
    }

    fn fields_with_share_url(url: &str) -> IntakeFields {
        IntakeFields {
            share_url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_share_url_record_id_extracted() {
        let reference = normalize(
            &fields_with_share_url("https://sandbox.zenodo.org/record/69114"),
            &hosts(),
        )
        .unwrap();

        assert!(matches!(
            reference,
            ExternalReference::ShareUrl { ref record_id, .. } if record_id == "69114"
        ));
    }

    #[test]
    fn test_malformed_share_url_rejected() {
        let err = normalize(
            &fields_with_share_url("htts?///sandbox.zenodo.org/record/69114"),
            &hosts(),
        )
        .unwrap_err();

        assert_eq!(err, ReferenceError::InvalidShareUrl);
        assert_eq!(err.to_string(), "public share URL is invalid");
    }

    #[test]
    fn test_share_url_host_not_allowed() {
        let err = normalize(
            &fields_with_share_url("https://sandbox.odonez.org/record/69114"),
            &hosts(),
        )
        .unwrap_err();

        assert_eq!(err, ReferenceError::HostNotAllowed);
        assert_eq!(err.to_string(), "host is not allowed");
    }

    #[test]
    fn test_share_url_non_numeric_record_id() {
        let err = normalize(
            &fields_with_share_url("https://sandbox.zenodo.org/record/asdfasdf"),
            &hosts(),
        )
        .unwrap_err();

        assert_eq!(err, ReferenceError::IdNotANumber);
        assert_eq!(err.to_string(), "zenodo ID is not a number");
    }

    #[test]
    fn test_doi_org_share_url_uses_doi_suffix() {
        let reference = normalize(
            &fields_with_share_url("http://doi.org/10.5072/zenodo.69114"),
            &hosts(),
        )
        .unwrap();

        assert!(matches!(
            reference,
            ExternalReference::ShareUrl { ref record_id, .. } if record_id == "69114"
        ));
    }

    #[test]
    fn test_valid_doi_passes_grammar() {
        let fields = IntakeFields {
            doi: Some("10.5072/zenodo.69114".to_string()),
            ..Default::default()
        };

        let reference = normalize(&fields, &hosts()).unwrap();
        assert_eq!(reference.kind(), "doi");
        assert_eq!(
            remote_record_id(&reference).unwrap().as_deref(),
            Some("69114")
        );
    }

    #[test]
    fn test_malformed_doi_rejected() {
        let fields = IntakeFields {
            doi: Some("invalid.doi/09983123".to_string()),
            ..Default::default()
        };

        let err = normalize(&fields, &hosts()).unwrap_err();
        assert_eq!(err, ReferenceError::InvalidDoi);
        assert_eq!(err.to_string(), "DOI is invalid");
    }

    #[test]
    fn test_doi_without_zenodo_suffix_fails_at_extraction() {
        let fields = IntakeFields {
            doi: Some("10.5072/other.suffix".to_string()),
            ..Default::default()
        };

        let reference = normalize(&fields, &hosts()).unwrap();
        let err = remote_record_id(&reference).unwrap_err();
        assert_eq!(err, ReferenceError::IdNotANumber);
    }

    #[test]
    fn test_record_id_accepted() {
        let fields = IntakeFields {
            zenodo_record_id: Some("69114".to_string()),
            ..Default::default()
        };

        let reference = normalize(&fields, &hosts()).unwrap();
        assert_eq!(
            remote_record_id(&reference).unwrap().as_deref(),
            Some("69114")
        );
    }

    #[test]
    fn test_non_numeric_record_id_rejected() {
        let fields = IntakeFields {
            zenodo_record_id: Some("eigthhundredseventytwo".to_string()),
            ..Default::default()
        };

        let err = normalize(&fields, &hosts()).unwrap_err();
        assert_eq!(err, ReferenceError::InvalidRecordId);
        assert_eq!(err.to_string(), "zenodo_record_id is invalid");
    }

    #[test]
    fn test_zero_record_id_rejected() {
        let fields = IntakeFields {
            zenodo_record_id: Some("0".to_string()),
            ..Default::default()
        };

        assert_eq!(
            normalize(&fields, &hosts()).unwrap_err(),
            ReferenceError::InvalidRecordId
        );
    }

    #[test]
    fn test_no_source_rejected() {
        let err = normalize(&IntakeFields::default(), &hosts()).unwrap_err();
        assert_eq!(err, ReferenceError::AmbiguousSource);
    }

    #[test]
    fn test_multiple_sources_rejected() {
        let fields = IntakeFields {
            share_url: Some("https://zenodo.org/record/1".to_string()),
            doi: Some("10.5072/zenodo.1".to_string()),
            ..Default::default()
        };

        assert_eq!(
            normalize(&fields, &hosts()).unwrap_err(),
            ReferenceError::AmbiguousSource
        );
    }

    #[test]
    fn test_upload_normalizes_to_direct_upload() {
        let fields = IntakeFields {
            upload: Some(UploadedFile {
                incoming_path: PathBuf::from("/tmp/loader/incoming/abc"),
                original_filename: "metatainer.zip".to_string(),
            }),
            ..Default::default()
        };

        let reference = normalize(&fields, &hosts()).unwrap();
        assert_eq!(reference.kind(), "upload");
        assert_eq!(reference.reference(), "metatainer.zip");
        assert_eq!(remote_record_id(&reference).unwrap(), None);
    }

    #[test]
    fn test_validation_order_syntax_before_host() {
        // A URL that is both malformed and host-unknown must report the
        // syntax failure.
        let err = normalize(&fields_with_share_url("not a url at all"), &hosts()).unwrap_err();
        assert_eq!(err, ReferenceError::InvalidShareUrl);
    }
}
