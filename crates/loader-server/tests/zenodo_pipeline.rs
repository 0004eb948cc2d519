//! Intake pipeline tests against a mocked Zenodo repository.
//!
//! Covers normalize → resolve → acquire for every reference variant, without
//! a database or container runtime: those seams have their own tests.

use std::io::Cursor;

use loader_common::checksum::compute_checksum;
use loader_server::config::{StagingConfig, ZenodoConfig};
use loader_server::staging::{generate_compendium_id, AcquireSource, Acquirer};
use loader_server::zenodo::{
    normalize, remote_record_id, IntakeFields, ResolveError, UploadedFile, ZenodoClient,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPENDIUM_BYTES: &[u8] = b"PK\x03\x04 reproducible research payload";

fn zenodo_config(server_uri: &str) -> ZenodoConfig {
    ZenodoConfig {
        api_base_url: format!("{server_uri}/api"),
        record_base_url: server_uri.to_string(),
        allowed_hosts: vec!["127.0.0.1".to_string(), "localhost".to_string()],
        download_timeout_secs: 10,
        download_retries: 2,
    }
}

fn acquirer(base: &std::path::Path, server_uri: &str) -> Acquirer {
    Acquirer::new(
        &StagingConfig {
            base_dir: base.to_path_buf(),
        },
        &zenodo_config(server_uri),
    )
    .unwrap()
}

/// Mount a single-file record and its download endpoint.
async fn mount_record(server: &MockServer, record_id: &str, filename: &str) {
    let record_body = serde_json::json!({
        "id": record_id.parse::<u64>().unwrap(),
        "files": [
            {
                "key": filename,
                "links": { "self": format!("{}/files/{}", server.uri(), filename) }
            }
        ]
    });

    Mock::given(method("GET"))
        .and(path(format!("/api/records/{record_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_body))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/files/{filename}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(COMPENDIUM_BYTES))
        .mount(server)
        .await;
}

#[tokio::test]
async fn record_id_intake_stages_the_single_file() {
    let server = MockServer::start().await;
    mount_record(&server, "69114", "metatainer.zip").await;

    let staging = tempfile::tempdir().unwrap();
    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();
    let acquirer = acquirer(staging.path(), &server.uri());

    let resolved = client.resolve("69114", None).await.unwrap();
    assert_eq!(resolved.filename, "metatainer.zip");

    let id = generate_compendium_id();
    let staged = acquirer
        .acquire(
            AcquireSource::Remote {
                download_url: resolved.download_url,
                filename: resolved.filename,
            },
            &id,
        )
        .await
        .unwrap();

    let bytes = tokio::fs::read(&staged.file_path).await.unwrap();
    assert_eq!(bytes, COMPENDIUM_BYTES);

    let expected = compute_checksum(&mut Cursor::new(COMPENDIUM_BYTES)).unwrap();
    assert_eq!(staged.checksum, expected);
}

/// All four reference variants for the same record stage the same bytes.
#[tokio::test]
async fn cross_variant_equivalence() {
    let server = MockServer::start().await;
    mount_record(&server, "69114", "metatainer.zip").await;

    let staging = tempfile::tempdir().unwrap();
    let config = zenodo_config(&server.uri());
    let client = ZenodoClient::new(&config).unwrap();
    let acquirer = acquirer(staging.path(), &server.uri());

    let remote_variants = vec![
        IntakeFields {
            share_url: Some(format!("{}/record/69114", server.uri())),
            ..Default::default()
        },
        IntakeFields {
            doi: Some("10.5072/zenodo.69114".to_string()),
            ..Default::default()
        },
        IntakeFields {
            zenodo_record_id: Some("69114".to_string()),
            ..Default::default()
        },
    ];

    let mut checksums = Vec::new();

    for fields in &remote_variants {
        let reference = normalize(fields, &config.allowed_hosts).unwrap();
        let record_id = remote_record_id(&reference).unwrap().unwrap();
        assert_eq!(record_id, "69114");

        let resolved = client.resolve(&record_id, None).await.unwrap();
        let id = generate_compendium_id();
        let staged = acquirer
            .acquire(
                AcquireSource::Remote {
                    download_url: resolved.download_url,
                    filename: resolved.filename,
                },
                &id,
            )
            .await
            .unwrap();
        checksums.push(staged.checksum);
    }

    // Direct upload of the same content.
    let incoming = staging.path().join("incoming");
    tokio::fs::create_dir_all(&incoming).await.unwrap();
    let upload_path = incoming.join("raw-upload");
    tokio::fs::write(&upload_path, COMPENDIUM_BYTES).await.unwrap();

    let fields = IntakeFields {
        upload: Some(UploadedFile {
            incoming_path: upload_path.clone(),
            original_filename: "metatainer.zip".to_string(),
        }),
        ..Default::default()
    };
    let reference = normalize(&fields, &config.allowed_hosts).unwrap();
    assert_eq!(remote_record_id(&reference).unwrap(), None);

    let id = generate_compendium_id();
    let staged = acquirer
        .acquire(
            AcquireSource::LocalUpload {
                incoming_path: upload_path,
                original_filename: "metatainer.zip".to_string(),
            },
            &id,
        )
        .await
        .unwrap();
    checksums.push(staged.checksum);

    assert_eq!(checksums.len(), 4);
    assert!(checksums.windows(2).all(|pair| pair[0] == pair[1]));
}

/// A filename absent from the record listing fails at download with the
/// constructed remote URL in the message, and never a local path.
#[tokio::test]
async fn missing_filename_reports_remote_url_only() {
    let server = MockServer::start().await;
    mount_record(&server, "69114", "metatainer.zip").await;

    Mock::given(method("GET"))
        .and(path("/record/69114/files/not_existing_file.xyz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();
    let acquirer = acquirer(staging.path(), &server.uri());

    let resolved = client
        .resolve("69114", Some("not_existing_file.xyz"))
        .await
        .unwrap();
    let expected_url = format!("{}/record/69114/files/not_existing_file.xyz", server.uri());
    assert_eq!(resolved.download_url, expected_url);

    let id = generate_compendium_id();
    let err = acquirer
        .acquire(
            AcquireSource::Remote {
                download_url: resolved.download_url,
                filename: resolved.filename,
            },
            &id,
        )
        .await
        .unwrap_err();

    let message = err.to_string();
    assert_eq!(message, format!("download failed: {expected_url}"));
    assert!(!message.contains(&staging.path().display().to_string()));

    // No partial content survives the failure.
    let staged_dir = staging.path().join("compendium").join(&id);
    assert!(!tokio::fs::try_exists(&staged_dir).await.unwrap());
}

#[tokio::test]
async fn explicit_filename_selects_among_multiple_files() {
    let server = MockServer::start().await;

    let record_body = serde_json::json!({
        "id": 42,
        "files": [
            { "key": "data.csv", "links": { "self": format!("{}/files/data.csv", server.uri()) } },
            { "key": "code.zip", "links": { "self": format!("{}/files/code.zip", server.uri()) } }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/api/records/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_body))
        .mount(&server)
        .await;

    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();

    let resolved = client.resolve("42", Some("code.zip")).await.unwrap();
    assert_eq!(resolved.filename, "code.zip");
    assert!(resolved.download_url.ends_with("/files/code.zip"));

    // Without a filename, a multi-file record is ambiguous.
    let err = client.resolve("42", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::AmbiguousFile));
}

#[tokio::test]
async fn upstream_record_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/records/404404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();
    let err = client.resolve("404404", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::RecordNotFound(ref id) if id == "404404"));
}

#[tokio::test]
async fn upstream_server_error_is_surfaced_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/records/500500"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();
    let err = client.resolve("500500", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::Upstream(_)));
}

/// Concurrent intakes stay independent: distinct ids, distinct staging
/// directories, one failure leaves the other untouched.
#[tokio::test]
async fn concurrent_intakes_are_independent() {
    let server = MockServer::start().await;
    mount_record(&server, "69114", "metatainer.zip").await;

    Mock::given(method("GET"))
        .and(path("/record/69114/files/broken.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let client = ZenodoClient::new(&zenodo_config(&server.uri())).unwrap();
    let acquirer = acquirer(staging.path(), &server.uri());

    let good = client.resolve("69114", None).await.unwrap();
    let bad = client.resolve("69114", Some("broken.zip")).await.unwrap();

    let good_id = generate_compendium_id();
    let bad_id = generate_compendium_id();
    assert_ne!(good_id, bad_id);

    let (good_result, bad_result) = tokio::join!(
        acquirer.acquire(
            AcquireSource::Remote {
                download_url: good.download_url,
                filename: good.filename,
            },
            &good_id,
        ),
        acquirer.acquire(
            AcquireSource::Remote {
                download_url: bad.download_url,
                filename: bad.filename,
            },
            &bad_id,
        )
    );

    let staged = good_result.unwrap();
    assert!(tokio::fs::try_exists(&staged.file_path).await.unwrap());
    assert!(bad_result.is_err());
}
