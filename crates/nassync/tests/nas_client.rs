mod common;

use secrecy::SecretString;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use nassync::nas::{NasClient, NasError};

async fn client_for(nas: &NasMock) -> (NasClient, TempDir) {
    let upload = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&nas.server, &upload, temp_dir.path());
    let client = NasClient::new(&config.nas, SecretString::from("s3cret")).unwrap();
    (client, temp_dir)
}

#[tokio::test]
async fn login_sends_credentials_and_session_name() {
    let nas = NasMock::start().await;
    Mock::given(method("GET"))
        .and(path("/webapi/auth.cgi"))
        .and(query_param("api", "SYNO.API.Auth"))
        .and(query_param("version", "3"))
        .and(query_param("method", "login"))
        .and(query_param("account", "sync-bot"))
        .and(query_param("passwd", "s3cret"))
        .and(query_param("session", "FileStation"))
        .and(query_param("format", "sid"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"sid": SID}})),
        )
        .expect(1)
        .mount(&nas.server)
        .await;

    let (client, _dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    assert!(session.is_active());
}

#[tokio::test]
async fn rejected_login_carries_code_and_body() {
    let nas = NasMock::start().await;
    nas.mount_login_rejected(400).await;

    let (client, _dir) = client_for(&nas).await;
    match client.login().await {
        Err(NasError::AuthenticationFailed { code, response }) => {
            assert_eq!(code, Some(400));
            assert!(response.contains("\"code\":400"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("login should fail"),
    }
}

#[tokio::test]
async fn login_http_error_is_reported() {
    let nas = NasMock::start().await;
    Mock::given(method("GET"))
        .and(path("/webapi/auth.cgi"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&nas.server)
        .await;

    let (client, _dir) = client_for(&nas).await;
    assert!(matches!(
        client.login().await,
        Err(NasError::Http { status: 503 })
    ));
}

#[tokio::test]
async fn transport_errors_do_not_leak_the_password() {
    let nas = NasMock::start().await;
    let (client, _dir) = client_for(&nas).await;
    // Nothing listens on the NAS port once the mock server is gone.
    drop(nas);

    let err = match client.login().await {
        Err(e) => e,
        Ok(_) => panic!("login should fail"),
    };
    assert!(!err.to_string().contains("s3cret"));
}

#[tokio::test]
async fn list_folders_returns_only_directories() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    nas.mount_base_exists().await;
    Mock::given(method("GET"))
        .and(path("/webapi/entry.cgi"))
        .and(query_param("method", "list"))
        .and(query_param("folder_path", BASE_PATH))
        .and(query_param("filetype", "dir"))
        .and(query_param("_sid", SID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "total": 3,
                "offset": 0,
                "files": [
                    dir_entry("/ESG/A_Tech_2024_X"),
                    dir_entry("/ESG/Finance_2023_Q4"),
                    file_entry("/ESG/stray.pdf")
                ]
            }
        })))
        .mount(&nas.server)
        .await;

    let (client, _dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    let folders = session.list_folders(BASE_PATH).await.unwrap();

    let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["A_Tech_2024_X", "Finance_2023_Q4"]);
    assert_eq!(folders[0].path, "/ESG/A_Tech_2024_X");
}

#[tokio::test]
async fn list_folders_on_missing_base_path() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    Mock::given(method("GET"))
        .and(path("/webapi/entry.cgi"))
        .and(query_param("method", "getinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "files": [{ "path": BASE_PATH, "name": "ESG", "code": 408 }] }
        })))
        .mount(&nas.server)
        .await;

    let (client, _dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    match session.list_folders(BASE_PATH).await {
        Err(NasError::PathNotFound(p)) => assert_eq!(p, BASE_PATH),
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn list_files_follows_pages() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    let folder = "/ESG/A_Tech_2024_X";
    for (offset, entries) in [
        ("0", vec![file_entry("/ESG/A_Tech_2024_X/a_B_2023.pdf"), file_entry("/ESG/A_Tech_2024_X/c_D_2023.pdf")]),
        ("2", vec![file_entry("/ESG/A_Tech_2024_X/e_F_2023.pdf")]),
    ] {
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("method", "list"))
            .and(query_param("folder_path", folder))
            .and(query_param("filetype", "file"))
            .and(query_param("offset", offset))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "total": 3, "offset": offset.parse::<u64>().unwrap(), "files": entries }
            })))
            .expect(1)
            .mount(&nas.server)
            .await;
    }

    let upload = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&nas.server, &upload, temp_dir.path());
    config.nas.page_size = 2;
    let client = NasClient::new(&config.nas, SecretString::from("s3cret")).unwrap();

    let session = client.login().await.unwrap();
    let files = session.list_files(folder).await.unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(files[2].name, "e_F_2023.pdf");
    assert_eq!(files[0].size, PDF_BYTES.len() as u64);
    assert!(files[0].modified_at.is_some());
}

#[tokio::test]
async fn list_files_api_error() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    nas.mount_files_error("Broken_2024_X", 407).await;

    let (client, _dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    match session.list_files("/ESG/Broken_2024_X").await {
        Err(NasError::Api { api, code, .. }) => {
            assert_eq!(api, "SYNO.FileStation.List");
            assert_eq!(code, Some(407));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn download_streams_file_to_disk() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    Mock::given(method("GET"))
        .and(path("/webapi/entry.cgi"))
        .and(query_param("api", "SYNO.FileStation.Download"))
        .and(query_param("method", "download"))
        .and(query_param("mode", "download"))
        .and(query_param("path", "/ESG/A_Tech_2024_X/GHG_Acme_2023.pdf"))
        .and(query_param("_sid", SID))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(PDF_BYTES),
        )
        .mount(&nas.server)
        .await;

    let (client, dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    let dest = dir.path().join("out.pdf");
    let written = session
        .download_to("/ESG/A_Tech_2024_X/GHG_Acme_2023.pdf", &dest)
        .await
        .unwrap();

    assert_eq!(written, PDF_BYTES.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn download_json_envelope_is_an_error_and_leaves_no_file() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    nas.mount_download_response(api_error(408)).await;

    let (client, dir) = client_for(&nas).await;
    let session = client.login().await.unwrap();
    let dest = dir.path().join("out.pdf");
    std::fs::write(&dest, b"").unwrap();

    match session.download_to("/ESG/missing.pdf", &dest).await {
        Err(NasError::Api { api, code, .. }) => {
            assert_eq!(api, "SYNO.FileStation.Download");
            assert_eq!(code, Some(408));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn logout_runs_once() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    nas.mount_logout(1).await;

    let (client, _dir) = client_for(&nas).await;
    let mut session = client.login().await.unwrap();
    session.logout().await;
    assert!(!session.is_active());
    session.logout().await;
}

#[tokio::test]
async fn logout_failure_is_swallowed() {
    let nas = NasMock::start().await;
    nas.mount_login().await;
    Mock::given(method("GET"))
        .and(path("/webapi/auth.cgi"))
        .and(query_param("method", "logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&nas.server)
        .await;

    let (client, _dir) = client_for(&nas).await;
    let mut session = client.login().await.unwrap();
    session.logout().await;
    assert!(!session.is_active());
}
