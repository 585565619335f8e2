//! Shared fixtures for the nassync integration tests.
//!
//! - `NasMock` wraps a wiremock server speaking the FileStation protocol
//! - `test_config` points a `Config` at the mock NAS and ingestion servers

#![allow(dead_code)]

use std::path::Path;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nassync::config::{load_config_from_str, Config};

pub const BASE_PATH: &str = "/ESG";
pub const SID: &str = "test-sid-0001";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

pub fn test_config(nas: &MockServer, upload: &MockServer, download_dir: &Path) -> Config {
    let address = nas.address();
    let yaml = format!(
        r#"
nas:
  host: "{host}"
  port: {port}
  scheme: http
  username: sync-bot
  password: s3cret
  basePath: {base}
  acceptInvalidCerts: false
  requestTimeoutSecs: 5
  downloadTimeoutSecs: 5
upload:
  jsonEndpoint: {upload}/api/upload
  formEndpoint: {upload}/api/upload-form
  jsonTimeoutSecs: 5
  formTimeoutSecs: 5
  acceptInvalidCerts: false
storage:
  downloadDir: "{dir}"
"#,
        host = address.ip(),
        port = address.port(),
        base = BASE_PATH,
        upload = upload.uri(),
        dir = download_dir.display(),
    );
    load_config_from_str(&yaml).expect("test config should be valid")
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

pub fn api_error(code: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": false, "error": { "code": code } }))
}

pub fn file_entry(file_path: &str) -> Value {
    let name = file_path.rsplit('/').next().unwrap_or_default();
    json!({
        "path": file_path,
        "name": name,
        "isdir": false,
        "additional": { "size": PDF_BYTES.len(), "time": { "mtime": 1700000000 } }
    })
}

pub fn dir_entry(dir_path: &str) -> Value {
    let name = dir_path.rsplit('/').next().unwrap_or_default();
    json!({ "path": dir_path, "name": name, "isdir": true })
}

/// Mock Synology NAS.
pub struct NasMock {
    pub server: MockServer,
}

impl NasMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub async fn mount_login(&self) {
        Mock::given(method("GET"))
            .and(path("/webapi/auth.cgi"))
            .and(query_param("method", "login"))
            .respond_with(ok(json!({ "sid": SID })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_login_rejected(&self, code: i64) {
        Mock::given(method("GET"))
            .and(path("/webapi/auth.cgi"))
            .and(query_param("method", "login"))
            .respond_with(api_error(code))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_logout(&self, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/webapi/auth.cgi"))
            .and(query_param("method", "logout"))
            .and(query_param("_sid", SID))
            .respond_with(ok(json!({})))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_base_exists(&self) {
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("method", "getinfo"))
            .and(query_param("path", BASE_PATH))
            .respond_with(ok(json!({ "files": [dir_entry(BASE_PATH)] })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_folders(&self, folders: &[&str]) {
        let entries: Vec<Value> = folders
            .iter()
            .map(|name| dir_entry(&format!("{}/{}", BASE_PATH, name)))
            .collect();
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("method", "list"))
            .and(query_param("folder_path", BASE_PATH))
            .and(query_param("filetype", "dir"))
            .respond_with(ok(
                json!({ "total": entries.len(), "offset": 0, "files": entries }),
            ))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_files(&self, folder: &str, file_names: &[&str]) {
        let folder_path = format!("{}/{}", BASE_PATH, folder);
        let entries: Vec<Value> = file_names
            .iter()
            .map(|name| file_entry(&format!("{}/{}", folder_path, name)))
            .collect();
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("method", "list"))
            .and(query_param("folder_path", folder_path.as_str()))
            .and(query_param("filetype", "file"))
            .respond_with(ok(
                json!({ "total": entries.len(), "offset": 0, "files": entries }),
            ))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_files_error(&self, folder: &str, code: i64) {
        let folder_path = format!("{}/{}", BASE_PATH, folder);
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("method", "list"))
            .and(query_param("folder_path", folder_path.as_str()))
            .and(query_param("filetype", "file"))
            .respond_with(api_error(code))
            .mount(&self.server)
            .await;
    }

    /// Serves `PDF_BYTES` for every download request.
    pub async fn mount_downloads(&self) {
        self.mount_download_response(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(PDF_BYTES),
        )
        .await;
    }

    pub async fn mount_download_response(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/webapi/entry.cgi"))
            .and(query_param("api", "SYNO.FileStation.Download"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Login, base path and one folder holding `file_names`.
    pub async fn mount_share(&self, folder: &str, file_names: &[&str]) {
        self.mount_login().await;
        self.mount_base_exists().await;
        self.mount_folders(&[folder]).await;
        self.mount_files(folder, file_names).await;
    }
}

/// Ingestion endpoint accepting the JSON tier.
pub async fn mount_json_upload(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_form_upload(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/upload-form"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Number of requests the server received on `endpoint`.
pub async fn request_count(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

/// Number of logout calls the NAS mock received.
pub async fn logout_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/webapi/auth.cgi")
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "method" && v == "logout"))
        .count()
}

/// Files currently in `dir`.
pub fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
