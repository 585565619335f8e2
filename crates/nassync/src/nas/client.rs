use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::NasSettings;
use crate::nas::error::{NasError, Result};
use crate::nas::types::{ApiEnvelope, FileEntry, Folder, ListData, LoginData, RawEntry};
use crate::sanitize::redact_query_secrets;

const AUTH_API: &str = "SYNO.API.Auth";
const LIST_API: &str = "SYNO.FileStation.List";
const DOWNLOAD_API: &str = "SYNO.FileStation.Download";

/// Connect timeout for every NAS call.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Unauthenticated handle on a Synology DSM web API.
///
/// All FileStation calls need a session; obtain one with [`NasClient::login`].
pub struct NasClient {
    http: Client,
    base_url: String,
    username: String,
    password: SecretString,
    page_size: u32,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl NasClient {
    pub fn new(settings: &NasSettings, password: SecretString) -> Result<Self> {
        if settings.accept_invalid_certs {
            warn!(
                host = %settings.host,
                "TLS certificate validation is disabled for the NAS connection"
            );
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| NasError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.api_base_url(),
            username: settings.username.clone(),
            password,
            page_size: settings.page_size,
            request_timeout: settings.request_timeout(),
            download_timeout: settings.download_timeout(),
        })
    }

    /// Opens a FileStation session.
    ///
    /// Not retried: a rejected login is reported with the Synology error code
    /// and the raw response body.
    pub async fn login(&self) -> Result<NasSession<'_>> {
        let url = format!("{}/auth.cgi", self.base_url);
        let request = self
            .http
            .get(&url)
            .query(&[
                ("api", AUTH_API),
                ("version", "3"),
                ("method", "login"),
                ("account", self.username.as_str()),
                ("passwd", self.password.expose_secret()),
                ("session", "FileStation"),
                ("format", "sid"),
            ])
            .timeout(self.request_timeout);

        let body = self.send_for_text(request).await?;
        let envelope: ApiEnvelope<LoginData> = parse_envelope(&body)?;

        if !envelope.success {
            return Err(NasError::AuthenticationFailed {
                code: envelope.error_code(),
                response: body,
            });
        }

        let sid = envelope
            .data
            .map(|d| d.sid)
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| NasError::AuthenticationFailed {
                code: None,
                response: body.clone(),
            })?;

        info!(account = %self.username, "NAS login succeeded");

        Ok(NasSession {
            client: self,
            sid: SecretString::from(sid),
            active: true,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        debug!(url = %redact_query_secrets(request.url().as_str()), "NAS request");

        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NasError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send_for_text(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }
}

/// An authenticated FileStation session.
///
/// The session id is sent as `_sid` on every call. Dropping the session
/// without calling [`NasSession::logout`] leaves it to expire on the NAS.
pub struct NasSession<'a> {
    client: &'a NasClient,
    sid: SecretString,
    active: bool,
}

impl NasSession<'_> {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Lists the sub-folders of `base_path`.
    ///
    /// Fails with [`NasError::PathNotFound`] if `base_path` does not exist.
    pub async fn list_folders(&self, base_path: &str) -> Result<Vec<Folder>> {
        self.ensure_exists(base_path).await?;

        let entries = self.list_entries(base_path, "dir").await?;
        let folders: Vec<Folder> = entries
            .into_iter()
            .filter(|e| e.isdir)
            .map(RawEntry::into_folder)
            .collect();

        debug!(base_path, count = folders.len(), "Listed folders");
        Ok(folders)
    }

    /// Lists the files directly inside `folder_path` with size and mtime.
    pub async fn list_files(&self, folder_path: &str) -> Result<Vec<FileEntry>> {
        let entries = self.list_entries(folder_path, "file").await?;
        let files: Vec<FileEntry> = entries
            .into_iter()
            .filter(|e| !e.isdir)
            .map(RawEntry::into_file)
            .collect();

        debug!(folder_path, count = files.len(), "Listed files");
        Ok(files)
    }

    /// Streams `remote_path` into `dest`, returning the number of bytes
    /// written. A partially written `dest` is removed on failure.
    pub async fn download_to(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        match self.download_inner(remote_path, dest).await {
            Ok(bytes) => {
                debug!(remote_path, bytes, "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %dest.display(),
                            error = %remove_err,
                            "Failed to remove partial download"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Ends the session. Failures are logged and swallowed; calling this
    /// again is a no-op.
    pub async fn logout(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let url = format!("{}/auth.cgi", self.client.base_url);
        let request = self
            .client
            .http
            .get(&url)
            .query(&[
                ("api", AUTH_API),
                ("version", "1"),
                ("method", "logout"),
                ("session", "FileStation"),
                ("_sid", self.sid.expose_secret()),
            ])
            .timeout(self.client.request_timeout);

        match self.client.send_for_text(request).await {
            Ok(_) => info!("NAS logout complete"),
            Err(e) => warn!(error = %e, "NAS logout failed"),
        }
    }

    async fn ensure_exists(&self, path: &str) -> Result<()> {
        let request = self.entry_request(LIST_API, "getinfo", "2", &[("path", path)]);
        let body = self.client.send_for_text(request).await?;
        let envelope: ApiEnvelope<ListData> = parse_envelope(&body)?;

        if !envelope.success {
            return Err(NasError::PathNotFound(path.to_string()));
        }
        let first = envelope.data.and_then(|d| d.files.into_iter().next());
        match first {
            Some(entry) if entry.code.is_none() => Ok(()),
            _ => Err(NasError::PathNotFound(path.to_string())),
        }
    }

    /// Collects every page of a `list` call.
    async fn list_entries(&self, folder_path: &str, filetype: &str) -> Result<Vec<RawEntry>> {
        let limit = self.client.page_size.to_string();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let offset_param = offset.to_string();
            let page: ListData = self
                .entry_call(
                    LIST_API,
                    "list",
                    &[
                        ("folder_path", folder_path),
                        ("filetype", filetype),
                        ("additional", r#"["size","time"]"#),
                        ("offset", offset_param.as_str()),
                        ("limit", limit.as_str()),
                    ],
                )
                .await?;

            let received = page.files.len() as u64;
            entries.extend(page.files);
            offset += received;

            if received == 0 || offset >= page.total {
                break;
            }
        }

        Ok(entries)
    }

    async fn download_inner(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let request = self
            .entry_request(
                DOWNLOAD_API,
                "download",
                "2",
                &[("path", remote_path), ("mode", "download")],
            )
            .timeout(self.client.download_timeout);
        let response = self.client.send(request).await?;

        // The download endpoint answers errors with a JSON envelope instead
        // of the file body.
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let body = response.text().await?;
            let code = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.error_code());
            return Err(NasError::Api {
                api: DOWNLOAD_API,
                method: "download",
                code,
                response: body,
            });
        }

        let io_err = |source| NasError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        Ok(written)
    }

    fn entry_request(
        &self,
        api: &str,
        method: &str,
        version: &str,
        params: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/entry.cgi", self.client.base_url);
        self.client
            .http
            .get(&url)
            .query(&[("api", api), ("version", version), ("method", method)])
            .query(params)
            .query(&[("_sid", self.sid.expose_secret())])
            .timeout(self.client.request_timeout)
    }

    async fn entry_call<T: DeserializeOwned>(
        &self,
        api: &'static str,
        method: &'static str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let request = self.entry_request(api, method, "2", params);
        let body = self.client.send_for_text(request).await?;
        let envelope: ApiEnvelope<T> = parse_envelope(&body)?;

        if !envelope.success {
            return Err(NasError::Api {
                api,
                method,
                code: envelope.error_code(),
                response: body,
            });
        }
        envelope.data.ok_or_else(|| {
            NasError::InvalidResponse(format!("{} {} returned no data", api, method))
        })
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<ApiEnvelope<T>> {
    serde_json::from_str(body).map_err(|e| NasError::InvalidResponse(format!("{}: {}", e, body)))
}
