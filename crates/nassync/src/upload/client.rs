use std::time::Duration;

use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::UploadSettings;
use crate::upload::error::{Result, UploadError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which encoding delivered a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadMethod {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "form-data")]
    FormData,
}

impl UploadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMethod::Json => "json",
            UploadMethod::FormData => "form-data",
        }
    }
}

impl std::fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file plus the metadata extracted from its path.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub file_name: &'a str,
    pub content: &'a [u8],
    pub industry: &'a str,
    pub indicator: &'a str,
    pub company: &'a str,
    pub year: &'a str,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub method: UploadMethod,
    /// Parsed response body, or `{"raw": body}` when it was not JSON.
    pub response: Value,
}

#[derive(Serialize)]
struct JsonUploadBody<'a> {
    industry: &'a str,
    indicator: &'a str,
    company: &'a str,
    year: &'a str,
    file_name: &'a str,
    uploaded_file: String,
}

/// Pushes files to the ingestion API, JSON first and multipart second.
pub struct UploadClient {
    http: Client,
    json_endpoint: String,
    form_endpoint: String,
    json_timeout: Duration,
    form_timeout: Duration,
}

impl UploadClient {
    pub fn new(settings: &UploadSettings) -> Result<Self> {
        if settings.accept_invalid_certs {
            warn!("TLS certificate validation is disabled for the upload endpoints");
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;

        Ok(Self {
            http,
            json_endpoint: settings.json_endpoint.clone(),
            form_endpoint: settings.form_endpoint().to_string(),
            json_timeout: settings.json_timeout(),
            form_timeout: settings.form_timeout(),
        })
    }

    /// Delivers `request`, falling back to multipart when the JSON tier is
    /// not accepted.
    pub async fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadOutcome> {
        let json_err = match self.upload_json(request).await {
            Ok(response) => {
                info!(file_name = request.file_name, "Uploaded via json");
                return Ok(UploadOutcome {
                    method: UploadMethod::Json,
                    response,
                });
            }
            Err(e) => e,
        };

        warn!(
            file_name = request.file_name,
            error = %json_err,
            "JSON upload not accepted, falling back to form-data"
        );

        match self.upload_form(request).await {
            Ok(response) => {
                info!(file_name = request.file_name, "Uploaded via form-data");
                Ok(UploadOutcome {
                    method: UploadMethod::FormData,
                    response,
                })
            }
            Err(form_err) => Err(UploadError::AllTiersFailed {
                json: Box::new(json_err),
                form: Box::new(form_err),
            }),
        }
    }

    async fn upload_json(&self, request: &UploadRequest<'_>) -> Result<Value> {
        let body = JsonUploadBody {
            industry: request.industry,
            indicator: request.indicator,
            company: request.company,
            year: request.year,
            file_name: request.file_name,
            uploaded_file: base64::engine::general_purpose::STANDARD.encode(request.content),
        };

        let response = self
            .http
            .post(&self.json_endpoint)
            .json(&body)
            .timeout(self.json_timeout)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), "JSON tier answered");

        match serde_json::from_str::<Value>(&text) {
            Ok(value) if value.get("success").is_some_and(is_truthy) => Ok(value),
            _ => Err(UploadError::Rejected {
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    async fn upload_form(&self, request: &UploadRequest<'_>) -> Result<Value> {
        let mime = mime_guess::from_path(request.file_name).first_or_octet_stream();
        let file_part = Part::bytes(request.content.to_vec())
            .file_name(request.file_name.to_string())
            .mime_str(mime.essence_str())
            .map_err(|e| UploadError::InvalidPart(e.to_string()))?;

        let form = Form::new()
            .text("industry", request.industry.to_string())
            .text("indicator", request.indicator.to_string())
            .text("company", request.company.to_string())
            .text("year", request.year.to_string())
            .text("file_name", request.file_name.to_string())
            .part("uploaded_file", file_part);

        let response = self
            .http
            .post(&self.form_endpoint)
            .multipart(form)
            .timeout(self.form_timeout)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            return Err(UploadError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text })))
    }
}

/// Loose truthiness of a `success` field: `true`, non-zero numbers,
/// non-empty strings other than `"0"`/`"false"`, non-empty arrays and objects.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
