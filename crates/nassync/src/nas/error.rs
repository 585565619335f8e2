use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NasError {
    #[error("Failed to reach the NAS: {0}")]
    Connection(String),

    #[error("NAS request timed out: {0}")]
    Timeout(String),

    #[error("NAS login rejected ({}): {response}", code_label(.code))]
    AuthenticationFailed { code: Option<i64>, response: String },

    #[error("{api} {method} failed ({}): {response}", code_label(.code))]
    Api {
        api: &'static str,
        method: &'static str,
        code: Option<i64>,
        response: String,
    },

    #[error("NAS path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid NAS response: {0}")]
    InvalidResponse(String),

    #[error("NAS answered HTTP {status}")]
    Http { status: u16 },

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn code_label(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!("Synology error code {}", code),
        None => "no error code".to_string(),
    }
}

impl From<reqwest::Error> for NasError {
    fn from(e: reqwest::Error) -> Self {
        // Login URLs carry the password as a query parameter.
        let e = e.without_url();
        if e.is_timeout() {
            NasError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            NasError::Http {
                status: status.as_u16(),
            }
        } else {
            NasError::Connection(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, NasError>;
