use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("rejected by endpoint (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid upload part: {0}")]
    InvalidPart(String),

    /// Both encodings were tried and neither was accepted.
    #[error("json: {json}; form-data: {form}")]
    AllTiersFailed {
        json: Box<UploadError>,
        form: Box<UploadError>,
    },
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UploadError::Timeout(e.to_string())
        } else {
            UploadError::Request(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
