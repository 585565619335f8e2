//! Delivery of downloaded files to the ingestion API.

mod client;
pub mod error;

pub use client::{is_truthy, UploadClient, UploadMethod, UploadOutcome, UploadRequest};
pub use error::UploadError;
