//! Helpers for sanitizing data before it enters logs and tracing spans.
//!
//! NAS requests carry the account password on login and the session id on
//! every later call, both as query parameters. These helpers keep them out of
//! log output.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Query parameters whose values are never logged.
const SECRET_PARAMS: &[&str] = &["passwd", "_sid", "sid", "password"];

/// Returns only the last segment of a NAS path (no directory).
///
/// Safe for span fields: reveals the report name without the share layout.
pub fn redact_path(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Masks the values of credential-bearing query parameters in a URL.
///
/// - `https://nas/webapi/auth.cgi?account=bot&passwd=s3cret` →
///   `https://nas/webapi/auth.cgi?account=bot&passwd=****`
pub fn redact_query_secrets(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SECRET_PARAMS.contains(&key) => format!("{}=****", key),
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, redacted.join("&"))
}

/// Returns a short deterministic hash of a path for correlation without
/// exposing the actual path.
pub fn hash_path(path: &str) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
