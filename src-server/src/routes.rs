use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use nassync::{SyncOptions, SyncStatus};

use crate::auth::require_api_key;
use crate::state::AppState;

/// Failed records listed by `/sync/stats`, longest-stuck first.
const FAILURE_LISTING_LIMIT: u64 = 20;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync", get(trigger_sync).post(trigger_sync))
        .route("/sync/stats", get(sync_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

/// `{success: false, message, error_code}` with `status`.
pub fn error_response(status: StatusCode, error_code: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "success": false,
        "message": message.into(),
        "error_code": error_code,
    });
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    test_batch_size: Option<String>,
}

/// Accepts a positive integer; anything else is rejected.
pub fn parse_batch_size(raw: Option<&str>) -> Result<Option<usize>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n)
            .map(Some)
            .map_err(|_| format!("test_batch_size {} is too large", n)),
        Ok(n) => Err(format!("test_batch_size must be a positive integer, got {}", n)),
        Err(_) => Err(format!(
            "test_batch_size must be a positive integer, got '{}'",
            raw
        )),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn trigger_sync(State(state): State<AppState>, Query(query): Query<SyncQuery>) -> Response {
    let batch_size = match parse_batch_size(query.test_batch_size.as_deref()) {
        Ok(batch_size) => batch_size,
        Err(message) => {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_BATCH_SIZE", message)
        }
    };

    info!(?batch_size, "Sync triggered over HTTP");
    // Detached so a client hanging up does not abandon the NAS session.
    match state
        .orchestrator
        .run_detached(SyncOptions { batch_size })
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "Sync run failed");
            let status = if e.is_upstream() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.error_code(), e.to_string())
        }
    }
}

async fn sync_stats(State(state): State<AppState>) -> Response {
    let ledger = state.orchestrator.ledger();
    let result = ledger.stats().and_then(|stats| {
        let failures = ledger.list_by_status(SyncStatus::Failed, FAILURE_LISTING_LIMIT)?;
        Ok((stats, failures))
    });

    match result {
        Ok((stats, failures)) => {
            let failures: Vec<serde_json::Value> = failures
                .iter()
                .map(|record| {
                    json!({
                        "record_id": record.id,
                        "file_path": record.file_path,
                        "error_message": record.error_message,
                        "attempts": record.attempts,
                        "updated_at": record.updated_at,
                    })
                })
                .collect();
            Json(json!({
                "success": true,
                "phase": state.orchestrator.current_phase(),
                "ledger": stats,
                "failures": failures,
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to read ledger stats");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "LEDGER_UNAVAILABLE",
                e.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nassync::db::Database;
    use nassync::{load_config_from_str, PathMetadataExtractor, SyncLedger, SyncOrchestrator};
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    const KEY: &str = "test-key";

    /// Serves the router on an ephemeral port. The NAS points at a closed
    /// port, so any run fails at login.
    async fn spawn_server() -> (String, Arc<SyncOrchestrator>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let yaml = format!(
            r#"
nas:
  host: 127.0.0.1
  port: 1
  scheme: http
  username: sync-bot
  password: s3cret
  basePath: /ESG
  acceptInvalidCerts: false
  requestTimeoutSecs: 2
upload:
  jsonEndpoint: http://127.0.0.1:1/api/upload
  acceptInvalidCerts: false
storage:
  downloadDir: "{}"
"#,
            temp_dir.path().display()
        );
        let config = load_config_from_str(&yaml).unwrap();
        let ledger = SyncLedger::new(Database::open_in_memory().unwrap());
        let orchestrator = Arc::new(SyncOrchestrator::new(&config, ledger).unwrap());
        let state = AppState::new(Arc::clone(&orchestrator), vec![KEY.to_string()]);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        (format!("http://{addr}"), orchestrator, temp_dir)
    }

    async fn body(response: reqwest::Response) -> Value {
        response.json().await.unwrap()
    }

    #[test]
    fn test_parse_batch_size() {
        assert_eq!(parse_batch_size(None), Ok(None));
        assert_eq!(parse_batch_size(Some("3")), Ok(Some(3)));
        assert_eq!(parse_batch_size(Some(" 10 ")), Ok(Some(10)));
        assert!(parse_batch_size(Some("0")).is_err());
        assert!(parse_batch_size(Some("-2")).is_err());
        assert!(parse_batch_size(Some("three")).is_err());
        assert!(parse_batch_size(Some("")).is_err());
        assert!(parse_batch_size(Some("1.5")).is_err());
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let response = reqwest::get(format!("{url}/health")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(body(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn sync_without_key_is_rejected() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let response = reqwest::get(format!("{url}/sync")).await.unwrap();
        assert_eq!(response.status(), 401);
        let body = body(response).await;
        assert_eq!(body["error_code"], "MISSING_API_KEY");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn sync_with_wrong_key_is_rejected() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{url}/sync"))
            .header("X-API-Key", "nope")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(body(response).await["error_code"], "INVALID_API_KEY");
    }

    #[tokio::test]
    async fn invalid_batch_size_is_rejected() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let client = reqwest::Client::new();
        for value in ["0", "-1", "abc"] {
            let response = client
                .get(format!("{url}/sync?test_batch_size={value}"))
                .header("X-API-Key", KEY)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "value {value}");
            assert_eq!(body(response).await["error_code"], "INVALID_BATCH_SIZE");
        }
    }

    #[tokio::test]
    async fn unreachable_nas_is_a_bad_gateway() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{url}/sync?test_batch_size=2"))
            .header("X-API-Key", KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
        let body = body(response).await;
        assert_eq!(body["error_code"], "NAS_AUTH_FAILED");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn stats_report_ledger_counts() {
        let (url, _orchestrator, _dir) = spawn_server().await;
        let response = reqwest::Client::new()
            .get(format!("{url}/sync/stats"))
            .header("X-API-Key", KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = body(response).await;
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["ledger"]["total"], 0);
        assert_eq!(body["failures"], json!([]));
    }

    #[tokio::test]
    async fn stats_list_failed_records() {
        let (url, orchestrator, _dir) = spawn_server().await;
        let ledger = orchestrator.ledger();
        let extractor = PathMetadataExtractor::with_max_year(2027);
        let failed = ledger
            .insert(&extractor.extract("/ESG/A_Tech_2024_X/GHG_Acme_2023.pdf"))
            .unwrap();
        ledger.mark_failed(failed, "download failed: HTTP 404").unwrap();
        ledger
            .insert(&extractor.extract("/ESG/A_Tech_2024_X/WATER_Globex_2024.pdf"))
            .unwrap();

        let response = reqwest::Client::new()
            .get(format!("{url}/sync/stats"))
            .header("X-API-Key", KEY)
            .send()
            .await
            .unwrap();
        let body = body(response).await;

        assert_eq!(body["ledger"]["total"], 2);
        assert_eq!(body["ledger"]["failed"], 1);
        let failures = body["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["record_id"], failed.get());
        assert_eq!(failures[0]["file_path"], "/ESG/A_Tech_2024_X/GHG_Acme_2023.pdf");
        assert_eq!(failures[0]["error_message"], "download failed: HTTP 404");
        assert_eq!(failures[0]["attempts"], 1);
    }
}
