//! Administrative REST surface over the frontier. Auth lives in front of
//! this service; callers get JSON `{error}` bodies on failure and never a
//! stack trace.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use newsriver_common::{submit_priority, SourceCatalog, UrlOrigin};
use newsriver_frontier::{FrontierStore, ListFilter, SubmitUrl};

pub struct AppState {
    pub frontier: FrontierStore,
    pub catalog: Arc<dyn SourceCatalog>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/frontier", get(list_frontier))
        .route("/frontier/stats", get(frontier_stats))
        .route("/frontier/submit", post(submit))
        .route("/frontier/{id}", delete(delete_row))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
    source_id: Option<Uuid>,
    host: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_frontier(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let filter = ListFilter {
        status: params.status,
        source_id: params.source_id,
        host: params.host,
        limit: params.limit.unwrap_or(50),
        offset: params.offset.unwrap_or(0),
    };

    match state.frontier.list(&filter).await {
        Ok(rows) => Json(serde_json::json!({
            "count": rows.len(),
            "urls": rows,
        }))
        .into_response(),
        Err(e) => internal_error("frontier list", e),
    }
}

async fn frontier_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.frontier.stats().await {
        Ok(stats) => Json(serde_json::json!({"stats": stats})).into_response(),
        Err(e) => internal_error("frontier stats", e),
    }
}

/// One URL or a batch; `url` and `urls` are interchangeable.
#[derive(Deserialize)]
struct SubmitRequest {
    url: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
    source_id: Uuid,
    priority: Option<i32>,
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse {
    let mut urls = body.urls;
    if let Some(url) = body.url {
        urls.insert(0, url);
    }
    if urls.is_empty() {
        return bad_request("no URLs given");
    }

    // Validate the whole batch before touching the store.
    for url in &urls {
        if url.len() > 2048 {
            let head: String = url.chars().take(64).collect();
            return bad_request(&format!("URL too long: {head}…"));
        }
        if let Err(e) = newsriver_common::normalize(url) {
            return bad_request(&e.to_string());
        }
    }

    let source = match state.catalog.get(body.source_id).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "unknown source_id"})),
            )
                .into_response();
        }
        Err(e) => return internal_error("source lookup", e),
    };

    let priority = body
        .priority
        .map(|p| p.clamp(1, 10))
        .unwrap_or_else(|| submit_priority(source.priority, UrlOrigin::Manual));

    let mut submitted = 0usize;
    for url in &urls {
        let request = SubmitUrl {
            url: url.clone(),
            source_id: source.source_id,
            origin: UrlOrigin::Manual,
            parent_url: None,
            depth: 0,
            priority,
            next_fetch_at: Utc::now(),
        };
        match state.frontier.submit(request).await {
            Ok(Some(_)) => submitted += 1,
            Ok(None) => {}
            Err(e) => return internal_error("frontier submit", e),
        }
    }

    info!(source = %source.name, urls = urls.len(), submitted, "Manual submission");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "received": urls.len(),
            "submitted": submitted,
        })),
    )
        .into_response()
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.frontier.delete(id).await {
        Ok(true) => Json(serde_json::json!({"deleted": id})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no such frontier row"})),
        )
            .into_response(),
        Err(e) => internal_error("frontier delete", e),
    }
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn internal_error(what: &str, e: impl std::fmt::Display) -> axum::response::Response {
    warn!(error = %e, "{what} failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal error"})),
    )
        .into_response()
}
