//! HTTP read API over the latest tracking slot.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::store::{LatestTracking, LinkStatus};

#[derive(Debug, Clone, Serialize)]
pub struct ApiMeta {
    pub version: String,
    pub api_env: String,
    pub build_date: DateTime<Utc>,
}

impl ApiMeta {
    pub fn new(api_env: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_env: api_env.into(),
            build_date: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<LatestTracking>,
    pub meta: Arc<ApiMeta>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api", get(metadata))
        .route("/api/tracking", get(tracking))
        .route("/api/status", get(status))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))?;
    info!(%addr, "Read API listening");

    axum::serve(listener, router(state))
        .await
        .context("serving read API")
}

async fn metadata(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "meta": state.meta.as_ref(),
        "data": ["/api/tracking", "/api/status"],
    }))
}

/// Latest payload, or 404 until the first frame has been processed.
async fn tracking(State(state): State<ApiState>) -> Response {
    match state.store.latest() {
        Some(snapshot) => Json(snapshot.payload.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No tracking data available" })),
        )
            .into_response(),
    }
}

async fn status(State(state): State<ApiState>) -> Json<LinkStatus> {
    Json(state.store.link_status(Utc::now()))
}
