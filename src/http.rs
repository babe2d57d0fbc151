//! HTTP surface over any [`FarmGateway`].

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::backup::restore_records;
use crate::error::VALIDATION_MISSING_FIELD;
use crate::gateway::{FarmGateway, FarmPage, PageRequest};
use crate::model::Farm;
use crate::normalize::normalize_record;
use crate::state::AppState;
use crate::{AppError, AppResult};

pub const VALIDATION_BODY: &str = "VALIDATION/BODY";
pub const VALIDATION_QUERY: &str = "VALIDATION/QUERY";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(target: "citrus_farms", event = "http_error", code = %self.code(), error = %self);
        } else {
            warn!(target: "citrus_farms", event = "http_rejected", code = %self.code(), status = status.as_u16());
        }
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveQuery {
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/farms", get(list_farms).post(save_farm))
        .route("/farms/restore", post(restore_farms))
        .route("/farms/:id", delete(delete_farm))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn body(payload: Result<Json<Value>, JsonRejection>) -> AppResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::new(VALIDATION_BODY, rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| AppError::new(VALIDATION_QUERY, rejection.body_text()))
}

async fn list_farms(
    State(state): State<AppState>,
    query_string: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<FarmPage>> {
    let query = query_params(query_string)?;
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(state.page_size),
    )?;
    let page = state.gateway.load_all(Some(page)).await?;
    Ok(Json(page))
}

fn has_text(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

/// Rejects submissions lacking an identifier or a name, in either record generation.
pub fn require_identity(value: &Value) -> AppResult<()> {
    if !value.is_object() {
        return Err(AppError::new(VALIDATION_BODY, "Farm body must be a JSON object"));
    }
    if !has_text(value.get("id")) {
        return Err(AppError::missing_field("id"));
    }
    let name = value
        .get("name")
        .filter(|name| !name.is_null())
        .or_else(|| value.get("basicInfo").and_then(|basic| basic.get("name")));
    if !has_text(name) {
        return Err(AppError::new(VALIDATION_MISSING_FIELD, "`name` is required")
            .with_context("field", "name"));
    }
    Ok(())
}

async fn save_farm(
    State(state): State<AppState>,
    query_string: Result<Query<SaveQuery>, QueryRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Farm>)> {
    let query = query_params(query_string)?;
    let value = body(payload)?;
    require_identity(&value)?;
    let farm = normalize_record(&value);
    let saved = if query.strict {
        state.gateway.create(farm).await?
    } else {
        state.gateway.save(farm).await?
    };
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn delete_farm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gateway.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_farms(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<Confirmation>> {
    let value = body(payload)?;
    let farms = restore_records(&value)?;
    let count = farms.len();
    state.gateway.replace_all(farms).await?;
    Ok(Json(Confirmation {
        message: format!("Restored {count} farms"),
    }))
}

/// Serves until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: AppState, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(target: "citrus_farms", event = "http_listening", addr = %addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!(target: "citrus_farms", event = "http_stopped", addr = %addr);
    Ok(())
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> AppResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::from(e).with_context("addr", addr.to_string()))?;
    serve_with_shutdown(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "citrus_farms", event = "signal_error", error = %e);
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accepts_either_generation() {
        assert!(require_identity(&json!({"id": "a", "name": "Sun"})).is_ok());
        assert!(require_identity(&json!({"id": 7, "basicInfo": {"name": "Old"}})).is_ok());
    }

    #[test]
    fn identity_reports_missing_field() {
        let err = require_identity(&json!({"name": "Sun"})).expect_err("no id");
        assert_eq!(err.code(), VALIDATION_MISSING_FIELD);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = require_identity(&json!({"id": "a", "name": " "})).expect_err("blank name");
        assert_eq!(err.context().get("field").map(String::as_str), Some("name"));

        let err = require_identity(&json!([1, 2])).expect_err("array body");
        assert_eq!(err.code(), VALIDATION_BODY);
    }
}
