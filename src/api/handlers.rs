use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::{CurrentUser, RequestId},
    models::{ProgressRow, UpsertSeenRequest},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub show_id: Option<u64>,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// `GET /episodes[?show_id=]`: detail rows for one series, aggregates otherwise
pub async fn get_episodes(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: CurrentUser,
    Query(query): Query<ProgressQuery>,
) -> AppResult<Json<Vec<ProgressRow>>> {
    let rows = state.store.get_progress(user.id(), query.show_id).await?;

    tracing::info!(
        request_id = %request_id,
        show_id = ?query.show_id,
        rows = rows.len(),
        "Progress read"
    );

    if query.show_id.is_none() {
        state.backfill.schedule_missing(user.id(), &rows).await;
    }

    Ok(Json(rows))
}

/// `POST /episodes`: merge-upsert one seen flag
pub async fn upsert_episode(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: CurrentUser,
    Json(request): Json<UpsertSeenRequest>,
) -> AppResult<Json<Value>> {
    let update = request.validate()?;
    state.store.upsert_seen(user.id(), &update).await?;

    tracing::info!(
        request_id = %request_id,
        show_id = update.show_id,
        episode = update.episode,
        seen = update.seen,
        "Episode progress saved"
    );

    if state.store.stored_total(user.id(), update.show_id).await?.is_none() {
        state.backfill.spawn(user.id(), update.show_id).await;
    }

    Ok(Json(json!({ "ok": true })))
}

/// `DELETE /episodes/:show_id`: clear a series' progress
pub async fn delete_series(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(show_id): Path<u64>,
) -> AppResult<Json<Value>> {
    state.store.delete_series(user.id(), show_id).await?;
    Ok(Json(json!({ "ok": true })))
}
