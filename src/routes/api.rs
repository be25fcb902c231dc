// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for admitted sessions.

use crate::editor::{AssignmentEditor, SubmitOutcome};
use crate::error::Result;
use crate::models::{AssignmentFields, AssignmentView};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require an admitted session).
/// The admission middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/assignments", get(list_assignments))
        .route("/api/assignments/{id}", delete(delete_assignment))
        .route("/api/assignments/{id}/star", post(toggle_star))
        .route("/api/assignments/{id}/complete", post(toggle_completed))
        .route("/api/editor", get(get_editor))
        .route("/api/editor/new", post(open_create))
        .route("/api/editor/edit/{id}", post(open_edit))
        .route("/api/editor/form", put(update_form))
        .route("/api/editor/submit", post(submit))
        .route("/api/editor/close", post(close_editor))
}

// ─── Assignment List ─────────────────────────────────────────

/// The synchronized list, starred first, then by deadline.
async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<AssignmentView>> {
    Json(state.hub.lock().await.assignments())
}

async fn toggle_star(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.hub.lock().await.toggle_star(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_completed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.hub.lock().await.toggle_completed(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.hub.lock().await.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Editor ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    pub editor: AssignmentEditor,
}

async fn get_editor(State(state): State<Arc<AppState>>) -> Json<AssignmentEditor> {
    Json(state.hub.lock().await.editor().clone())
}

async fn open_create(State(state): State<Arc<AppState>>) -> Result<Json<AssignmentEditor>> {
    let mut hub = state.hub.lock().await;
    hub.open_create()?;
    Ok(Json(hub.editor().clone()))
}

async fn open_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AssignmentEditor>> {
    let mut hub = state.hub.lock().await;
    hub.open_edit(&id)?;
    Ok(Json(hub.editor().clone()))
}

async fn update_form(
    State(state): State<Arc<AppState>>,
    Json(form): Json<AssignmentFields>,
) -> Result<Json<AssignmentEditor>> {
    let mut hub = state.hub.lock().await;
    hub.update_form(form)?;
    Ok(Json(hub.editor().clone()))
}

/// Save the form. A blank title is not an error: nothing is sent and the
/// form stays open.
async fn submit(State(state): State<Arc<AppState>>) -> Result<Json<SubmitResponse>> {
    let mut hub = state.hub.lock().await;
    let outcome = hub.submit().await?;
    Ok(Json(SubmitResponse {
        outcome,
        editor: hub.editor().clone(),
    }))
}

async fn close_editor(State(state): State<Arc<AppState>>) -> Json<AssignmentEditor> {
    let mut hub = state.hub.lock().await;
    hub.close_editor();
    Json(hub.editor().clone())
}
