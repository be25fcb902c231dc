// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Two-stage login: Google sign-in, then the shared access password.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::{Diagnostics, SessionView};
use crate::error::Result;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/auth/google", post(google_sign_in))
        .route("/auth/secret", post(submit_secret))
        .route("/auth/logout", post(logout))
        .route(
            "/api/diagnostics",
            get(get_diagnostics).delete(dismiss_diagnostics),
        )
}

/// Google Identity Services credential (an ID token) from the browser.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub credential: String,
}

#[derive(Deserialize)]
pub struct SecretRequest {
    pub secret: String,
}

/// Current gate state, user and login error.
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.hub.lock().await.session())
}

async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignInRequest>,
) -> Result<Json<SessionView>> {
    let mut hub = state.hub.lock().await;
    let gate_state = hub.sign_in(&body.credential).await?;
    tracing::info!(state = ?gate_state, "Google sign-in accepted");
    Ok(Json(hub.session()))
}

async fn submit_secret(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SecretRequest>,
) -> Result<Json<SessionView>> {
    let mut hub = state.hub.lock().await;
    hub.submit_secret(&body.secret).await?;
    Ok(Json(hub.session()))
}

/// Log out from any state. The session is cleared even if the identity
/// provider fails to sign out; that failure shows up in diagnostics.
async fn logout(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>> {
    let mut hub = state.hub.lock().await;
    hub.logout().await?;
    Ok(Json(hub.session()))
}

// ─── Diagnostics ─────────────────────────────────────────────

/// Last recorded error, including login failures before admission.
async fn get_diagnostics(State(state): State<Arc<AppState>>) -> Json<Diagnostics> {
    Json(state.hub.lock().await.diagnostics().clone())
}

async fn dismiss_diagnostics(State(state): State<Arc<AppState>>) -> StatusCode {
    state.hub.lock().await.dismiss_diagnostics();
    StatusCode::NO_CONTENT
}
