// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admission guard for the assignment API.

use crate::error::AppError;
use crate::gate::GateState;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Middleware that lets a request through only when the session has passed
/// both gate stages and the signed-in user is known. An admitted session
/// without a live subscription retries it here.
pub async fn require_admitted(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let admitted = {
        let mut hub = state.hub.lock().await;
        let admitted = hub.gate_state() == GateState::Admitted && hub.user().is_some();
        if admitted {
            hub.ensure_subscribed().await;
        }
        admitted
    };

    if !admitted {
        tracing::debug!(path = %request.uri().path(), "Rejected request from unadmitted session");
        return Err(AppError::NotAdmitted);
    }

    Ok(next.run(request).await)
}
