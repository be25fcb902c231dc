// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Two-stage access gate: Google identity, then the shared access password.

use crate::error::AppError;
use crate::session::{KeyValueStore, SessionState};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where a session stands in the admission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum GateState {
    Unauthenticated,
    IdentityProven,
    Admitted,
}

/// Admission state machine backed by durable local flags.
pub struct AccessGate {
    kv: Arc<dyn KeyValueStore>,
    secret: String,
    session: SessionState,
}

impl AccessGate {
    /// Rebuild the gate from persisted flags. No network access happens here,
    /// so a returning user is admitted before the identity provider answers.
    pub fn restore(kv: Arc<dyn KeyValueStore>, secret: impl Into<String>) -> Result<Self, AppError> {
        let session = SessionState::load(kv.as_ref())?;
        tracing::info!(state = ?session.gate_state(), "Restored access gate");

        Ok(Self {
            kv,
            secret: secret.into(),
            session,
        })
    }

    pub fn state(&self) -> GateState {
        self.session.gate_state()
    }

    pub fn is_admitted(&self) -> bool {
        self.state() == GateState::Admitted
    }

    /// Record a successful identity-provider round trip.
    pub fn identity_proven(&mut self) -> Result<GateState, AppError> {
        if !self.session.identity_proven {
            let next = SessionState {
                identity_proven: true,
                ..self.session
            };
            next.persist(self.kv.as_ref())?;
            self.session = next;
            tracing::info!(state = ?self.state(), "Identity proven");
        }
        Ok(self.state())
    }

    /// Check the shared access password.
    ///
    /// A mismatch leaves both the in-memory and the persisted state untouched;
    /// the caller may retry immediately.
    pub fn submit_secret(&mut self, attempt: &str) -> Result<GateState, AppError> {
        if !self.session.identity_proven {
            return Err(AppError::NotSignedIn);
        }

        let matches: bool = attempt.as_bytes().ct_eq(self.secret.as_bytes()).into();
        if !matches {
            tracing::warn!("Incorrect access password entered");
            return Err(AppError::IncorrectSecret);
        }

        if !self.session.secret_proven {
            let next = SessionState {
                secret_proven: true,
                ..self.session
            };
            next.persist(self.kv.as_ref())?;
            self.session = next;
        }

        tracing::info!("Access password accepted");
        Ok(self.state())
    }

    /// Clear both flags, from whatever state the gate is in.
    pub fn logout(&mut self) -> Result<(), AppError> {
        let cleared = SessionState::default();
        // Forget in memory first so a storage failure cannot leave us admitted.
        self.session = cleared;
        cleared.persist(self.kv.as_ref())?;
        tracing::info!("Session flags cleared");
        Ok(())
    }
}
