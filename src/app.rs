// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One user session: access gate, synchronized list, editor and the
//! diagnostics panel, driven by user actions and identity changes.

use crate::db::AssignmentStore;
use crate::editor::{AssignmentEditor, SubmitOutcome};
use crate::error::AppError;
use crate::gate::{AccessGate, GateState};
use crate::models::{AssignmentFields, AssignmentView, Identity, User};
use crate::services::IdentityProvider;
use crate::sync::AssignmentSynchronizer;
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Last error with its raw cause, shown until dismissed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Diagnostics {
    message: Option<String>,
    visible: bool,
}

impl Diagnostics {
    pub fn record(&mut self, context: &str, err: impl Display) {
        let message = format!("{context}: {err}");
        tracing::warn!(diagnostic = %message, "Diagnostic recorded");
        self.message = Some(message);
        self.visible = true;
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The message, if one is recorded and not dismissed.
    pub fn current(&self) -> Option<&str> {
        self.message.as_deref().filter(|_| self.visible)
    }
}

/// What the login screens and header need to render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionView {
    pub state: GateState,
    pub user: Option<Identity>,
    pub login_error: Option<String>,
    pub subscribed: bool,
}

/// A single user's session against the shared collection.
pub struct StudyHub {
    gate: AccessGate,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn AssignmentStore>,
    sync: AssignmentSynchronizer,
    editor: AssignmentEditor,
    user: Option<Identity>,
    login_error: Option<String>,
    diagnostics: Diagnostics,
}

impl StudyHub {
    pub fn new(
        gate: AccessGate,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn AssignmentStore>,
    ) -> Self {
        Self {
            gate,
            identity,
            sync: AssignmentSynchronizer::new(store.clone()),
            store,
            editor: AssignmentEditor::new(),
            user: None,
            login_error: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Apply the identity provider's startup state.
    pub async fn start(&mut self) -> Result<(), AppError> {
        let current = self.identity.current();
        self.on_identity_change(current).await
    }

    // ─── Access Gate ─────────────────────────────────────────────

    /// React to the identity provider reporting a (possibly absent) identity.
    ///
    /// Repeated reports of the same identity are harmless.
    pub async fn on_identity_change(&mut self, identity: Option<Identity>) -> Result<(), AppError> {
        match identity {
            Some(identity) => {
                let known = self.user.as_ref().is_some_and(|u| u.id == identity.id);
                self.gate.identity_proven()?;
                if !known {
                    if let Err(e) = self.ensure_user_record(&identity).await {
                        self.diagnostics.record("Auth state error", &e);
                    }
                }
                self.user = Some(identity);
            }
            None => {
                if self.user.take().is_some() {
                    tracing::info!("Identity provider session ended");
                }
            }
        }
        self.refresh_subscription().await;
        Ok(())
    }

    /// Create the user record on first sight; existing records are kept.
    async fn ensure_user_record(&self, identity: &Identity) -> Result<(), AppError> {
        if self.store.get_user(&identity.id).await?.is_none() {
            let user = User::first_seen(identity, format_utc_rfc3339(chrono::Utc::now()));
            self.store.set_user(&user).await?;
            tracing::info!(user_id = %identity.id, "Created user record");
        }
        Ok(())
    }

    /// First gate stage: sign in with a Google credential.
    pub async fn sign_in(&mut self, credential: &str) -> Result<GateState, AppError> {
        match self.identity.sign_in(credential).await {
            Ok(identity) => {
                self.login_error = None;
                self.diagnostics.clear();
                self.on_identity_change(Some(identity)).await?;
                Ok(self.gate.state())
            }
            Err(e) => {
                let err = AppError::from(e);
                self.login_error = Some(err.user_message());
                self.diagnostics.record("Google sign-in error", &err);
                Err(err)
            }
        }
    }

    /// Second gate stage: the shared access password.
    pub async fn submit_secret(&mut self, secret: &str) -> Result<GateState, AppError> {
        match self.gate.submit_secret(secret) {
            Ok(state) => {
                self.login_error = None;
                self.diagnostics.clear();
                self.refresh_subscription().await;
                Ok(state)
            }
            Err(err) => {
                self.login_error = Some(err.user_message());
                self.diagnostics.record("Password error", &err);
                Err(err)
            }
        }
    }

    /// Leave the session from any state.
    ///
    /// The subscription is released before anything is awaited, so no list
    /// update can arrive after logout starts.
    pub async fn logout(&mut self) -> Result<(), AppError> {
        self.sync.stop();
        self.editor.close();
        self.user = None;
        self.login_error = None;

        let cleared = self.gate.logout();

        match self.identity.sign_out().await {
            Ok(()) => self.diagnostics.clear(),
            Err(e) => self.diagnostics.record("Logout error", e),
        }

        tracing::info!("Logged out");
        cleared
    }

    /// Release the subscription when the session is being discarded.
    pub fn teardown(&mut self) {
        self.sync.stop();
    }

    /// Retry the subscription if an earlier acquire failed.
    pub async fn ensure_subscribed(&mut self) {
        if !self.sync.is_active() {
            self.refresh_subscription().await;
        }
    }

    /// Hold the subscription exactly while admitted with a known user.
    ///
    /// A failed acquire leaves the gate state alone and goes to diagnostics.
    async fn refresh_subscription(&mut self) {
        let viewer = match (&self.user, self.gate.is_admitted()) {
            (Some(user), true) => user.id.clone(),
            _ => {
                self.sync.stop();
                return;
            }
        };

        if let Err(e) = self.sync.acquire(&viewer).await {
            self.diagnostics.record("Subscription error", &e);
        }
    }

    // ─── Views ───────────────────────────────────────────────────

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn session(&self) -> SessionView {
        SessionView {
            state: self.gate.state(),
            user: self.user.clone(),
            login_error: self.login_error.clone(),
            subscribed: self.sync.is_active(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sync.is_active()
    }

    /// The synchronized list, starred first.
    pub fn assignments(&self) -> Vec<AssignmentView> {
        self.sync.views()
    }

    /// Receiver notified whenever the list changes.
    pub fn watch_assignments(&self) -> tokio::sync::watch::Receiver<Vec<AssignmentView>> {
        self.sync.watch()
    }

    pub fn editor(&self) -> &AssignmentEditor {
        &self.editor
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn dismiss_diagnostics(&mut self) {
        self.diagnostics.dismiss();
    }

    // ─── Editor Actions ──────────────────────────────────────────

    fn require_admitted(&self) -> Result<&Identity, AppError> {
        match &self.user {
            Some(user) if self.gate.is_admitted() => Ok(user),
            _ => Err(AppError::NotAdmitted),
        }
    }

    fn find_assignment(&self, id: &str) -> Result<AssignmentView, AppError> {
        self.sync
            .views()
            .into_iter()
            .find(|view| view.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }

    /// Record a failed remote call in the diagnostics panel.
    fn surface<T>(&mut self, context: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            self.diagnostics.record(context, e);
        }
        result
    }

    pub fn open_create(&mut self) -> Result<(), AppError> {
        self.require_admitted()?;
        self.editor.open_create();
        Ok(())
    }

    pub fn open_edit(&mut self, id: &str) -> Result<(), AppError> {
        self.require_admitted()?;
        let assignment = self.find_assignment(id)?;
        self.editor.open_edit(&assignment);
        Ok(())
    }

    pub fn update_form(&mut self, form: AssignmentFields) -> Result<(), AppError> {
        self.require_admitted()?;
        self.editor.set_form(form);
        Ok(())
    }

    pub fn close_editor(&mut self) {
        self.editor.close();
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome, AppError> {
        self.require_admitted()?;
        let result = self.editor.submit(self.store.as_ref()).await;
        self.surface("Save error", result)
    }

    pub async fn toggle_star(&mut self, id: &str) -> Result<(), AppError> {
        self.require_admitted()?;
        let assignment = self.find_assignment(id)?;
        let result = self
            .editor
            .toggle_star(self.store.as_ref(), &assignment)
            .await;
        self.surface("Star error", result)
    }

    pub async fn toggle_completed(&mut self, id: &str) -> Result<(), AppError> {
        let user_id = self.require_admitted()?.id.clone();
        let assignment = self.find_assignment(id)?;
        let result = self
            .editor
            .toggle_completed(self.store.as_ref(), &assignment, &user_id)
            .await;
        self.surface("Completion error", result)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), AppError> {
        self.require_admitted()?;
        let assignment = self.find_assignment(id)?;
        let result = self.editor.delete(self.store.as_ref(), &assignment).await;
        self.surface("Delete error", result)
    }
}

/// Forward identity-provider changes to the shared session.
pub fn spawn_identity_watcher(
    hub: Arc<Mutex<StudyHub>>,
    identity: Arc<dyn IdentityProvider>,
) -> JoinHandle<()> {
    let mut changes = identity.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let mut hub = hub.lock().await;
            let current = changes.borrow_and_update().clone();
            if let Err(e) = hub.on_identity_change(current).await {
                tracing::warn!(error = %e, "Failed to apply identity change");
            }
        }
    })
}
