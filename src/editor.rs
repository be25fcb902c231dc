// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Assignment editor: local form state and the remote mutations it issues.
//!
//! Local state is never changed ahead of the store; the next snapshot is
//! what shows the effect of a mutation.

use crate::db::AssignmentStore;
use crate::error::AppError;
use crate::models::{AssignmentFields, AssignmentView};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Result of submitting the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Blank title: nothing was sent and the form stays open.
    Rejected,
    Created(String),
    Updated(String),
}

/// Create/edit form state. `editing_id == None` means create mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AssignmentEditor {
    form: AssignmentFields,
    editing_id: Option<String>,
    open: bool,
}

impl AssignmentEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &AssignmentFields {
        &self.form
    }

    /// Replace the form contents (user input).
    pub fn set_form(&mut self, form: AssignmentFields) {
        self.form = form;
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open an empty form in create mode.
    pub fn open_create(&mut self) {
        self.form = AssignmentFields::default();
        self.editing_id = None;
        self.open = true;
    }

    /// Open the form on an existing entry. `completed_by` is not part of it.
    pub fn open_edit(&mut self, assignment: &AssignmentView) {
        self.form = assignment.fields();
        self.editing_id = Some(assignment.id.clone());
        self.open = true;
    }

    /// Close and reset to an empty create form.
    pub fn close(&mut self) {
        *self = Self::default();
    }

    /// Send the form to the store.
    ///
    /// On failure the form is left exactly as it was so the user can retry.
    pub async fn submit(&mut self, store: &dyn AssignmentStore) -> Result<SubmitOutcome, AppError> {
        if self.form.title.trim().is_empty() {
            tracing::debug!("Ignoring submit with blank title");
            return Ok(SubmitOutcome::Rejected);
        }

        let outcome = match &self.editing_id {
            None => {
                let id = store.create_assignment(&self.form).await?;
                tracing::info!(assignment_id = %id, "Assignment added");
                SubmitOutcome::Created(id)
            }
            Some(id) => {
                store.update_assignment(id, &self.form).await?;
                tracing::info!(assignment_id = %id, "Assignment updated");
                SubmitOutcome::Updated(id.clone())
            }
        };

        self.close();
        Ok(outcome)
    }

    /// Flip the star of an entry.
    pub async fn toggle_star(
        &self,
        store: &dyn AssignmentStore,
        assignment: &AssignmentView,
    ) -> Result<(), AppError> {
        store
            .set_starred(&assignment.id, !assignment.starred)
            .await
    }

    /// Mark or unmark an entry as done for `user_id`.
    pub async fn toggle_completed(
        &self,
        store: &dyn AssignmentStore,
        assignment: &AssignmentView,
        user_id: &str,
    ) -> Result<(), AppError> {
        if assignment.completed_by.iter().any(|id| id == user_id) {
            store.remove_completion(&assignment.id, user_id).await
        } else {
            store.add_completion(&assignment.id, user_id).await
        }
    }

    /// Delete an entry; if it is the one being edited, the form resets.
    pub async fn delete(
        &mut self,
        store: &dyn AssignmentStore,
        assignment: &AssignmentView,
    ) -> Result<(), AppError> {
        store.delete_assignment(&assignment.id).await?;
        if self.editing_id.as_deref() == Some(assignment.id.as_str()) {
            self.close();
        }
        Ok(())
    }
}
