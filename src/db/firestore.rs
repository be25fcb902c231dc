// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage)
//! - Assignments (shared collection, incl. atomic `completedBy` updates)
//! - Live subscription to the assignment collection via a Firestore listener

use crate::db::{collections, order_by_deadline, AssignmentStore, Snapshot, SnapshotStream};
use crate::error::AppError;
use crate::models::assignment::fields;
use crate::models::{Assignment, AssignmentFields, User};
use async_trait::async_trait;
use firestore::{
    FirestoreListenEvent, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreQueryDirection, FirestoreWritePrecondition,
};
use gcloud_sdk::google::firestore::v1::target_change::TargetChangeType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Listener target ID for the assignment collection query.
const ASSIGNMENTS_TARGET: u32 = 1;

/// Single-field patch used to flip the star.
#[derive(Serialize, Deserialize)]
struct StarredPatch {
    starred: bool,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl AssignmentStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Assignment Operations ───────────────────────────────────

    async fn create_assignment(&self, new_fields: &AssignmentFields) -> Result<String, AppError> {
        let doc = Assignment::new(String::new(), new_fields.clone());

        let created: Assignment = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ASSIGNMENTS)
            .generate_document_id()
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(assignment_id = %created.id, "Assignment created");
        Ok(created.id)
    }

    async fn update_assignment(
        &self,
        id: &str,
        new_fields: &AssignmentFields,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields::EDITABLE)
            .in_col(collections::ASSIGNMENTS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(new_fields)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_starred(&self, id: &str, starred: bool) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields([fields::STARRED])
            .in_col(collections::ASSIGNMENTS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&StarredPatch { starred })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn add_completion(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::ASSIGNMENTS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .transforms(|t| {
                t.fields([t
                    .field(fields::COMPLETED_BY)
                    .append_missing_elements([user_id.to_string()])])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add completion in transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit completion: {}", e)))?;
        Ok(())
    }

    async fn remove_completion(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::ASSIGNMENTS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .transforms(|t| {
                t.fields([t
                    .field(fields::COMPLETED_BY)
                    .remove_all_from_array([user_id.to_string()])])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to remove completion in transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit completion: {}", e)))?;
        Ok(())
    }

    async fn delete_assignment(&self, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ASSIGNMENTS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        tracing::info!(assignment_id = id, "Assignment deleted");
        Ok(())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ASSIGNMENTS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Live Subscription ───────────────────────────────────────

    /// Listen to the whole collection ordered by deadline.
    ///
    /// Document changes are folded into a local copy of the result set, and a
    /// snapshot is emitted each time Firestore reports a consistent point.
    async fn subscribe_assignments(&self) -> Result<SnapshotStream, AppError> {
        let client = self.get_client()?;

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create listener: {}", e)))?;

        client
            .fluent()
            .select()
            .from(collections::ASSIGNMENTS)
            .order_by([(fields::DEADLINE, FirestoreQueryDirection::Ascending)])
            .listen()
            .add_target(FirestoreListenerTarget::new(ASSIGNMENTS_TARGET), &mut listener)
            .map_err(|e| AppError::Database(format!("Failed to add listen target: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let documents: Arc<Mutex<BTreeMap<String, Assignment>>> = Arc::default();

        listener
            .start(move |event| {
                let tx = tx.clone();
                let documents = documents.clone();
                async move {
                    apply_listen_event(&documents, event, &tx);
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start listener: {}", e)))?;

        tracing::info!("Subscribed to assignments");

        Ok(SnapshotStream::new(rx, move || {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = listener.shutdown().await {
                            tracing::warn!(error = %e, "Failed to shut down assignment listener");
                        } else {
                            tracing::info!("Assignment listener shut down");
                        }
                    });
                }
                Err(_) => tracing::warn!("No runtime available to shut down assignment listener"),
            }
        }))
    }
}

/// Fold one listen event into the local result set, emitting a snapshot at
/// each global consistency point.
fn apply_listen_event(
    documents: &Mutex<BTreeMap<String, Assignment>>,
    event: FirestoreListenEvent,
    tx: &mpsc::UnboundedSender<Snapshot>,
) {
    let Ok(mut docs) = documents.lock() else {
        tracing::error!("Assignment listener state poisoned");
        return;
    };

    match event {
        FirestoreListenEvent::DocumentChange(change) => {
            if let Some(doc) = change.document {
                match firestore::FirestoreDb::deserialize_doc_to::<Assignment>(&doc) {
                    Ok(assignment) => {
                        docs.insert(assignment.id.clone(), assignment);
                    }
                    Err(e) => {
                        tracing::warn!(document = %doc.name, error = %e, "Skipping undecodable assignment");
                    }
                }
            }
        }
        FirestoreListenEvent::DocumentDelete(deleted) => {
            docs.remove(document_id(&deleted.document));
        }
        FirestoreListenEvent::DocumentRemove(removed) => {
            docs.remove(document_id(&removed.document));
        }
        FirestoreListenEvent::TargetChange(change) => match change.target_change_type() {
            TargetChangeType::Reset => docs.clear(),
            TargetChangeType::NoChange
                if change.target_ids.is_empty() && change.read_time.is_some() =>
            {
                let mut snapshot: Snapshot = docs.values().cloned().collect();
                order_by_deadline(&mut snapshot);
                tracing::debug!(count = snapshot.len(), "Assignment snapshot");
                // A closed receiver means the subscription was released.
                let _ = tx.send(snapshot);
            }
            _ => {}
        },
        _ => {}
    }
}

/// Last path segment of a full document name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
