// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same semantics as the Firestore adapter.
//!
//! Used for offline development (`STORE_BACKEND=memory`) and tests.

use crate::db::{order_by_deadline, AssignmentStore, Snapshot, SnapshotStream};
use crate::error::AppError;
use crate::models::{Assignment, AssignmentFields, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    assignments: HashMap<String, Assignment>,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Snapshot>>,
    next_subscriber: u64,
    offline: bool,
    writes: u64,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        let mut docs: Vec<Assignment> = self.assignments.values().cloned().collect();
        order_by_deadline(&mut docs);
        docs
    }

    fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline {
            return Err(AppError::Database("store unavailable (offline)".to_string()));
        }
        Ok(())
    }

    fn assignment_mut(&mut self, id: &str) -> Result<&mut Assignment, AppError> {
        self.assignments
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }
}

/// Shared in-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: every call fails until turned back on.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    /// Number of mutating calls that reached the store.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    /// Number of subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Database("memory store lock poisoned".to_string()))
    }

    /// Run a mutation, count it and notify subscribers when it succeeds.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Inner) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut inner = self.lock()?;
        inner.check_online()?;
        inner.writes += 1;
        let out = op(&mut inner)?;
        inner.broadcast();
        Ok(out)
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let inner = self.lock()?;
        inner.check_online()?;
        Ok(inner.users.get(id).cloned())
    }

    async fn set_user(&self, user: &User) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner.check_online()?;
        inner.writes += 1;
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn create_assignment(&self, fields: &AssignmentFields) -> Result<String, AppError> {
        self.mutate(|inner| {
            inner.next_id += 1;
            let id = format!("mem-{:08}", inner.next_id);
            inner
                .assignments
                .insert(id.clone(), Assignment::new(id.clone(), fields.clone()));
            Ok(id)
        })
    }

    async fn update_assignment(
        &self,
        id: &str,
        fields: &AssignmentFields,
    ) -> Result<(), AppError> {
        self.mutate(|inner| {
            inner.assignment_mut(id)?.apply_fields(fields);
            Ok(())
        })
    }

    async fn set_starred(&self, id: &str, starred: bool) -> Result<(), AppError> {
        self.mutate(|inner| {
            inner.assignment_mut(id)?.starred = starred;
            Ok(())
        })
    }

    async fn add_completion(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.mutate(|inner| {
            let doc = inner.assignment_mut(id)?;
            if !doc.is_completed_by(user_id) {
                doc.completed_by.push(user_id.to_string());
            }
            Ok(())
        })
    }

    async fn remove_completion(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.mutate(|inner| {
            inner
                .assignment_mut(id)?
                .completed_by
                .retain(|existing| existing != user_id);
            Ok(())
        })
    }

    async fn delete_assignment(&self, id: &str) -> Result<(), AppError> {
        // Deleting a missing document is not an error, as in Firestore.
        self.mutate(|inner| {
            inner.assignments.remove(id);
            Ok(())
        })
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, AppError> {
        let inner = self.lock()?;
        inner.check_online()?;
        Ok(inner.assignments.get(id).cloned())
    }

    async fn subscribe_assignments(&self) -> Result<SnapshotStream, AppError> {
        let mut inner = self.lock()?;
        inner.check_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        // The first emission is the current set, as with a Firestore listener.
        let _ = tx.send(inner.snapshot());

        inner.next_subscriber += 1;
        let subscriber_id = inner.next_subscriber;
        inner.subscribers.insert(subscriber_id, tx);
        tracing::debug!(subscriber_id, "Memory store subscription opened");

        let shared = Arc::downgrade(&self.inner);
        Ok(SnapshotStream::new(rx, move || {
            if let Some(shared) = shared.upgrade() {
                if let Ok(mut inner) = shared.lock() {
                    inner.subscribers.remove(&subscriber_id);
                    tracing::debug!(subscriber_id, "Memory store subscription closed");
                }
            }
        }))
    }
}
