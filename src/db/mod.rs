//! Database layer: the shared remote collection and its adapters.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Assignment, AssignmentFields, User};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ASSIGNMENTS: &str = "assignments";
}

/// The full current set of assignments, ordered by ascending deadline.
pub type Snapshot = Vec<Assignment>;

/// Store order: no deadline first, then ascending deadline, ties by ID.
pub fn order_by_deadline(docs: &mut [Assignment]) {
    docs.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id)));
}

/// Releases a subscription at the store. Clones share one release.
#[derive(Clone)]
pub struct StreamCloser {
    on_close: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl StreamCloser {
    fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Arc::new(Mutex::new(Some(Box::new(on_close)))),
        }
    }

    /// Release the subscription. Only the first call has an effect.
    pub fn close(&self) {
        let on_close = self
            .on_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_close) = on_close {
            on_close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.on_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Live feed of snapshots, open until closed or dropped.
pub struct SnapshotStream {
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    closer: StreamCloser,
}

impl SnapshotStream {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Snapshot>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            closer: StreamCloser::new(on_close),
        }
    }

    /// Next snapshot, in emission order. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// A handle that can release this subscription from elsewhere.
    pub fn closer(&self) -> StreamCloser {
        self.closer.clone()
    }

    /// Stop the feed. Safe to call more than once.
    pub fn close(&mut self) {
        self.receiver.close();
        self.closer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Remote document store holding users and the shared assignment collection.
///
/// Every admitted user may mutate every assignment; writes to the same field
/// are last-writer-wins.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Create or replace a user record.
    async fn set_user(&self, user: &User) -> Result<(), AppError>;

    /// Add a new assignment with an empty `completedBy`; returns its ID.
    async fn create_assignment(&self, fields: &AssignmentFields) -> Result<String, AppError>;

    /// Overwrite the editable fields of an existing assignment.
    async fn update_assignment(&self, id: &str, fields: &AssignmentFields)
        -> Result<(), AppError>;

    async fn set_starred(&self, id: &str, starred: bool) -> Result<(), AppError>;

    /// Atomically add `user_id` to `completedBy` unless already present.
    async fn add_completion(&self, id: &str, user_id: &str) -> Result<(), AppError>;

    /// Atomically remove `user_id` from `completedBy` if present.
    async fn remove_completion(&self, id: &str, user_id: &str) -> Result<(), AppError>;

    async fn delete_assignment(&self, id: &str) -> Result<(), AppError>;

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, AppError>;

    /// Open a live subscription to the whole collection.
    async fn subscribe_assignments(&self) -> Result<SnapshotStream, AppError>;
}
