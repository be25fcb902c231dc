// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Assignment synchronizer.
//!
//! Holds the one live subscription to the shared collection and republishes
//! every snapshot as the viewer's ordered list. The subscription is an
//! explicit resource: [`AssignmentSynchronizer::acquire`] opens it and
//! [`AssignmentSynchronizer::release`] closes it synchronously.

use crate::db::{AssignmentStore, Snapshot, StreamCloser};
use crate::error::AppError;
use crate::models::{Assignment, AssignmentView};
use crate::time_utils::{due_status, format_deadline};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Project one stored document into the entry seen by `viewer_id`.
pub fn project(doc: Assignment, viewer_id: &str, today: NaiveDate) -> AssignmentView {
    let completed = doc.is_completed_by(viewer_id);
    AssignmentView {
        deadline_label: doc.deadline.map(format_deadline),
        due_status: doc.deadline.map(|deadline| due_status(deadline, today)),
        id: doc.id,
        title: doc.title,
        deadline: doc.deadline,
        description: doc.description,
        subject: doc.subject,
        starred: doc.starred,
        completed_by: doc.completed_by,
        completed,
    }
}

/// Starred entries first. The sort is stable, so store order (by deadline)
/// survives inside each group.
pub fn order_starred_first(views: &mut [AssignmentView]) {
    views.sort_by_key(|view| !view.starred);
}

/// Rebuild the whole list from a snapshot.
pub fn build_views(snapshot: Snapshot, viewer_id: &str, today: NaiveDate) -> Vec<AssignmentView> {
    let mut views: Vec<AssignmentView> = snapshot
        .into_iter()
        .map(|doc| project(doc, viewer_id, today))
        .collect();
    order_starred_first(&mut views);
    views
}

/// Identifies one acquired subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct ActiveSubscription {
    handle: SubscriptionHandle,
    viewer_id: String,
    /// Set under lock on release; the delivery task checks it before publishing.
    released: Arc<Mutex<bool>>,
    closer: StreamCloser,
    task: JoinHandle<()>,
}

/// Keeps the local list consistent with the remote collection.
pub struct AssignmentSynchronizer {
    store: Arc<dyn AssignmentStore>,
    views: Arc<watch::Sender<Vec<AssignmentView>>>,
    active: Option<ActiveSubscription>,
    next_handle: u64,
}

impl AssignmentSynchronizer {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        let (views, _) = watch::channel(Vec::new());
        Self {
            store,
            views: Arc::new(views),
            active: None,
            next_handle: 0,
        }
    }

    /// Open the subscription for `viewer_id`.
    ///
    /// Acquiring again for the same viewer returns the existing handle; a
    /// different viewer replaces the subscription.
    pub async fn acquire(&mut self, viewer_id: &str) -> Result<SubscriptionHandle, AppError> {
        if let Some(active) = &self.active {
            if active.viewer_id == viewer_id {
                return Ok(active.handle);
            }
            let previous = active.handle;
            self.release(previous);
        }

        let mut stream = self.store.subscribe_assignments().await?;
        let closer = stream.closer();

        self.next_handle += 1;
        let handle = SubscriptionHandle(self.next_handle);
        let released = Arc::new(Mutex::new(false));

        let task = tokio::spawn({
            let released = released.clone();
            let views = self.views.clone();
            let viewer_id = viewer_id.to_string();
            async move {
                while let Some(snapshot) = stream.next().await {
                    let list = build_views(snapshot, &viewer_id, chrono::Local::now().date_naive());
                    let gate = released.lock().unwrap_or_else(PoisonError::into_inner);
                    if *gate {
                        break;
                    }
                    tracing::debug!(count = list.len(), "Assignment list updated");
                    views.send_replace(list);
                }
                stream.close();
            }
        });

        tracing::info!(viewer_id, handle = handle.0, "Assignment subscription acquired");

        self.active = Some(ActiveSubscription {
            handle,
            viewer_id: viewer_id.to_string(),
            released,
            closer,
            task,
        });
        Ok(handle)
    }

    /// Close the subscription behind `handle`.
    ///
    /// Returns `false` when the handle is not the active one (already
    /// released or replaced), which makes double release a no-op. Once this
    /// returns, no further list update is published.
    pub fn release(&mut self, handle: SubscriptionHandle) -> bool {
        if self.active.as_ref().map(|active| active.handle) != Some(handle) {
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };

        *active
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        active.closer.close();
        active.task.abort();
        self.views.send_replace(Vec::new());

        tracing::info!(
            viewer_id = %active.viewer_id,
            handle = handle.0,
            "Assignment subscription released"
        );
        true
    }

    /// Release whatever subscription is active.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle() {
            self.release(handle);
        }
    }

    pub fn handle(&self) -> Option<SubscriptionHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Current list as last published.
    pub fn views(&self) -> Vec<AssignmentView> {
        self.views.borrow().clone()
    }

    /// Receiver notified on every published list.
    pub fn watch(&self) -> watch::Receiver<Vec<AssignmentView>> {
        self.views.subscribe()
    }
}

impl Drop for AssignmentSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentFields;

    fn doc(id: &str, starred: bool, deadline_offset: Option<i64>) -> Assignment {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        Assignment::new(
            id,
            AssignmentFields {
                title: id.to_string(),
                deadline: deadline_offset.map(|days| today + chrono::Duration::days(days)),
                starred,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_projection_derives_completed_for_viewer() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let mut shared = doc("a", false, Some(3));
        shared.completed_by = vec!["u1".to_string(), "u2".to_string()];

        assert!(project(shared.clone(), "u1", today).completed);
        assert!(!project(shared.clone(), "u3", today).completed);

        let view = project(shared, "u3", today);
        assert_eq!(view.deadline_label.as_deref(), Some("October 19, 2026"));
        assert_eq!(view.due_status.as_deref(), Some("3 days left"));
    }

    #[test]
    fn test_undated_entry_has_no_labels() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let view = project(doc("a", false, None), "u1", today);
        assert_eq!(view.deadline_label, None);
        assert_eq!(view.due_status, None);
    }

    #[test]
    fn test_starred_first_keeps_deadline_order() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        // Store order: ascending deadline.
        let snapshot = vec![
            doc("unstarred-day1", false, Some(1)),
            doc("unstarred-day5", false, Some(5)),
            doc("starred-day10", true, Some(10)),
        ];

        let ids: Vec<String> = build_views(snapshot, "u1", today)
            .into_iter()
            .map(|v| v.id)
            .collect();

        assert_eq!(ids, vec!["starred-day10", "unstarred-day1", "unstarred-day5"]);
    }
}
