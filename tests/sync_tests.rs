// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live assignment list tests.
//!
//! These tests verify that:
//! 1. Snapshots reach every admitted session, projected per viewer
//! 2. A released subscription never publishes again
//! 3. At most one subscription is held per session

use std::sync::Arc;
use std::time::Duration;
use study_hub::db::{AssignmentStore, MemoryStore};
use study_hub::gate::GateState;
use study_hub::models::AssignmentFields;
use study_hub::session::MemoryKeyValueStore;
use study_hub::sync::AssignmentSynchronizer;

mod common;
use common::{admit, create_test_hub, create_test_hub_with, wait_for_list};

fn titled(title: &str) -> AssignmentFields {
    AssignmentFields {
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_list_follows_remote_changes() {
    let mut t = create_test_hub();
    admit(&mut t.hub, "u1").await;

    let id = t.store.create_assignment(&titled("Essay")).await.unwrap();
    let list = wait_for_list(&t.hub, |list| list.len() == 1).await;
    assert_eq!(list[0].id, id);
    assert_eq!(list[0].title, "Essay");

    t.store.set_starred(&id, true).await.unwrap();
    let list = wait_for_list(&t.hub, |list| list.first().is_some_and(|a| a.starred)).await;
    assert_eq!(list.len(), 1);

    t.store.delete_assignment(&id).await.unwrap();
    wait_for_list(&t.hub, |list| list.is_empty()).await;
}

#[tokio::test]
async fn test_completion_is_per_viewer() {
    let store = MemoryStore::new();
    let mut alice = create_test_hub_with(store.clone(), Arc::new(MemoryKeyValueStore::new()));
    let mut bob = create_test_hub_with(store.clone(), Arc::new(MemoryKeyValueStore::new()));
    admit(&mut alice.hub, "u1").await;
    admit(&mut bob.hub, "u2").await;

    let id = store.create_assignment(&titled("Lab report")).await.unwrap();
    wait_for_list(&bob.hub, |list| list.len() == 1).await;

    bob.hub.toggle_completed(&id).await.unwrap();

    let seen_by_bob = wait_for_list(&bob.hub, |list| list.first().is_some_and(|a| a.completed)).await;
    assert_eq!(seen_by_bob[0].completed_by, vec!["u2".to_string()]);

    let seen_by_alice =
        wait_for_list(&alice.hub, |list| list.len() == 1 && !list[0].completed_by.is_empty())
            .await;
    assert!(!seen_by_alice[0].completed);
}

#[tokio::test]
async fn test_starred_entries_listed_first() {
    let mut t = create_test_hub();
    admit(&mut t.hub, "u1").await;

    let today = chrono::Local::now().date_naive();
    for (title, days, starred) in [("soon", 1, false), ("later", 5, false), ("starred", 10, true)] {
        t.store
            .create_assignment(&AssignmentFields {
                title: title.to_string(),
                deadline: Some(today + chrono::Duration::days(days)),
                starred,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let list = wait_for_list(&t.hub, |list| list.len() == 3).await;
    let titles: Vec<&str> = list.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["starred", "soon", "later"]);
    assert_eq!(list[1].due_status.as_deref(), Some("1 day left"));
}

#[tokio::test]
async fn test_no_updates_after_release() {
    let store = MemoryStore::new();
    let mut sync = AssignmentSynchronizer::new(Arc::new(store.clone()));

    let handle = sync.acquire("u1").await.unwrap();
    assert_eq!(store.active_subscriptions(), 1);

    assert!(sync.release(handle));
    assert_eq!(store.active_subscriptions(), 0);

    store.create_assignment(&titled("After release")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sync.views().is_empty());
    assert!(!sync.is_active());
}

#[tokio::test]
async fn test_double_release_is_noop() {
    let store = MemoryStore::new();
    let mut sync = AssignmentSynchronizer::new(Arc::new(store.clone()));

    let handle = sync.acquire("u1").await.unwrap();
    assert!(sync.release(handle));
    assert!(!sync.release(handle));

    // A stale handle cannot release a newer subscription.
    let newer = sync.acquire("u1").await.unwrap();
    assert_ne!(handle, newer);
    assert!(!sync.release(handle));
    assert!(sync.is_active());
    assert_eq!(store.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_single_subscription_per_session() {
    let store = MemoryStore::new();
    let mut sync = AssignmentSynchronizer::new(Arc::new(store.clone()));

    let first = sync.acquire("u1").await.unwrap();
    let again = sync.acquire("u1").await.unwrap();
    assert_eq!(first, again);
    assert_eq!(store.active_subscriptions(), 1);

    // A different viewer replaces the subscription.
    let other = sync.acquire("u2").await.unwrap();
    assert_ne!(first, other);
    assert_eq!(store.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_logout_releases_subscription() {
    let mut t = create_test_hub();
    admit(&mut t.hub, "u1").await;
    t.store.create_assignment(&titled("Essay")).await.unwrap();
    wait_for_list(&t.hub, |list| list.len() == 1).await;
    assert_eq!(t.store.active_subscriptions(), 1);

    t.hub.logout().await.unwrap();

    assert!(!t.hub.is_subscribed());
    assert_eq!(t.store.active_subscriptions(), 0);
    assert!(t.hub.assignments().is_empty());

    t.store.create_assignment(&titled("Unseen")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(t.hub.assignments().is_empty());
}

#[tokio::test]
async fn test_subscription_failure_is_surfaced() {
    let mut t = create_test_hub();
    t.hub.sign_in("u1").await.unwrap();
    t.store.set_offline(true);

    // The password was right, so the gate opens even without a list
    let state = t.hub.submit_secret(common::TEST_SECRET).await.unwrap();
    assert_eq!(state, GateState::Admitted);
    assert!(!t.hub.is_subscribed());
    let diagnostic = t.hub.diagnostics().current().unwrap();
    assert!(diagnostic.starts_with("Subscription error"));

    // Still offline: retrying fails quietly
    t.hub.ensure_subscribed().await;
    assert!(!t.hub.is_subscribed());
    assert_eq!(t.hub.gate_state(), GateState::Admitted);

    t.store.set_offline(false);
    t.hub.ensure_subscribed().await;
    assert!(t.hub.is_subscribed());
    assert_eq!(t.store.active_subscriptions(), 1);

    let id = t.store.create_assignment(&titled("Recovered")).await.unwrap();
    let list = wait_for_list(&t.hub, |list| list.len() == 1).await;
    assert_eq!(list[0].id, id);

    // A live subscription is not acquired twice
    t.hub.ensure_subscribed().await;
    assert_eq!(t.store.active_subscriptions(), 1);
}
