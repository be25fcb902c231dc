// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access gate tests through a full session.
//!
//! These tests verify that:
//! 1. Only a session that passed both stages is admitted
//! 2. Logout clears both flags from every state
//! 3. Persisted flags restore the state without any network access

use std::sync::Arc;
use study_hub::db::{AssignmentStore, MemoryStore};
use study_hub::error::AppError;
use study_hub::gate::GateState;
use study_hub::session::{KeyValueStore, MemoryKeyValueStore, ACCESS_OK_KEY, SIGNED_UP_KEY};

mod common;
use common::{admit, create_test_hub, create_test_hub_with, TEST_SECRET};

#[tokio::test]
async fn test_admitted_only_after_both_stages() {
    let mut t = create_test_hub();
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);

    t.hub.sign_in("u1").await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::IdentityProven);
    assert!(!t.hub.is_subscribed());

    t.hub.submit_secret(TEST_SECRET).await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::Admitted);
    assert!(t.hub.is_subscribed());

    assert_eq!(t.kv.get(SIGNED_UP_KEY).unwrap().as_deref(), Some("true"));
    assert_eq!(t.kv.get(ACCESS_OK_KEY).unwrap().as_deref(), Some("true"));
}

#[tokio::test]
async fn test_sign_in_creates_user_record_once() {
    let mut t = create_test_hub();
    t.hub.sign_in("u1").await.unwrap();

    let first = t.store.get_user("u1").await.unwrap().expect("user record created");
    assert_eq!(first.email.as_deref(), Some("u1@example.com"));

    t.hub.logout().await.unwrap();
    t.hub.sign_in("u1").await.unwrap();

    let second = t.store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(first.first_seen, second.first_seen);
}

#[tokio::test]
async fn test_failed_sign_in_shows_generic_message() {
    let mut t = create_test_hub();

    let err = t.hub.sign_in("fail").await.unwrap_err();
    assert!(matches!(err, AppError::SignInFailed(_)));

    let session = t.hub.session();
    assert_eq!(session.state, GateState::Unauthenticated);
    assert_eq!(session.login_error.as_deref(), Some(AppError::SIGN_IN_FAILED_MESSAGE));
    // The raw cause goes to diagnostics only.
    let diagnostic = t.hub.diagnostics().current().unwrap();
    assert!(diagnostic.contains("popup closed"));
}

#[tokio::test]
async fn test_incorrect_secret_allows_retry() {
    let mut t = create_test_hub();
    t.hub.sign_in("u1").await.unwrap();

    let err = t.hub.submit_secret("wrong").await.unwrap_err();
    assert!(matches!(err, AppError::IncorrectSecret));
    assert_eq!(t.hub.gate_state(), GateState::IdentityProven);
    assert_eq!(
        t.hub.session().login_error.as_deref(),
        Some(AppError::INCORRECT_SECRET_MESSAGE)
    );
    assert_eq!(t.kv.get(ACCESS_OK_KEY).unwrap(), None);

    t.hub.submit_secret(TEST_SECRET).await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::Admitted);
    assert_eq!(t.hub.session().login_error, None);
}

#[tokio::test]
async fn test_secret_without_identity_is_rejected() {
    let mut t = create_test_hub();

    let err = t.hub.submit_secret(TEST_SECRET).await.unwrap_err();
    assert!(matches!(err, AppError::NotSignedIn));
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_clears_flags_from_every_state() {
    // Unauthenticated
    let mut t = create_test_hub();
    t.hub.logout().await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);

    // IdentityProven
    let mut t = create_test_hub();
    t.hub.sign_in("u1").await.unwrap();
    t.hub.logout().await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);
    assert_eq!(t.kv.get(SIGNED_UP_KEY).unwrap(), None);

    // Admitted
    let mut t = create_test_hub();
    admit(&mut t.hub, "u1").await;
    t.hub.logout().await.unwrap();
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);
    assert_eq!(t.kv.get(SIGNED_UP_KEY).unwrap(), None);
    assert_eq!(t.kv.get(ACCESS_OK_KEY).unwrap(), None);
    assert!(t.hub.user().is_none());
}

#[tokio::test]
async fn test_logout_clears_flags_when_sign_out_fails() {
    let mut t = create_test_hub();
    admit(&mut t.hub, "u1").await;
    t.identity.set_fail_sign_out(true);

    t.hub.logout().await.unwrap();

    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);
    assert_eq!(t.kv.get(ACCESS_OK_KEY).unwrap(), None);
    let diagnostic = t.hub.diagnostics().current().unwrap();
    assert!(diagnostic.starts_with("Logout error"));
}

#[tokio::test]
async fn test_restore_from_persisted_flags() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    kv.set(SIGNED_UP_KEY, "true").unwrap();
    kv.set(ACCESS_OK_KEY, "true").unwrap();

    let t = create_test_hub_with(MemoryStore::new(), kv);
    assert_eq!(t.hub.gate_state(), GateState::Admitted);
    // Admitted, but no list until the provider reports the user.
    assert!(!t.hub.is_subscribed());
}

#[tokio::test]
async fn test_restored_session_subscribes_once_identity_arrives() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    kv.set(SIGNED_UP_KEY, "true").unwrap();
    kv.set(ACCESS_OK_KEY, "true").unwrap();

    let mut t = create_test_hub_with(MemoryStore::new(), kv);
    t.hub
        .on_identity_change(Some(common::test_identity("u1")))
        .await
        .unwrap();

    assert!(t.hub.is_subscribed());
    assert_eq!(t.store.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_secret_flag_alone_does_not_admit() {
    let kv = Arc::new(MemoryKeyValueStore::new());
    kv.set(ACCESS_OK_KEY, "true").unwrap();

    let t = create_test_hub_with(MemoryStore::new(), kv);
    assert_eq!(t.hub.gate_state(), GateState::Unauthenticated);
}
