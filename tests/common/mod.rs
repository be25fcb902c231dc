// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use study_hub::app::StudyHub;
use study_hub::config::Config;
use study_hub::db::{AssignmentStore, FirestoreDb, MemoryStore};
use study_hub::gate::AccessGate;
use study_hub::models::{AssignmentView, Identity};
use study_hub::routes::create_router;
use study_hub::services::{IdentityError, IdentityProvider};
use study_hub::session::{KeyValueStore, MemoryKeyValueStore};
use study_hub::AppState;
use tokio::sync::{watch, Mutex};

/// Access password used by every test hub.
#[allow(dead_code)]
pub const TEST_SECRET: &str = "test_access_secret";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Identity provider that accepts any non-empty credential as the user ID.
///
/// `"fail"` is rejected; `set_fail_sign_out` makes sign-out fail.
pub struct FakeIdentity {
    session: watch::Sender<Option<Identity>>,
    fail_sign_out: AtomicBool,
}

#[allow(dead_code)]
impl FakeIdentity {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            session,
            fail_sign_out: AtomicBool::new(false),
        }
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, credential: &str) -> Result<Identity, IdentityError> {
        if credential.is_empty() || credential == "fail" {
            return Err(IdentityError::Rejected("popup closed".to_string()));
        }
        let identity = test_identity(credential);
        self.session.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(IdentityError::Transient("network down".to_string()));
        }
        self.session.send_replace(None);
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

#[allow(dead_code)]
pub fn test_identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: Some(format!("User {id}")),
        email: Some(format!("{id}@example.com")),
        photo_url: None,
    }
}

/// Everything a test needs to drive one session and inspect its backends.
#[allow(dead_code)]
pub struct TestHub {
    pub hub: StudyHub,
    pub store: MemoryStore,
    pub kv: Arc<MemoryKeyValueStore>,
    pub identity: Arc<FakeIdentity>,
}

/// Build a hub over an in-memory store and session.
#[allow(dead_code)]
pub fn create_test_hub() -> TestHub {
    create_test_hub_with(MemoryStore::new(), Arc::new(MemoryKeyValueStore::new()))
}

/// Build a hub over existing backends, e.g. to share a store between users
/// or to restore a persisted session.
#[allow(dead_code)]
pub fn create_test_hub_with(store: MemoryStore, kv: Arc<MemoryKeyValueStore>) -> TestHub {
    let identity = Arc::new(FakeIdentity::new());
    let gate = AccessGate::restore(kv.clone() as Arc<dyn KeyValueStore>, TEST_SECRET)
        .expect("restore gate");
    let hub = StudyHub::new(
        gate,
        identity.clone() as Arc<dyn IdentityProvider>,
        Arc::new(store.clone()) as Arc<dyn AssignmentStore>,
    );
    TestHub {
        hub,
        store,
        kv,
        identity,
    }
}

/// Sign in as `user_id` and enter the access password.
#[allow(dead_code)]
pub async fn admit(hub: &mut StudyHub, user_id: &str) {
    hub.sign_in(user_id).await.expect("sign in");
    hub.submit_secret(TEST_SECRET).await.expect("secret");
}

/// Wait until the published list satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for_list<F>(hub: &StudyHub, pred: F) -> Vec<AssignmentView>
where
    F: FnMut(&Vec<AssignmentView>) -> bool,
{
    let mut rx = hub.watch_assignments();
    let list = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for assignment list")
        .expect("assignment list channel closed");
    let snapshot = list.to_vec();
    snapshot
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, MemoryStore) {
    let TestHub { hub, store, .. } = create_test_hub();
    let state = Arc::new(AppState {
        config: Config::test_default(),
        hub: Arc::new(Mutex::new(hub)),
    });
    (create_router(state.clone()), state, store)
}
