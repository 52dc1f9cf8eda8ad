// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use fitness_soul::config::Config;
use fitness_soul::db::{DbError, FirestoreDb, MemoryProfileStore, ProfileStore};
use fitness_soul::models::{
    ExperienceLevel, FitnessGoal, Identity, ProfileInput, ProfilePatch, ProfileRecord, Sex,
};
use fitness_soul::routes::create_router;
use fitness_soul::services::{
    BroadcastNotifier, FederatedCredential, IdentityEventHub, IdentityEvents, IdentityProvider,
    MemoryLocalCache, RecordingNotifier,
};
use fitness_soul::session::{SessionError, SessionSnapshot, SessionStore};
use fitness_soul::AppState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

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
    let host = std::env::var("FIRESTORE_EMULATOR_HOST").ok();
    FirestoreDb::new("test-project", host.as_deref())
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// The onboarding answers used throughout the tests.
#[allow(dead_code)]
pub fn sample_input() -> ProfileInput {
    ProfileInput {
        name: "A".to_string(),
        age: 30,
        sex: Sex::Female,
        weight: 60.0,
        height: 165.0,
        goal: FitnessGoal::LoseWeight,
        experience_level: ExperienceLevel::Beginner,
        menstrual_tracking: false,
        last_period_date: None,
        cycle_duration: None,
    }
}

#[allow(dead_code)]
pub fn completed_record() -> ProfileRecord {
    ProfileRecord::from_input(&sample_input(), None, "2026-01-01T00:00:00Z")
}

// ─── Identity Provider Fake ──────────────────────────────────

/// In-memory identity provider with email/password accounts.
pub struct FakeIdentityProvider {
    hub: IdentityEventHub,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    next_error: Mutex<Option<SessionError>>,
    created: AtomicUsize,
}

#[allow(dead_code)]
impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self {
            hub: IdentityEventHub::default(),
            accounts: Mutex::new(HashMap::new()),
            next_error: Mutex::new(None),
            created: AtomicUsize::new(0),
        }
    }

    /// A provider that already holds a persisted session for `identity`.
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            hub: IdentityEventHub::new(Some(identity)),
            ..Self::new()
        }
    }

    pub fn with_account(self, email: &str, password: &str, uid: &str) -> Self {
        let identity = Identity::new(uid).with_email(email);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
        self
    }

    /// Fail the next operation with `err`.
    pub fn fail_next(&self, err: SessionError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    /// Simulate a provider-side state change (token expiry, another tab).
    pub fn publish(&self, identity: Option<Identity>) {
        self.hub.publish(identity);
    }

    fn take_error(&self) -> Result<(), SessionError> {
        match self.next_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    fn subscribe(&self) -> IdentityEvents {
        self.hub.subscribe()
    }

    fn last_event_seq(&self) -> u64 {
        self.hub.last_seq()
    }

    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, SessionError> {
        self.take_error()?;

        let identity = match self.accounts.lock().unwrap().get(email) {
            Some((expected, identity)) if expected == password => identity.clone(),
            _ => return Err(SessionError::InvalidCredentials),
        };
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_federated_provider(
        &self,
        credential: FederatedCredential,
    ) -> Result<Identity, SessionError> {
        self.take_error()?;

        let token = credential.id_token.ok_or(SessionError::PopupDismissed)?;
        let identity = Identity::new(format!("google-{}", token))
            .with_email(format!("{}@gmail.example", token));
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.take_error()?;
        self.hub.publish(None);
        Ok(())
    }

    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        self.take_error()?;

        if password.len() < 6 {
            return Err(SessionError::WeakCredential);
        }

        let identity = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(SessionError::AccountExists);
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let identity = Identity::new(format!("user-{}", n)).with_email(email);
            accounts.insert(email.to_string(), (password.to_string(), identity.clone()));
            identity
        };

        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn update_display_name(&self, display_name: &str) -> Result<Identity, SessionError> {
        self.take_error()?;

        let current = self.hub.current().ok_or(SessionError::Unauthenticated)?;
        Ok(current.with_display_name(display_name))
    }
}

// ─── Profile Store Wrapper ───────────────────────────────────

/// Memory profile store whose reads can be held back and whose operations
/// can be made to fail.
#[derive(Default)]
pub struct GatedProfileStore {
    pub inner: MemoryProfileStore,
    gate: Arc<tokio::sync::Mutex<()>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads_started: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

#[allow(dead_code)]
impl GatedProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block reads until the returned guard is dropped.
    pub async fn hold_reads(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn reads_started(&self) -> usize {
        self.reads_started.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Yield until `n` reads have started.
    pub async fn wait_for_reads(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.reads_started() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("timed out waiting for profile reads");
    }
}

#[async_trait]
impl ProfileStore for GatedProfileStore {
    async fn read(&self, uid: &str) -> Result<Option<ProfileRecord>, DbError> {
        self.reads_started.fetch_add(1, Ordering::SeqCst);
        let _open = self.gate.lock().await;

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::Database("read failed".to_string()));
        }
        self.inner.read(uid).await
    }

    async fn create(&self, uid: &str, record: &ProfileRecord) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Database("write failed".to_string()));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(uid, record).await
    }

    async fn update(&self, uid: &str, patch: &ProfilePatch) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Database("write failed".to_string()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(uid, patch).await
    }
}

// ─── Store Harness ───────────────────────────────────────────

#[allow(dead_code)]
pub struct Harness {
    pub store: SessionStore,
    pub identity: Arc<FakeIdentityProvider>,
    pub profiles: Arc<GatedProfileStore>,
    pub cache: Arc<MemoryLocalCache>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Session store over fakes. Identity events are fed by hand.
#[allow(dead_code)]
pub fn harness(identity: FakeIdentityProvider) -> Harness {
    let identity = Arc::new(identity);
    let profiles = Arc::new(GatedProfileStore::new());
    let cache = Arc::new(MemoryLocalCache::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let store = SessionStore::new(
        identity.clone(),
        profiles.clone(),
        cache.clone(),
        notifier.clone(),
    );

    Harness {
        store,
        identity,
        profiles,
        cache,
        notifier,
    }
}

/// Session store over an arbitrary profile store.
#[allow(dead_code)]
pub struct StoreHarness {
    pub store: SessionStore,
    pub notifier: Arc<RecordingNotifier>,
}

#[allow(dead_code)]
pub fn harness_over(identity: FakeIdentityProvider, profiles: Arc<dyn ProfileStore>) -> StoreHarness {
    let notifier = Arc::new(RecordingNotifier::new());
    let store = SessionStore::new(
        Arc::new(identity),
        profiles,
        Arc::new(MemoryLocalCache::new()),
        notifier.clone(),
    );
    StoreHarness { store, notifier }
}

/// Sign `identity` in by hand and wait for its profile fetch.
#[allow(dead_code)]
pub async fn sign_in(harness: &Harness, identity: Identity) {
    if let Some(fetch) = harness.store.on_identity_changed(Some(identity)) {
        fetch.await.unwrap();
    }
}

/// Wait until the store publishes a snapshot matching `predicate`.
#[allow(dead_code)]
pub async fn wait_for<F>(store: &SessionStore, predicate: F) -> Arc<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = store.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for session state")
}

// ─── Router Harness ──────────────────────────────────────────

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub identity: Arc<FakeIdentityProvider>,
    pub profiles: Arc<GatedProfileStore>,
}

/// Create a test app over fakes with the identity listener running.
#[allow(dead_code)]
pub fn create_test_app(identity: FakeIdentityProvider) -> TestApp {
    let identity = Arc::new(identity);
    let profiles = Arc::new(GatedProfileStore::new());
    let notifications = Arc::new(BroadcastNotifier::new(16));

    let store = SessionStore::new(
        identity.clone(),
        profiles.clone(),
        Arc::new(MemoryLocalCache::new()),
        notifications.clone(),
    );
    let _listener = store.spawn_identity_listener();

    let state = Arc::new(AppState::new(Config::test_default(), store, notifications));

    TestApp {
        router: create_router(state.clone()),
        state,
        identity,
        profiles,
    }
}
