// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session store: the single source of truth for sign-in and onboarding state.
//!
//! The store is constructed once at startup and handed to every consumer.
//! All state changes go through [`SessionStore::transition`], which publishes
//! one immutable snapshot per change. Snapshots are queued and delivered to
//! subscribers in publication order, with no store lock held, so a callback
//! may itself subscribe.
//!
//! Identity provider events carry a sequence number. Once a sign-out is
//! confirmed, events published before it are ignored.
//!
//! Profile fetches are tagged with the identity and session generation they
//! were started for. A result whose tag is no longer the in-flight one (the
//! user signed out, switched accounts, or a save superseded it) is dropped.

use crate::db::{DbError, ProfileStore};
use crate::models::{Identity, ProfileInput, ProfilePatch, ProfileRecord};
use crate::services::identity::{FederatedCredential, IdentityEvent, IdentityProvider};
use crate::services::local_cache::{profile_cache_key, LocalCache};
use crate::services::notifier::{Notification, Notifier};
use crate::session::SessionError;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Immutable view of the session published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<ProfileRecord>,
    /// True until the identity provider reports for the first time
    pub auth_loading: bool,
    /// True while a profile fetch for the current identity is outstanding
    pub profile_loading: bool,
}

impl SessionSnapshot {
    /// State at process start, before the identity provider has reported.
    pub fn starting() -> Self {
        Self {
            identity: None,
            profile: None,
            auth_loading: true,
            profile_loading: false,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            auth_loading: false,
            ..Self::starting()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }
}

/// Identifies one profile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchTag {
    uid: String,
    generation: u64,
    seq: u64,
}

struct State {
    snapshot: Arc<SessionSnapshot>,
    /// Bumped on every published snapshot
    version: u64,
    /// Bumped on every change of principal (sign-in, sign-out, account switch)
    generation: u64,
    next_fetch: u64,
    in_flight: Option<FetchTag>,
    /// Provider events numbered below this predate the last confirmed sign-out
    stale_before: u64,
}

impl State {
    fn fetch_tag(&mut self, uid: &str) -> FetchTag {
        self.next_fetch += 1;
        FetchTag {
            uid: uid.to_string(),
            generation: self.generation,
            seq: self.next_fetch,
        }
    }

    fn is_stale(&self, event_seq: Option<u64>) -> bool {
        event_seq.is_some_and(|seq| seq < self.stale_before)
    }
}

type Observer = Arc<dyn Fn(&Arc<SessionSnapshot>) + Send + Sync>;

struct ObserverEntry {
    id: u64,
    /// Version current at registration; only later snapshots are broadcast to it
    since: u64,
    observer: Observer,
}

enum Pending {
    Broadcast {
        version: u64,
        snapshot: Arc<SessionSnapshot>,
    },
    /// Snapshot current when `observer` registered through `observe`
    Initial {
        observer: u64,
        snapshot: Arc<SessionSnapshot>,
    },
}

#[derive(Default)]
struct Delivery {
    pending: VecDeque<Pending>,
    /// Some caller is running callbacks; new work is left to it
    draining: bool,
}

/// Releases the drainer role if a callback panics.
struct DrainGuard<'a>(&'a Mutex<Delivery>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}

struct Shared {
    state: Mutex<State>,
    observers: Mutex<Vec<ObserverEntry>>,
    next_observer: AtomicU64,
    delivery: Mutex<Delivery>,
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    cache: Arc<dyn LocalCache>,
    notifier: Arc<dyn Notifier>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the session store. Cloning is cheap and shares the same store.
#[derive(Clone)]
pub struct SessionStore {
    shared: Arc<Shared>,
}

/// Active subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            let removed = {
                let mut observers = lock(&shared.observers);
                observers
                    .iter()
                    .position(|entry| entry.id == self.id)
                    .map(|pos| observers.remove(pos))
            };
            // The observer may own subscriptions of its own; drop it unlocked.
            drop(removed);
        }
    }
}

impl SessionStore {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        cache: Arc<dyn LocalCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    snapshot: Arc::new(SessionSnapshot::starting()),
                    version: 0,
                    generation: 0,
                    next_fetch: 0,
                    in_flight: None,
                    stale_before: 0,
                }),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                delivery: Mutex::new(Delivery::default()),
                identity,
                profiles,
                cache,
                notifier,
            }),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        lock(&self.shared.state).snapshot.clone()
    }

    // ─── Subscriptions ───────────────────────────────────────────

    /// Receive every snapshot published from now on.
    ///
    /// Observers run synchronously on the publishing task, after the store
    /// lock is released. They may read the store and subscribe or unsubscribe.
    /// A snapshot published while another thread is delivering is handed to
    /// that thread, which delivers it in order.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Arc<SessionSnapshot>) + Send + Sync + 'static,
    {
        let state = lock(&self.shared.state);
        self.register(state.version, Arc::new(observer))
    }

    /// Like [`subscribe`](Self::subscribe), but first delivers the current
    /// snapshot. Every later snapshot follows it, none are skipped.
    ///
    /// Called from inside another observer, the current snapshot is delivered
    /// once that observer returns.
    pub fn observe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Arc<SessionSnapshot>) + Send + Sync + 'static,
    {
        let subscription = {
            let state = lock(&self.shared.state);
            let subscription = self.register(state.version, Arc::new(observer));
            lock(&self.shared.delivery).pending.push_back(Pending::Initial {
                observer: subscription.id,
                snapshot: state.snapshot.clone(),
            });
            subscription
        };
        self.deliver_pending();
        subscription
    }

    fn register(&self, since: u64, observer: Observer) -> Subscription {
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.observers).push(ObserverEntry {
            id,
            since,
            observer,
        });
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Apply a state change and publish the resulting snapshot.
    ///
    /// `change` returns the next snapshot, or `None` to publish nothing.
    fn transition<T>(&self, change: impl FnOnce(&mut State) -> (Option<SessionSnapshot>, T)) -> T {
        let out = {
            let mut state = lock(&self.shared.state);
            let (next, out) = change(&mut state);
            if let Some(next) = next {
                let snapshot = Arc::new(next);
                state.snapshot = snapshot.clone();
                state.version += 1;
                lock(&self.shared.delivery).pending.push_back(Pending::Broadcast {
                    version: state.version,
                    snapshot,
                });
            }
            out
        };

        self.deliver_pending();
        out
    }

    /// Run queued deliveries, unless a caller further up is already doing so.
    fn deliver_pending(&self) {
        {
            let mut delivery = lock(&self.shared.delivery);
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }
        let _guard = DrainGuard(&self.shared.delivery);

        loop {
            let pending = {
                let mut delivery = lock(&self.shared.delivery);
                match delivery.pending.pop_front() {
                    Some(pending) => pending,
                    None => {
                        delivery.draining = false;
                        return;
                    }
                }
            };

            let (snapshot, targets) = {
                let observers = lock(&self.shared.observers);
                match pending {
                    Pending::Broadcast { version, snapshot } => {
                        let targets: Vec<Observer> = observers
                            .iter()
                            .filter(|entry| entry.since < version)
                            .map(|entry| entry.observer.clone())
                            .collect();
                        (snapshot, targets)
                    }
                    Pending::Initial { observer, snapshot } => {
                        let targets: Vec<Observer> = observers
                            .iter()
                            .filter(|entry| entry.id == observer)
                            .map(|entry| entry.observer.clone())
                            .collect();
                        (snapshot, targets)
                    }
                }
            };

            for observer in targets {
                observer(&snapshot);
            }
        }
    }

    // ─── Identity Changes ────────────────────────────────────────

    /// Attach the identity provider's event stream to this store.
    pub fn spawn_identity_listener(&self) -> JoinHandle<()> {
        let mut events = self.shared.identity.subscribe();
        let store = self.clone();

        tokio::spawn(async move {
            while let Some(IdentityEvent { seq, identity }) = events.recv().await {
                tracing::debug!(
                    seq,
                    signed_in = identity.is_some(),
                    "Identity provider notification"
                );
                store.apply_identity(identity, Some(seq));
            }
            tracing::info!("Identity provider event stream closed");
        })
    }

    /// Apply an identity provider notification.
    ///
    /// A newly present identity is published together with
    /// `profile_loading = true`, and its profile read is spawned; the handle
    /// of that read is returned. Re-announcing the current identity never
    /// starts a second fetch.
    pub fn on_identity_changed(&self, identity: Option<Identity>) -> Option<JoinHandle<()>> {
        self.apply_identity(identity, None)
    }

    /// `event_seq` is the provider's number for this event, when it came
    /// through the listener.
    fn apply_identity(
        &self,
        identity: Option<Identity>,
        event_seq: Option<u64>,
    ) -> Option<JoinHandle<()>> {
        let Some(identity) = identity else {
            self.clear_identity(event_seq, None);
            return None;
        };

        let tag = self.transition(|state| {
            if state.is_stale(event_seq) {
                tracing::debug!(uid = %identity.uid, ?event_seq, "Ignoring sign-in from before sign-out");
                return (None, None);
            }

            let current = state.snapshot.clone();

            if !current.auth_loading && current.uid() == Some(identity.uid.as_str()) {
                if current.identity.as_ref() == Some(&identity) {
                    return (None, None);
                }
                let next = SessionSnapshot {
                    identity: Some(identity),
                    ..(*current).clone()
                };
                return (Some(next), None);
            }

            state.generation += 1;
            let tag = state.fetch_tag(&identity.uid);
            state.in_flight = Some(tag.clone());

            let next = SessionSnapshot {
                identity: Some(identity),
                profile: None,
                auth_loading: false,
                profile_loading: true,
            };
            (Some(next), Some(tag))
        })?;

        tracing::info!(uid = %tag.uid, generation = tag.generation, "Identity signed in, fetching profile");

        let store = self.clone();
        Some(tokio::spawn(async move {
            // Failures are logged and notified inside load_profile.
            let _ = store.load_profile(tag).await;
        }))
    }

    /// Drop identity and profile in a single snapshot.
    ///
    /// `signed_out_at` marks a confirmed sign-out: provider events numbered
    /// below it are stale from then on.
    fn clear_identity(&self, event_seq: Option<u64>, signed_out_at: Option<u64>) {
        let cleared = self.transition(|state| {
            if let Some(barrier) = signed_out_at {
                state.stale_before = state.stale_before.max(barrier);
            }
            if state.is_stale(event_seq) {
                return (None, false);
            }

            let current = &state.snapshot;
            if !current.auth_loading && current.identity.is_none() && current.profile.is_none() {
                return (None, false);
            }

            state.generation += 1;
            state.in_flight = None;
            (Some(SessionSnapshot::signed_out()), true)
        });

        if cleared {
            tracing::info!("Session cleared");
        }
    }

    // ─── Profile Fetch ───────────────────────────────────────────

    /// Re-read the profile for `uid`, which must be the current identity.
    ///
    /// Coalesces with a fetch that is already in flight for that identity.
    pub async fn fetch_profile(&self, uid: &str) -> Result<(), SessionError> {
        enum Start {
            Begin(FetchTag),
            Coalesced,
            NotCurrent,
        }

        let start = self.transition(|state| {
            if state.snapshot.uid() != Some(uid) {
                return (None, Start::NotCurrent);
            }
            if state.in_flight.as_ref().is_some_and(|tag| tag.uid == uid) {
                return (None, Start::Coalesced);
            }

            let tag = state.fetch_tag(uid);
            state.in_flight = Some(tag.clone());
            let next = SessionSnapshot {
                profile_loading: true,
                ..(*state.snapshot).clone()
            };
            (Some(next), Start::Begin(tag))
        });

        match start {
            Start::Begin(tag) => self.load_profile(tag).await,
            Start::Coalesced => {
                tracing::debug!(uid, "Profile fetch already in flight");
                Ok(())
            }
            Start::NotCurrent => {
                tracing::debug!(uid, "Refusing profile fetch for non-current identity");
                Err(self.report_failure("Failed to load profile", SessionError::Unauthenticated))
            }
        }
    }

    async fn load_profile(&self, tag: FetchTag) -> Result<(), SessionError> {
        let result = self.shared.profiles.read(&tag.uid).await;

        let applied = self.transition(|state| {
            if state.in_flight.as_ref() != Some(&tag) {
                return (None, false);
            }
            state.in_flight = None;

            let next = SessionSnapshot {
                profile: result.as_ref().ok().cloned().flatten(),
                profile_loading: false,
                ..(*state.snapshot).clone()
            };
            (Some(next), true)
        });

        if !applied {
            tracing::debug!(uid = %tag.uid, "Discarding stale profile fetch");
            return Ok(());
        }

        match result {
            Ok(profile) => {
                tracing::info!(
                    uid = %tag.uid,
                    found = profile.is_some(),
                    completed = profile.as_ref().is_some_and(ProfileRecord::is_completed),
                    "Profile loaded"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(uid = %tag.uid, error = %e, "Profile fetch failed");
                Err(self.report_failure("Failed to load profile", SessionError::ProfileFetchFailed))
            }
        }
    }

    // ─── Profile Save ────────────────────────────────────────────

    /// Create or update the current user's profile and mark it completed.
    ///
    /// The in-memory profile changes only after the write is confirmed.
    pub async fn save_profile(&self, input: ProfileInput) -> Result<ProfileRecord, SessionError> {
        let result = self.write_profile(input).await;
        self.report(result, "Profile completed successfully!", "Failed to save profile")
    }

    async fn write_profile(&self, input: ProfileInput) -> Result<ProfileRecord, SessionError> {
        let (identity, generation) = {
            let state = lock(&self.shared.state);
            let identity = state
                .snapshot
                .identity
                .clone()
                .ok_or(SessionError::Unauthenticated)?;
            (identity, state.generation)
        };

        input
            .validate()
            .map_err(|e| SessionError::InvalidProfile(e.to_string()))?;

        let uid = identity.uid.as_str();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let existing = self
            .shared
            .profiles
            .read(uid)
            .await
            .map_err(|e| write_failed(uid, e))?;

        let record = match existing {
            Some(record) => self.update_existing(uid, record, &input, &now).await?,
            None => {
                let record = ProfileRecord::from_input(&input, identity.email.clone(), &now);
                match self.shared.profiles.create(uid, &record).await {
                    Ok(()) => {
                        tracing::info!(uid, "Profile created");
                        record
                    }
                    Err(DbError::AlreadyExists(_)) => {
                        // Another writer created it first; update that document instead.
                        let base = self
                            .shared
                            .profiles
                            .read(uid)
                            .await
                            .and_then(|found| found.ok_or_else(|| DbError::NotFound(uid.to_string())))
                            .map_err(|e| write_failed(uid, e))?;
                        self.update_existing(uid, base, &input, &now).await?
                    }
                    Err(e) => return Err(write_failed(uid, e)),
                }
            }
        };

        match serde_json::to_value(&input) {
            Ok(value) => self.shared.cache.set(&profile_cache_key(uid), value),
            Err(e) => tracing::warn!(uid, error = %e, "Failed to cache profile locally"),
        }

        let applied = self.transition(|state| {
            if state.generation != generation {
                return (None, false);
            }
            // Supersedes any fetch still in flight.
            state.in_flight = None;
            let next = SessionSnapshot {
                profile: Some(record.clone()),
                profile_loading: false,
                ..(*state.snapshot).clone()
            };
            (Some(next), true)
        });

        if !applied {
            tracing::info!(uid, "Identity changed during profile save, not applied locally");
        }

        Ok(record)
    }

    async fn update_existing(
        &self,
        uid: &str,
        mut record: ProfileRecord,
        input: &ProfileInput,
        now: &str,
    ) -> Result<ProfileRecord, SessionError> {
        let patch = ProfilePatch::from_input(input, now);
        self.shared
            .profiles
            .update(uid, &patch)
            .await
            .map_err(|e| write_failed(uid, e))?;

        record.apply_patch(&patch);
        tracing::info!(uid, "Profile updated");
        Ok(record)
    }

    /// Remove the local convenience copy of the current user's profile.
    /// The authoritative record is untouched.
    pub fn forget_local_profile(&self) -> Result<(), SessionError> {
        let snapshot = self.snapshot();
        let Some(uid) = snapshot.uid() else {
            return Err(self.report_failure(
                "Failed to clear local profile data",
                SessionError::Unauthenticated,
            ));
        };

        self.shared.cache.remove(&profile_cache_key(uid));
        tracing::info!(uid, "Local profile copy cleared");
        self.shared
            .notifier
            .notify(Notification::info("Local profile data cleared"));
        Ok(())
    }

    // ─── Identity Operations ─────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let result = self
            .shared
            .identity
            .sign_in_with_credentials(email, password)
            .await;
        self.report(result, "Successfully logged in!", "Failed to log in")
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let result = self.shared.identity.create_identity(email, password).await;
        self.report(result, "Account created successfully!", "Failed to create account")
    }

    pub async fn federated_sign_in(
        &self,
        credential: FederatedCredential,
    ) -> Result<Identity, SessionError> {
        let result = self
            .shared
            .identity
            .sign_in_with_federated_provider(credential)
            .await;
        self.report(
            result,
            "Successfully signed in with Google!",
            "Failed to sign in with Google",
        )
    }

    /// Sign out, clearing identity and profile before anyone can observe a
    /// stale profile.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.shared.identity.sign_out().await;
        if result.is_ok() {
            let signed_out_at = self.shared.identity.last_event_seq();
            self.clear_identity(None, Some(signed_out_at));
        }
        self.report(result, "Successfully logged out!", "Failed to log out")
    }

    /// Change the signed-in user's display name.
    pub async fn update_display_name(&self, display_name: &str) -> Result<Identity, SessionError> {
        let result = self.rename(display_name.trim()).await;
        self.report(result, "Profile updated successfully!", "Failed to update profile")
    }

    async fn rename(&self, display_name: &str) -> Result<Identity, SessionError> {
        if !self.snapshot().is_signed_in() {
            return Err(SessionError::Unauthenticated);
        }
        if display_name.is_empty() {
            return Err(SessionError::InvalidProfile(
                "display name must not be blank".to_string(),
            ));
        }

        let updated = self.shared.identity.update_display_name(display_name).await?;

        self.transition(|state| {
            if state.snapshot.uid() != Some(updated.uid.as_str()) {
                return (None, ());
            }
            let next = SessionSnapshot {
                identity: Some(updated.clone()),
                ..(*state.snapshot).clone()
            };
            (Some(next), ())
        });

        Ok(updated)
    }

    // ─── Reporting ───────────────────────────────────────────────

    /// Notify the outcome of a user-initiated operation and hand it back.
    fn report<T>(
        &self,
        result: Result<T, SessionError>,
        success: &str,
        failure: &str,
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => {
                self.shared.notifier.notify(Notification::success(success));
                Ok(value)
            }
            Err(err) => Err(self.report_failure(failure, err)),
        }
    }

    fn report_failure(&self, action: &str, err: SessionError) -> SessionError {
        tracing::warn!(code = err.code(), error = %err, "{}", action);
        self.shared.notifier.notify(Notification::error(format!(
            "{}: {}",
            action,
            err.user_message()
        )));
        err
    }
}

fn write_failed(uid: &str, err: DbError) -> SessionError {
    tracing::warn!(uid, error = %err, "Profile write failed");
    SessionError::ProfileWriteFailed
}
