// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session store tests.
//!
//! These tests verify that:
//! 1. Identity and loading state are published atomically
//! 2. Profile fetches are coalesced and stale results are dropped
//! 3. Saves never duplicate a record and only complete profiles
//! 4. Every failure produces exactly one error notification

use fitness_soul::db::ProfileStore;
use fitness_soul::gate::is_profile_completed;
use fitness_soul::models::Identity;
use fitness_soul::services::local_cache::{profile_cache_key, LocalCache};
use fitness_soul::services::{FederatedCredential, NotificationLevel};
use fitness_soul::session::{SessionError, SessionSnapshot};
use std::sync::{Arc, Mutex};

mod common;
use common::{completed_record, harness, sample_input, sign_in, wait_for, FakeIdentityProvider};

/// Collect every snapshot published to a subscriber.
fn record_snapshots(
    store: &fitness_soul::session::SessionStore,
) -> (
    Arc<Mutex<Vec<SessionSnapshot>>>,
    fitness_soul::session::Subscription,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = store.subscribe(move |snapshot| {
        sink.lock().unwrap().push(snapshot.as_ref().clone());
    });
    (seen, subscription)
}

// ═══════════════════════════════════════════════════════════════════════════
// IDENTITY CHANGES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_starts_auth_loading() {
    let h = harness(FakeIdentityProvider::new());

    let snapshot = h.store.snapshot();
    assert!(snapshot.auth_loading);
    assert!(!snapshot.is_signed_in());
}

#[tokio::test]
async fn test_identity_published_with_profile_loading() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.inner.insert("u1", completed_record());
    let (seen, _sub) = record_snapshots(&h.store);

    let fetch = h
        .store
        .on_identity_changed(Some(Identity::new("u1")))
        .expect("new identity starts a fetch");
    fetch.await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);

    // No snapshot ever shows an identity without either a profile or a pending fetch
    assert_eq!(seen[0].uid(), Some("u1"));
    assert!(seen[0].profile_loading);
    assert!(!seen[0].auth_loading);

    assert!(!seen[1].profile_loading);
    assert!(is_profile_completed(&seen[1]));
}

#[tokio::test]
async fn test_absent_identity_clears_in_one_snapshot() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.inner.insert("u1", completed_record());
    sign_in(&h, Identity::new("u1")).await;

    let (seen, _sub) = record_snapshots(&h.store);
    assert!(h.store.on_identity_changed(None).is_none());
    assert!(h.store.on_identity_changed(None).is_none());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "redundant sign-out publishes nothing");
    assert_eq!(seen[0], SessionSnapshot::signed_out());
}

#[tokio::test]
async fn test_first_absent_notification_ends_auth_loading() {
    let h = harness(FakeIdentityProvider::new());

    h.store.on_identity_changed(None);

    assert_eq!(*h.store.snapshot(), SessionSnapshot::signed_out());
    assert_eq!(h.profiles.reads_started(), 0);
}

#[tokio::test]
async fn test_repeated_identity_coalesces_fetch() {
    let h = harness(FakeIdentityProvider::new());
    let hold = h.profiles.hold_reads().await;

    let fetch = h.store.on_identity_changed(Some(Identity::new("u1")));
    assert!(fetch.is_some());
    assert!(h.store.on_identity_changed(Some(Identity::new("u1"))).is_none());

    h.profiles.wait_for_reads(1).await;
    // An explicit fetch while one is in flight joins it
    assert_eq!(h.store.fetch_profile("u1").await, Ok(()));

    drop(hold);
    fetch.unwrap().await.unwrap();

    assert_eq!(h.profiles.reads_started(), 1);
    assert!(!h.store.snapshot().profile_loading);
}

#[tokio::test]
async fn test_same_identity_with_new_details_republishes_without_fetch() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    let renamed = Identity::new("u1").with_display_name("Sam");
    assert!(h.store.on_identity_changed(Some(renamed.clone())).is_none());

    assert_eq!(h.store.snapshot().identity, Some(renamed));
    assert_eq!(h.profiles.reads_started(), 1);
}

#[tokio::test]
async fn test_stale_fetch_after_sign_out_discarded() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.inner.insert("u1", completed_record());
    let hold = h.profiles.hold_reads().await;

    let first = h.store.on_identity_changed(Some(Identity::new("u1"))).unwrap();
    h.profiles.wait_for_reads(1).await;
    h.store.on_identity_changed(None);
    let second = h.store.on_identity_changed(Some(Identity::new("u2"))).unwrap();

    drop(hold);
    first.await.unwrap();
    second.await.unwrap();

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.uid(), Some("u2"));
    assert_eq!(snapshot.profile, None, "u1's profile must never reach u2");
    assert!(!snapshot.profile_loading);
}

#[tokio::test]
async fn test_account_switch_discards_previous_fetch() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.inner.insert("u1", completed_record());
    let hold = h.profiles.hold_reads().await;

    let first = h.store.on_identity_changed(Some(Identity::new("u1"))).unwrap();
    let second = h.store.on_identity_changed(Some(Identity::new("u2"))).unwrap();

    drop(hold);
    first.await.unwrap();
    second.await.unwrap();

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.uid(), Some("u2"));
    assert!(!is_profile_completed(&snapshot));
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE FETCH
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_fetch_failure_notifies_once() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.fail_reads(true);

    sign_in(&h, Identity::new("u1")).await;

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.profile, None);
    assert!(!snapshot.profile_loading);

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Failed to load profile"));

    // No automatic retry; an explicit fetch reports again
    assert_eq!(
        h.store.fetch_profile("u1").await,
        Err(SessionError::ProfileFetchFailed)
    );
    assert_eq!(h.notifier.errors().len(), 2);
    assert_eq!(h.profiles.reads_started(), 2);
}

#[tokio::test]
async fn test_fetch_for_other_identity_rejected() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    assert_eq!(
        h.store.fetch_profile("someone-else").await,
        Err(SessionError::Unauthenticated)
    );
    assert_eq!(h.profiles.reads_started(), 1);

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Failed to load profile"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE SAVE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_save_requires_identity() {
    let h = harness(FakeIdentityProvider::new());
    h.store.on_identity_changed(None);

    let result = h.store.save_profile(sample_input()).await;

    assert_eq!(result, Err(SessionError::Unauthenticated));
    assert!(h.profiles.inner.is_empty());
    assert_eq!(h.notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_save_creates_record_and_completes_gate() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1").with_email("a@example.com")).await;
    assert!(!is_profile_completed(&h.store.snapshot()));

    let record = h.store.save_profile(sample_input()).await.unwrap();

    assert!(record.profile_completed);
    assert_eq!(record.name.as_deref(), Some("A"));
    assert_eq!(record.email.as_deref(), Some("a@example.com"));
    assert!(is_profile_completed(&h.store.snapshot()));
    assert_eq!(h.profiles.creates(), 1);

    let all = h.notifier.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].level, NotificationLevel::Success);
    assert_eq!(all[0].message, "Profile completed successfully!");
}

#[tokio::test]
async fn test_repeated_save_never_duplicates() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    let first = h.store.save_profile(sample_input()).await.unwrap();
    let mut changed = sample_input();
    changed.weight = 58.5;
    let second = h.store.save_profile(changed).await.unwrap();

    assert_eq!(h.profiles.inner.len(), 1);
    assert_eq!(h.profiles.creates(), 1);
    assert_eq!(h.profiles.updates(), 1);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.weight, Some(58.5));
    assert!(second.profile_completed);
}

#[tokio::test]
async fn test_save_then_fetch_round_trip() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    let saved = h.store.save_profile(sample_input()).await.unwrap();
    h.store.fetch_profile("u1").await.unwrap();

    assert_eq!(h.store.snapshot().profile.as_ref(), Some(&saved));
    assert_eq!(h.profiles.inner.read("u1").await.unwrap(), Some(saved));
}

#[tokio::test]
async fn test_invalid_profile_not_written() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    let mut input = sample_input();
    input.age = 5;
    let result = h.store.save_profile(input).await;

    assert!(matches!(result, Err(SessionError::InvalidProfile(_))));
    assert!(h.profiles.inner.is_empty());
    assert!(!is_profile_completed(&h.store.snapshot()));
    assert_eq!(h.notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_write_failure_leaves_profile_untouched() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;
    h.profiles.fail_writes(true);

    let result = h.store.save_profile(sample_input()).await;

    assert_eq!(result, Err(SessionError::ProfileWriteFailed));
    assert_eq!(h.store.snapshot().profile, None);
    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Failed to save profile"));
}

#[tokio::test]
async fn test_save_not_applied_after_identity_change() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    let hold = h.profiles.hold_reads().await;
    let store = h.store.clone();
    let save = tokio::spawn(async move { store.save_profile(sample_input()).await });
    h.profiles.wait_for_reads(2).await;

    h.store.on_identity_changed(None);
    drop(hold);

    let record = save.await.unwrap().unwrap();
    assert!(record.profile_completed);
    assert_eq!(h.store.snapshot().profile, None);
    assert!(h.profiles.inner.read("u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_save_writes_through_local_cache() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;

    h.store.save_profile(sample_input()).await.unwrap();

    let cached = h.cache.get(&profile_cache_key("u1")).expect("cached copy");
    assert_eq!(cached["name"], "A");
    assert_eq!(cached["goal"], "lose_weight");

    h.store.forget_local_profile().unwrap();
    assert_eq!(h.cache.get(&profile_cache_key("u1")), None);
    // The authoritative record is untouched
    assert_eq!(h.profiles.inner.len(), 1);
    assert!(is_profile_completed(&h.store.snapshot()));
}

#[tokio::test]
async fn test_forget_local_profile_requires_identity() {
    let h = harness(FakeIdentityProvider::new());
    h.store.on_identity_changed(None);

    assert_eq!(
        h.store.forget_local_profile(),
        Err(SessionError::Unauthenticated)
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// IDENTITY OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_login_flows_through_provider_subscription() {
    let h = harness(FakeIdentityProvider::new().with_account("a@example.com", "secret1", "u1"));
    h.profiles.inner.insert("u1", completed_record());
    let _listener = h.store.spawn_identity_listener();

    wait_for(&h.store, |s| !s.auth_loading).await;
    let identity = h.store.login("a@example.com", "secret1").await.unwrap();
    assert_eq!(identity.uid, "u1");

    let snapshot = wait_for(&h.store, |s| s.is_signed_in() && !s.profile_loading).await;
    assert!(is_profile_completed(&snapshot));
    assert_eq!(h.notifier.all()[0].message, "Successfully logged in!");
}

#[tokio::test]
async fn test_login_failure_notifies_once() {
    let h = harness(FakeIdentityProvider::new().with_account("a@example.com", "secret1", "u1"));

    let result = h.store.login("a@example.com", "wrong").await;

    assert_eq!(result, Err(SessionError::InvalidCredentials));
    let all = h.notifier.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].message, "Failed to log in: Invalid email or password.");
}

#[tokio::test]
async fn test_signup_errors_mapped() {
    let h = harness(FakeIdentityProvider::new().with_account("a@example.com", "secret1", "u1"));

    assert_eq!(
        h.store.signup("a@example.com", "another1").await,
        Err(SessionError::AccountExists)
    );
    assert_eq!(
        h.store.signup("b@example.com", "123").await,
        Err(SessionError::WeakCredential)
    );

    let created = h.store.signup("b@example.com", "secret2").await.unwrap();
    assert_eq!(created.email.as_deref(), Some("b@example.com"));

    let messages: Vec<String> = h.notifier.all().into_iter().map(|n| n.message).collect();
    assert_eq!(
        messages,
        vec![
            "Failed to create account: An account with this email already exists.",
            "Failed to create account: Password should be at least 6 characters.",
            "Account created successfully!",
        ]
    );
}

#[tokio::test]
async fn test_federated_popup_dismissed() {
    let h = harness(FakeIdentityProvider::new());

    let result = h
        .store
        .federated_sign_in(FederatedCredential::dismissed())
        .await;

    assert_eq!(result, Err(SessionError::PopupDismissed));
    assert_eq!(h.notifier.errors().len(), 1);

    let identity = h
        .store
        .federated_sign_in(FederatedCredential::google("tok"))
        .await
        .unwrap();
    assert_eq!(identity.uid, "google-tok");
}

#[tokio::test]
async fn test_sign_out_clears_before_returning() {
    let h = harness(FakeIdentityProvider::new());
    h.profiles.inner.insert("u1", completed_record());
    sign_in(&h, Identity::new("u1")).await;
    assert!(is_profile_completed(&h.store.snapshot()));

    h.store.sign_out().await.unwrap();

    assert_eq!(*h.store.snapshot(), SessionSnapshot::signed_out());
    assert_eq!(h.notifier.all()[0].message, "Successfully logged out!");
}

#[tokio::test]
async fn test_sign_out_right_after_login_stays_signed_out() {
    let h = harness(FakeIdentityProvider::new().with_account("a@example.com", "secret1", "u1"));
    h.profiles.inner.insert("u1", completed_record());
    let _listener = h.store.spawn_identity_listener();
    wait_for(&h.store, |s| !s.auth_loading).await;

    // The listener has not seen the sign-in event yet when sign-out completes
    h.store.login("a@example.com", "secret1").await.unwrap();
    h.store.sign_out().await.unwrap();
    let (seen, _sub) = record_snapshots(&h.store);

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert!(seen.lock().unwrap().iter().all(|s| !s.is_signed_in()));
    assert_eq!(*h.store.snapshot(), SessionSnapshot::signed_out());
    assert_eq!(h.profiles.reads_started(), 0);

    // A later sign-in is still honoured
    h.store.login("a@example.com", "secret1").await.unwrap();
    let snapshot = wait_for(&h.store, |s| s.is_signed_in() && !s.profile_loading).await;
    assert_eq!(snapshot.uid(), Some("u1"));
}

#[tokio::test]
async fn test_sign_out_failure_keeps_session() {
    let h = harness(FakeIdentityProvider::new());
    sign_in(&h, Identity::new("u1")).await;
    h.identity.fail_next(SessionError::NetworkUnavailable);

    assert_eq!(
        h.store.sign_out().await,
        Err(SessionError::NetworkUnavailable)
    );
    assert!(h.store.snapshot().is_signed_in());
    assert_eq!(h.notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_update_display_name() {
    let h = harness(FakeIdentityProvider::signed_in(Identity::new("u1")));
    sign_in(&h, Identity::new("u1")).await;

    let updated = h.store.update_display_name("  Sam ").await.unwrap();

    assert_eq!(updated.display_name.as_deref(), Some("Sam"));
    assert_eq!(h.store.snapshot().identity, Some(updated));
    assert_eq!(h.notifier.all()[0].message, "Profile updated successfully!");
}

#[tokio::test]
async fn test_update_display_name_requires_identity() {
    let h = harness(FakeIdentityProvider::new());
    h.store.on_identity_changed(None);

    assert_eq!(
        h.store.update_display_name("Sam").await,
        Err(SessionError::Unauthenticated)
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// SUBSCRIPTIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_dropped_subscription_stops_delivery() {
    let h = harness(FakeIdentityProvider::new());
    let (seen, subscription) = record_snapshots(&h.store);

    h.store.on_identity_changed(None);
    subscription.unsubscribe();
    sign_in(&h, Identity::new("u1")).await;

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_observer_may_subscribe_during_delivery() {
    let h = harness(FakeIdentityProvider::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let nested = Arc::new(Mutex::new(Vec::new()));

    let store = h.store.clone();
    let (outer_sink, keep) = (seen.clone(), nested.clone());
    let _outer = h.store.subscribe(move |snapshot| {
        outer_sink.lock().unwrap().push(("outer", snapshot.uid().map(str::to_string)));
        let inner_sink = outer_sink.clone();
        let sub = store.observe(move |snapshot| {
            inner_sink
                .lock()
                .unwrap()
                .push(("inner", snapshot.uid().map(str::to_string)));
        });
        keep.lock().unwrap().push(sub);
    });

    h.store.on_identity_changed(None);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("outer", None), ("inner", None)]
    );
}

#[tokio::test]
async fn test_observe_delivers_current_snapshot_first() {
    let h = harness(FakeIdentityProvider::new());
    h.store.on_identity_changed(None);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = h.store.observe(move |snapshot| {
        sink.lock().unwrap().push(snapshot.auth_loading);
    });

    assert_eq!(*seen.lock().unwrap(), vec![false]);
}
