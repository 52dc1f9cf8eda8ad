// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - collaborators of the session store.

pub mod identity;
pub mod local_cache;
pub mod notifier;

pub use identity::{
    FederatedCredential, FirebaseIdentityProvider, IdentityEvent, IdentityEventHub,
    IdentityEvents, IdentityProvider,
};
pub use local_cache::{JsonFileCache, LocalCache, MemoryLocalCache};
pub use notifier::{BroadcastNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier};
