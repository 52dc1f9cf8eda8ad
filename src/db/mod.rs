// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore and in-memory profile stores).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryProfileStore;

use crate::models::{ProfilePatch, ProfileRecord};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// Onboarding profiles (keyed by identity uid)
    pub const USERS: &str = "users";
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database not connected (offline mode)")]
    Offline,

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Authoritative store of onboarding profiles.
///
/// Exposes only the create and update primitives; create-or-update is
/// composed by the session store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read the profile for a user, `None` if it was never written.
    async fn read(&self, uid: &str) -> Result<Option<ProfileRecord>, DbError>;

    /// Create the profile. Fails with `AlreadyExists` if one is present.
    async fn create(&self, uid: &str, record: &ProfileRecord) -> Result<(), DbError>;

    /// Apply a partial update to an existing profile.
    async fn update(&self, uid: &str, patch: &ProfilePatch) -> Result<(), DbError>;
}
