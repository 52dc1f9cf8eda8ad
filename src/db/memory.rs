// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process profile store used by tests.

use crate::db::{DbError, ProfileStore};
use crate::models::{ProfilePatch, ProfileRecord};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Profile store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryProfileStore {
    documents: DashMap<String, ProfileRecord>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profile documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Seed a document directly, bypassing create semantics.
    pub fn insert(&self, uid: impl Into<String>, record: ProfileRecord) {
        self.documents.insert(uid.into(), record);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn read(&self, uid: &str) -> Result<Option<ProfileRecord>, DbError> {
        Ok(self.documents.get(uid).map(|doc| doc.value().clone()))
    }

    async fn create(&self, uid: &str, record: &ProfileRecord) -> Result<(), DbError> {
        match self.documents.entry(uid.to_string()) {
            Entry::Occupied(_) => Err(DbError::AlreadyExists(uid.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, uid: &str, patch: &ProfilePatch) -> Result<(), DbError> {
        let mut doc = self
            .documents
            .get_mut(uid)
            .ok_or_else(|| DbError::NotFound(uid.to_string()))?;
        doc.apply_patch(patch);
        Ok(())
    }
}
