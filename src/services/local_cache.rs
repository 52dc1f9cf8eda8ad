// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort local key-value cache.
//!
//! Holds a convenience copy of the last submitted onboarding answers. It is
//! never authoritative and never consulted for admission decisions. Failures
//! are logged and swallowed.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Key prefix for cached profile copies.
pub const PROFILE_CACHE_KEY: &str = "fitnessUserProfile";

/// Cache key for a user's profile copy.
pub fn profile_cache_key(uid: &str) -> String {
    format!("{}:{}", PROFILE_CACHE_KEY, uid)
}

/// Scoped key-value store.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn remove(&self, key: &str);
}

/// Cache that lives only as long as the process.
#[derive(Default)]
pub struct MemoryLocalCache {
    entries: DashMap<String, Value>,
}

impl MemoryLocalCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryLocalCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Cache persisted as a single JSON object on disk.
///
/// Reads are served from memory. Each change rewrites the file; on a tokio
/// runtime the write runs on the blocking pool.
pub struct JsonFileCache {
    entries: Mutex<Map<String, Value>>,
    writer: Arc<FileWriter>,
}

/// Writes numbered versions of the cache file, never replacing a newer one.
struct FileWriter {
    path: PathBuf,
    next_version: AtomicU64,
    written: Mutex<u64>,
}

impl FileWriter {
    fn write(&self, version: u64, bytes: &[u8]) {
        let mut written = self
            .written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *written >= version {
            return;
        }
        *written = version;

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create cache directory");
                return;
            }
        }

        if let Err(e) = std::fs::write(&self.path, bytes) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write local cache");
        }
    }
}

impl JsonFileCache {
    /// Open (or lazily create) the cache file. An unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt local cache");
                Map::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Local cache unreadable");
                Map::new()
            }
        };

        Self {
            entries: Mutex::new(entries),
            writer: Arc::new(FileWriter {
                path,
                next_version: AtomicU64::new(1),
                written: Mutex::new(0),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    /// Called with the entries lock held, so versions follow change order.
    fn persist(&self, entries: &Map<String, Value>) {
        let bytes = match serde_json::to_vec_pretty(entries) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %self.path().display(), error = %e, "Failed to encode local cache");
                return;
            }
        };
        let version = self.writer.next_version.fetch_add(1, Ordering::Relaxed);
        let writer = self.writer.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || writer.write(version, &bytes));
            }
            Err(_) => writer.write(version, &bytes),
        }
    }
}

impl LocalCache for JsonFileCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value);
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}
