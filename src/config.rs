// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PROJECT_ID: &str = "fitness-soul";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_LOCAL_CACHE_PATH: &str = ".fitness-soul/cache.json";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase Web API key used for Identity Toolkit calls
    pub firebase_api_key: String,
    /// GCP project holding the Firestore `users` collection
    pub gcp_project_id: String,
    /// Server port (bound on localhost only)
    pub port: u16,
    /// UI shell origin, allowed by CORS and used as the federated sign-in request URI
    pub frontend_url: String,
    /// File backing the local profile cache
    pub local_cache_path: PathBuf,
    /// `host:port` of the Firebase Auth emulator, if any
    pub auth_emulator_host: Option<String>,
    /// `host:port` of the Firestore emulator, if any
    pub firestore_emulator_host: Option<String>,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .unwrap_or_else(|_| DEFAULT_PROJECT_ID.to_string()),
            port,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
            local_cache_path: env::var("LOCAL_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOCAL_CACHE_PATH)),
            auth_emulator_host: non_empty_var("FIREBASE_AUTH_EMULATOR_HOST"),
            firestore_emulator_host: non_empty_var("FIRESTORE_EMULATOR_HOST"),
        })
    }

    /// Config for tests. Points at no emulators.
    pub fn test_default() -> Self {
        Self {
            firebase_api_key: "test-api-key".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            local_cache_path: env::temp_dir().join("fitness-soul-test-cache.json"),
            auth_emulator_host: None,
            firestore_emulator_host: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
