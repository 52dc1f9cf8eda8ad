// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed profile operations.

use crate::db::{collections, DbError, ProfileStore};
use crate::models::{ProfilePatch, ProfileRecord};
use async_trait::async_trait;
use firestore::errors::FirestoreError;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// With `emulator_host` set (from FIRESTORE_EMULATOR_HOST), connects to the
    /// emulator without credentials.
    pub async fn new(project_id: &str, emulator_host: Option<&str>) -> Result<Self, DbError> {
        if emulator_host.is_some() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| DbError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, DbError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| DbError::Database(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. Every operation returns `DbError::Offline`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, DbError> {
        self.client.as_ref().ok_or(DbError::Offline)
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    async fn read(&self, uid: &str) -> Result<Option<ProfileRecord>, DbError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn create(&self, uid: &str, record: &ProfileRecord) -> Result<(), DbError> {
        let _: ProfileRecord = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(uid)
            .object(record)
            .execute()
            .await
            .map_err(|e| match e {
                FirestoreError::DataConflictError(_) => DbError::AlreadyExists(uid.to_string()),
                other => DbError::Database(other.to_string()),
            })?;

        tracing::debug!(uid, "Profile document created");
        Ok(())
    }

    async fn update(&self, uid: &str, patch: &ProfilePatch) -> Result<(), DbError> {
        let mask: Vec<String> = ProfilePatch::FIELD_PATHS
            .iter()
            .map(|path| path.to_string())
            .collect();

        let _: ProfileRecord = self
            .get_client()?
            .fluent()
            .update()
            .fields(mask)
            .in_col(collections::USERS)
            .document_id(uid)
            .object(patch)
            .execute()
            .await
            .map_err(|e| DbError::Database(e.to_string()))?;

        tracing::debug!(uid, "Profile document updated");
        Ok(())
    }
}
