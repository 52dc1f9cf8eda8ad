// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider: sign-in, sign-up, federated sign-in and sign-out.
//!
//! Handles:
//! - Email/password accounts via the Identity Toolkit REST API
//! - Google sign-in by exchanging a provider ID token (`signInWithIdp`)
//! - Display name updates
//! - Fan-out of sign-in state changes to subscribers

use crate::config::Config;
use crate::models::Identity;
use crate::session::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

const IDENTITY_TOOLKIT_HOST: &str = "identitytoolkit.googleapis.com";
const IDENTITY_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FEDERATED_PROVIDER: &str = "google.com";

/// One sign-in state change, numbered in publication order.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityEvent {
    pub seq: u64,
    pub identity: Option<Identity>,
}

/// Stream of sign-in state changes. The current state is always delivered first.
pub type IdentityEvents = mpsc::UnboundedReceiver<IdentityEvent>;

/// Credential returned by a federated provider's sign-in popup.
///
/// `id_token` is absent when the user closed the popup without signing in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederatedCredential {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
}

fn default_provider_id() -> String {
    DEFAULT_FEDERATED_PROVIDER.to_string()
}

impl FederatedCredential {
    pub fn google(id_token: impl Into<String>) -> Self {
        Self {
            id_token: Some(id_token.into()),
            provider_id: default_provider_id(),
        }
    }

    pub fn dismissed() -> Self {
        Self {
            id_token: None,
            provider_id: default_provider_id(),
        }
    }
}

/// External identity provider consumed by the session store.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to sign-in state changes.
    fn subscribe(&self) -> IdentityEvents;

    /// Sequence number of the most recently published event.
    fn last_event_seq(&self) -> u64;

    async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, SessionError>;

    async fn sign_in_with_federated_provider(
        &self,
        credential: FederatedCredential,
    ) -> Result<Identity, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;

    async fn create_identity(&self, email: &str, password: &str)
        -> Result<Identity, SessionError>;

    /// Change the display name of the signed-in user.
    async fn update_display_name(&self, display_name: &str) -> Result<Identity, SessionError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityEventHub - subscriber fan-out shared by provider implementations
// ─────────────────────────────────────────────────────────────────────────────

struct HubState {
    current: Option<Identity>,
    seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

impl HubState {
    fn event(&self) -> IdentityEvent {
        IdentityEvent {
            seq: self.seq,
            identity: self.current.clone(),
        }
    }
}

/// Tracks the current identity and pushes every transition to subscribers.
pub struct IdentityEventHub {
    state: Mutex<HubState>,
}

impl Default for IdentityEventHub {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityEventHub {
    pub fn new(initial: Option<Identity>) -> Self {
        Self {
            state: Mutex::new(HubState {
                current: initial,
                seq: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> IdentityEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(state.event());
        state.subscribers.push(tx);
        rx
    }

    /// Record a transition and deliver it. Closed subscribers are dropped.
    pub fn publish(&self, identity: Option<Identity>) {
        let mut state = self.lock();
        state.current = identity;
        state.seq += 1;
        let event = state.event();
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    pub fn last_seq(&self) -> u64 {
        self.lock().seq
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FirebaseIdentityProvider - Identity Toolkit REST client
// ─────────────────────────────────────────────────────────────────────────────

/// Signed-in provider session (kept in memory only).
#[derive(Clone)]
struct ProviderSession {
    identity: Identity,
    id_token: String,
}

/// Account response shared by the sign-in, sign-up and update endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

impl AccountResponse {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone().filter(|e| !e.is_empty()),
            display_name: self.display_name.clone().filter(|n| !n.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

/// Identity provider backed by Firebase Authentication.
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    request_uri: String,
    session: Mutex<Option<ProviderSession>>,
    hub: IdentityEventHub,
}

impl FirebaseIdentityProvider {
    /// Create a provider from configuration.
    ///
    /// With `FIREBASE_AUTH_EMULATOR_HOST` set, requests go to the emulator.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(IDENTITY_HTTP_TIMEOUT)
            .build()?;

        let base_url = match &config.auth_emulator_host {
            Some(host) => format!("http://{}/{}/v1", host, IDENTITY_TOOLKIT_HOST),
            None => format!("https://{}/v1", IDENTITY_TOOLKIT_HOST),
        };

        tracing::info!(base_url = %base_url, "Initialized identity provider");

        Ok(Self {
            http,
            base_url,
            api_key: config.firebase_api_key.clone(),
            request_uri: config.frontend_url.clone(),
            session: Mutex::new(None),
            hub: IdentityEventHub::default(),
        })
    }

    fn current_session(&self) -> Option<ProviderSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace_session(&self, session: Option<ProviderSession>) {
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    /// Store the new session and announce the sign-in.
    fn begin_session(&self, account: AccountResponse) -> Result<Identity, SessionError> {
        let identity = account.identity();
        let id_token = account.id_token.ok_or_else(|| SessionError::Unknown {
            code: "MISSING_ID_TOKEN".to_string(),
        })?;

        self.replace_session(Some(ProviderSession {
            identity: identity.clone(),
            id_token,
        }));
        self.hub.publish(Some(identity.clone()));

        tracing::info!(uid = %identity.uid, "Identity signed in");
        Ok(identity)
    }

    /// POST to an `accounts:*` endpoint and parse the JSON body.
    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, SessionError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint, error = %e, "Identity provider unreachable");
                SessionError::NetworkUnavailable
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!(endpoint, "Identity provider rate limit hit (429)");
                return Err(SessionError::RateLimited);
            }

            let code = parse_error_code(&body).unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
            tracing::debug!(endpoint, status = %status, code = %code, "Identity provider rejected request");
            return Err(SessionError::from_provider_code(&code));
        }

        response.json().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "Malformed identity provider response");
            SessionError::Unknown {
                code: "MALFORMED_RESPONSE".to_string(),
            }
        })
    }
}

/// Extract the provider error code from an Identity Toolkit error body.
fn parse_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
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
        let account: AccountResponse = self
            .post(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        self.begin_session(account)
    }

    async fn sign_in_with_federated_provider(
        &self,
        credential: FederatedCredential,
    ) -> Result<Identity, SessionError> {
        let id_token = credential.id_token.ok_or(SessionError::PopupDismissed)?;

        let request = IdpRequest {
            post_body: format!(
                "id_token={}&providerId={}",
                urlencoding::encode(&id_token),
                urlencoding::encode(&credential.provider_id)
            ),
            request_uri: self.request_uri.clone(),
            return_secure_token: true,
            return_idp_credential: true,
        };

        let account: AccountResponse = self.post("signInWithIdp", &request).await?;
        self.begin_session(account)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        // REST sessions are bearer tokens held in memory; dropping them signs out.
        let previous = self.current_session();
        self.replace_session(None);
        self.hub.publish(None);

        if let Some(session) = previous {
            tracing::info!(uid = %session.identity.uid, "Identity signed out");
        }
        Ok(())
    }

    async fn create_identity(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, SessionError> {
        let account: AccountResponse = self
            .post(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        self.begin_session(account)
    }

    async fn update_display_name(&self, display_name: &str) -> Result<Identity, SessionError> {
        let session = self.current_session().ok_or(SessionError::Unauthenticated)?;

        let account: AccountResponse = self
            .post(
                "update",
                &UpdateRequest {
                    id_token: &session.id_token,
                    display_name,
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = Identity {
            display_name: Some(display_name.to_string()),
            ..account.identity()
        };

        self.replace_session(Some(ProviderSession {
            identity: identity.clone(),
            id_token: account.id_token.unwrap_or(session.id_token),
        }));

        Ok(identity)
    }
}
