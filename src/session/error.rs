// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session error taxonomy.
//!
//! Identity provider and profile store failures are mapped onto a fixed set
//! of variants at the session store boundary. Each variant has a stable
//! machine-readable code and a fixed user-facing message.

/// Errors returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account already exists")]
    AccountExists,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Credential too weak")]
    WeakCredential,

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Rate limited")]
    RateLimited,

    #[error("Federated sign-in dismissed")]
    PopupDismissed,

    #[error("Profile fetch failed")]
    ProfileFetchFailed,

    #[error("Profile write failed")]
    ProfileWriteFailed,

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// Anything the table does not know. Keeps the provider's code for diagnostics.
    #[error("Identity provider error: {code}")]
    Unknown { code: String },
}

impl SessionError {
    /// Map a provider error code to the taxonomy.
    ///
    /// Accepts both Identity Toolkit REST codes (`EMAIL_EXISTS`, optionally
    /// followed by ` : detail`) and web SDK codes (`auth/email-already-in-use`).
    pub fn from_provider_code(raw: &str) -> Self {
        let code = raw
            .split(" : ")
            .next()
            .unwrap_or(raw)
            .trim();

        match code {
            "EMAIL_NOT_FOUND"
            | "INVALID_PASSWORD"
            | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL"
            | "MISSING_PASSWORD"
            | "INVALID_IDP_RESPONSE"
            | "auth/invalid-credential"
            | "auth/invalid-email"
            | "auth/user-not-found"
            | "auth/wrong-password" => Self::InvalidCredentials,

            "EMAIL_EXISTS"
            | "FEDERATED_USER_ID_ALREADY_LINKED"
            | "auth/email-already-in-use"
            | "auth/account-exists-with-different-credential" => Self::AccountExists,

            "USER_DISABLED" | "auth/user-disabled" => Self::AccountDisabled,

            "WEAK_PASSWORD" | "auth/weak-password" => Self::WeakCredential,

            "auth/network-request-failed" => Self::NetworkUnavailable,

            "TOO_MANY_ATTEMPTS_TRY_LATER" | "QUOTA_EXCEEDED" | "auth/too-many-requests" => {
                Self::RateLimited
            }

            "auth/popup-closed-by-user" | "auth/cancelled-popup-request" => Self::PopupDismissed,

            _ => Self::Unknown {
                code: code.to_string(),
            },
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountExists => "account_exists",
            Self::AccountDisabled => "account_disabled",
            Self::WeakCredential => "weak_credential",
            Self::NetworkUnavailable => "network_unavailable",
            Self::RateLimited => "rate_limited",
            Self::PopupDismissed => "popup_dismissed",
            Self::ProfileFetchFailed => "profile_fetch_failed",
            Self::ProfileWriteFailed => "profile_write_failed",
            Self::InvalidProfile(_) => "invalid_profile",
            Self::Unknown { code } => code,
        }
    }

    /// Message shown to the user in a notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Please sign in to continue.",
            Self::InvalidCredentials => "Invalid email or password.",
            Self::AccountExists => "An account with this email already exists.",
            Self::AccountDisabled => "This account has been disabled.",
            Self::WeakCredential => "Password should be at least 6 characters.",
            Self::NetworkUnavailable => "Network unavailable. Check your connection and try again.",
            Self::RateLimited => "Too many attempts. Please try again later.",
            Self::PopupDismissed => "Sign-in was cancelled.",
            Self::ProfileFetchFailed => "Could not load your profile.",
            Self::ProfileWriteFailed => "Failed to save profile. Please try again.",
            Self::InvalidProfile(_) => "Please fill out all required fields.",
            Self::Unknown { .. } => "Something went wrong. Please try again.",
        }
    }
}
