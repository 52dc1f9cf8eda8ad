// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route admission control.
//!
//! Decides, for a navigation target and a session snapshot, whether the UI
//! may render the route, must wait, or must redirect. Decisions are a pure
//! function of the snapshot; mounted routes re-evaluate on every published
//! snapshot.

use crate::gate::is_profile_completed;
use crate::session::{SessionSnapshot, SessionStore, Subscription};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub const LANDING_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/auth";
pub const PROFILE_COMPLETION_PATH: &str = "/profile";
pub const PROTECTED_HOME_PATH: &str = "/dashboard";

/// Dashboard tab addressed by `/dashboard/{tab}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardTab {
    Home,
    Exercise,
    Diet,
    Compete,
    Unknown(String),
}

impl DashboardTab {
    fn parse(segment: &str) -> Self {
        match segment {
            "" | "home" => Self::Home,
            "exercise" => Self::Exercise,
            "diet" => Self::Diet,
            "compete" => Self::Compete,
            other => Self::Unknown(other.to_string()),
        }
    }

    fn segment(&self) -> Option<&str> {
        match self {
            Self::Home => None,
            Self::Exercise => Some("exercise"),
            Self::Diet => Some("diet"),
            Self::Compete => Some("compete"),
            Self::Unknown(name) => Some(name),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// A navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    /// Sign-in page. `from` is where the user was headed before being sent here.
    SignIn { from: Option<String> },
    ProfileCompletion,
    ProtectedHome { tab: DashboardTab },
    NotFound(String),
}

impl Route {
    /// Parse a path with optional query string, e.g. `/auth?from=%2Fdashboard`.
    pub fn parse(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        match path.trim_end_matches('/') {
            "" => Self::Landing,
            SIGN_IN_PATH => Self::SignIn {
                from: query.and_then(from_param),
            },
            PROFILE_COMPLETION_PATH => Self::ProfileCompletion,
            PROTECTED_HOME_PATH => Self::ProtectedHome {
                tab: DashboardTab::Home,
            },
            trimmed => match trimmed.strip_prefix("/dashboard/") {
                Some(segment) if !segment.contains('/') => Self::ProtectedHome {
                    tab: DashboardTab::parse(segment),
                },
                _ => Self::NotFound(path.to_string()),
            },
        }
    }

    /// Canonical path for this route.
    pub fn path(&self) -> String {
        match self {
            Self::Landing => LANDING_PATH.to_string(),
            Self::SignIn { from: None } => SIGN_IN_PATH.to_string(),
            Self::SignIn { from: Some(from) } => sign_in_location(from),
            Self::ProfileCompletion => PROFILE_COMPLETION_PATH.to_string(),
            Self::ProtectedHome { tab } => match tab.segment() {
                Some(segment) => format!("{}/{}", PROTECTED_HOME_PATH, segment),
                None => PROTECTED_HOME_PATH.to_string(),
            },
            Self::NotFound(path) => path.clone(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::ProfileCompletion | Self::ProtectedHome { .. })
    }

    pub fn requires_completed_profile(&self) -> bool {
        matches!(self, Self::ProtectedHome { .. })
    }
}

fn from_param(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("from="))
        .and_then(|raw| urlencoding::decode(raw).ok())
        .map(|decoded| decoded.into_owned())
        .filter(|from| !from.is_empty())
}

fn sign_in_location(from: &str) -> String {
    format!("{}?from={}", SIGN_IN_PATH, urlencoding::encode(from))
}

/// Outcome of admission control for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Session state is still loading; render a loading indicator.
    Defer,
    Allow,
    RedirectToSignIn { from: String },
    RedirectToProfileCompletion,
    /// `resume` is a dashboard path to continue to instead of `/dashboard`.
    RedirectToProtectedHome { resume: Option<String> },
}

impl Decision {
    /// Where to navigate, for redirects.
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Defer | Self::Allow => None,
            Self::RedirectToSignIn { from } => Some(sign_in_location(from)),
            Self::RedirectToProfileCompletion => Some(PROFILE_COMPLETION_PATH.to_string()),
            Self::RedirectToProtectedHome { resume } => Some(
                resume
                    .clone()
                    .unwrap_or_else(|| PROTECTED_HOME_PATH.to_string()),
            ),
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.location().is_some()
    }
}

/// Decide admission for `route` under `snapshot`. First matching rule wins.
pub fn decide(snapshot: &SessionSnapshot, route: &Route) -> Decision {
    if snapshot.auth_loading || snapshot.profile_loading {
        return Decision::Defer;
    }

    let signed_in = snapshot.is_signed_in();

    if route.requires_auth() && !signed_in {
        return Decision::RedirectToSignIn { from: route.path() };
    }

    if let Route::SignIn { from } = route {
        if signed_in {
            return Decision::RedirectToProtectedHome {
                resume: from.as_deref().and_then(resume_path),
            };
        }
    }

    let completed = is_profile_completed(snapshot);

    if route.requires_completed_profile() && !completed {
        return Decision::RedirectToProfileCompletion;
    }

    match route {
        Route::ProfileCompletion if completed => {
            Decision::RedirectToProtectedHome { resume: None }
        }
        Route::ProtectedHome {
            tab: DashboardTab::Unknown(_),
        } => Decision::RedirectToProtectedHome { resume: None },
        _ => Decision::Allow,
    }
}

/// Only known dashboard routes may be resumed after sign-in.
fn resume_path(from: &str) -> Option<String> {
    let route = Route::parse(from);
    match &route {
        Route::ProtectedHome { tab } if tab.is_known() => Some(route.path()),
        _ => None,
    }
}

// ─── Controller ──────────────────────────────────────────────

/// Applies [`decide`] to navigation attempts and mounted routes.
#[derive(Clone)]
pub struct RouteAdmissionController {
    store: SessionStore,
}

/// A route being rendered. Dropping it stops re-evaluation.
#[must_use = "dropping a MountedRoute stops re-evaluation"]
pub struct MountedRoute {
    _subscription: Subscription,
}

impl MountedRoute {
    pub fn unmount(self) {}
}

impl RouteAdmissionController {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Decide a navigation attempt to `target` against the current snapshot.
    pub fn evaluate(&self, target: &str) -> Decision {
        let route = Route::parse(target);
        let decision = decide(&self.store.snapshot(), &route);
        tracing::debug!(path = target, decision = ?decision, "Admission evaluated");
        decision
    }

    /// Keep `route` under admission control while it is rendered.
    ///
    /// `on_decision` receives the current decision immediately and then each
    /// time a published snapshot changes it.
    pub fn mount<F>(&self, route: Route, on_decision: F) -> MountedRoute
    where
        F: Fn(&Decision) + Send + Sync + 'static,
    {
        let last: Mutex<Option<Decision>> = Mutex::new(None);

        let subscription = self.store.observe(move |snapshot| {
            let decision = decide(snapshot, &route);
            {
                let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                if last.as_ref() == Some(&decision) {
                    return;
                }
                *last = Some(decision.clone());
            }
            on_decision(&decision);
        });

        MountedRoute {
            _subscription: subscription,
        }
    }
}
