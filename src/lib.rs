// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitness Soul: session and onboarding admission control
//!
//! This crate tracks who is signed in, whether they have completed the
//! onboarding profile, and which UI routes they may enter. A localhost API
//! exposes the session to the UI shell.

pub mod admission;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;

use admission::RouteAdmissionController;
use config::Config;
use services::BroadcastNotifier;
use session::SessionStore;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: SessionStore,
    pub admission: RouteAdmissionController,
    /// Same notifier the store reports to; event streams subscribe here.
    pub notifications: Arc<BroadcastNotifier>,
}

impl AppState {
    pub fn new(config: Config, store: SessionStore, notifications: Arc<BroadcastNotifier>) -> Self {
        Self {
            config,
            admission: RouteAdmissionController::new(store.clone()),
            store,
            notifications,
        }
    }
}
