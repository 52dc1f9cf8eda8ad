// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session state: who is signed in and where they are in onboarding.

pub mod error;
pub mod store;

pub use error::SessionError;
pub use store::{SessionSnapshot, SessionStore, Subscription};
