// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod identity;
pub mod profile;

pub use identity::Identity;
pub use profile::{ExperienceLevel, FitnessGoal, ProfileInput, ProfilePatch, ProfileRecord, Sex};
