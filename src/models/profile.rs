// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding profile stored in Firestore.
//!
//! Documents live at `users/{uid}` and use camelCase field names so that
//! records written by earlier web clients still deserialize.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

/// Youngest and oldest ages for which cycle tracking is offered.
const CYCLE_TRACKING_AGE_RANGE: std::ops::RangeInclusive<u32> = 13..=55;

/// Default average cycle length (days).
pub const DEFAULT_CYCLE_DURATION: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
    LoseWeight,
    BuildMuscle,
    ImproveFitness,
    IncreaseEndurance,
    ToneBody,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

// ─── Onboarding Input ────────────────────────────────────────

/// Onboarding form submission.
///
/// Bounds mirror the onboarding form: age 13-100, weight 30-250 kg,
/// height 120-250 cm, cycle length 21-35 days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_onboarding"))]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 13, max = 100))]
    pub age: u32,
    pub sex: Sex,
    /// Weight in kilograms
    #[validate(range(min = 30.0, max = 250.0))]
    pub weight: f64,
    /// Height in centimeters
    #[validate(range(min = 120.0, max = 250.0))]
    pub height: f64,
    pub goal: FitnessGoal,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub menstrual_tracking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_period_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 21, max = 35))]
    pub cycle_duration: Option<u32>,
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_onboarding(input: &ProfileInput) -> Result<(), ValidationError> {
    if input.name.trim().is_empty() {
        return Err(invalid("name_blank", "Name must not be blank"));
    }

    if input.menstrual_tracking {
        if input.sex != Sex::Female || !CYCLE_TRACKING_AGE_RANGE.contains(&input.age) {
            return Err(invalid(
                "cycle_tracking_unavailable",
                "Cycle tracking is only available for female users aged 13-55",
            ));
        }

        if let Some(date) = input.last_period_date {
            if date > chrono::Utc::now().date_naive() {
                return Err(invalid(
                    "last_period_in_future",
                    "Last period start date cannot be in the future",
                ));
            }
        }
    }

    Ok(())
}

// ─── Stored Record ───────────────────────────────────────────

/// Profile document as stored in Firestore.
///
/// Every onboarding field is optional so that partial documents load.
/// `profile_completed` is only ever set to `true` by this crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<FitnessGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menstrual_tracking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_period_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_duration: Option<u32>,
    #[serde(default)]
    pub profile_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the profile was first submitted (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last onboarding write (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ProfileRecord {
    /// Build the document written on first submission.
    pub fn from_input(input: &ProfileInput, email: Option<String>, now: &str) -> Self {
        let mut record = Self {
            email,
            created_at: Some(now.to_string()),
            ..Default::default()
        };
        record.apply_patch(&ProfilePatch::from_input(input, now));
        record
    }

    /// True when name, age, sex, weight, height and goal are all present.
    pub fn has_required_fields(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.age.is_some()
            && self.sex.is_some()
            && self.weight.is_some()
            && self.height.is_some()
            && self.goal.is_some()
    }

    /// Completed and actually carrying the onboarding answers. Documents
    /// flagged complete by other writers without the required fields are not.
    pub fn is_completed(&self) -> bool {
        self.profile_completed && self.has_required_fields()
    }

    /// Merge a partial update into this record.
    pub fn apply_patch(&mut self, patch: &ProfilePatch) {
        self.name = Some(patch.name.clone());
        self.age = Some(patch.age);
        self.sex = Some(patch.sex);
        self.weight = Some(patch.weight);
        self.height = Some(patch.height);
        self.goal = Some(patch.goal);
        self.experience_level = Some(patch.experience_level);
        self.menstrual_tracking = Some(patch.menstrual_tracking);
        self.last_period_date = patch.last_period_date;
        self.cycle_duration = patch.cycle_duration;
        // Monotonic: a patch can only complete a profile.
        self.profile_completed |= patch.profile_completed;
        self.updated_at = Some(patch.updated_at.clone());
    }

    /// Recover the onboarding answers, if every required field is present.
    pub fn onboarding(&self) -> Option<ProfileInput> {
        Some(ProfileInput {
            name: self.name.clone()?,
            age: self.age?,
            sex: self.sex?,
            weight: self.weight?,
            height: self.height?,
            goal: self.goal?,
            experience_level: self.experience_level.unwrap_or_default(),
            menstrual_tracking: self.menstrual_tracking.unwrap_or(false),
            last_period_date: self.last_period_date,
            cycle_duration: self.cycle_duration,
        })
    }
}

// ─── Partial Update ──────────────────────────────────────────

/// Field-masked update applied to an existing profile document.
///
/// `createdAt` and `email` are deliberately absent: they are written once
/// on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: String,
    pub age: u32,
    pub sex: Sex,
    pub weight: f64,
    pub height: f64,
    pub goal: FitnessGoal,
    pub experience_level: ExperienceLevel,
    pub menstrual_tracking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_period_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_duration: Option<u32>,
    pub profile_completed: bool,
    pub updated_at: String,
}

impl ProfilePatch {
    /// Document field paths covered by a patch (the Firestore update mask).
    pub const FIELD_PATHS: [&'static str; 12] = [
        "name",
        "age",
        "sex",
        "weight",
        "height",
        "goal",
        "experienceLevel",
        "menstrualTracking",
        "lastPeriodDate",
        "cycleDuration",
        "profileCompleted",
        "updatedAt",
    ];

    /// Build the patch for a validated submission. Always completes the profile.
    pub fn from_input(input: &ProfileInput, now: &str) -> Self {
        let (last_period_date, cycle_duration) = if input.menstrual_tracking {
            (
                input.last_period_date,
                Some(input.cycle_duration.unwrap_or(DEFAULT_CYCLE_DURATION)),
            )
        } else {
            (None, None)
        };

        Self {
            name: input.name.trim().to_string(),
            age: input.age,
            sex: input.sex,
            weight: input.weight,
            height: input.height,
            goal: input.goal,
            experience_level: input.experience_level,
            menstrual_tracking: input.menstrual_tracking,
            last_period_date,
            cycle_duration,
            profile_completed: true,
            updated_at: now.to_string(),
        }
    }
}
