// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile completion gate.

use crate::models::ProfileRecord;
use crate::session::SessionSnapshot;

/// Whether the signed-in user has finished onboarding.
///
/// False while a profile fetch is outstanding, even if an older profile is
/// still held. This is the only place completion is derived.
pub fn is_profile_completed(snapshot: &SessionSnapshot) -> bool {
    !snapshot.profile_loading
        && snapshot
            .profile
            .as_ref()
            .is_some_and(ProfileRecord::is_completed)
}
