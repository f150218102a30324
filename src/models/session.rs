// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory session aggregate observed by views.

use crate::models::{Identity, UserProfile};

/// Current identity, profile and onboarding flags.
///
/// `needs_profile_completion` is only set while a profile row exists for
/// `identity` without a username; `profile` is then `None`. Without an
/// identity both `profile` and the flag are cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<UserProfile>,
    /// True until session restoration has finished
    pub loading: bool,
    pub needs_profile_completion: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
            needs_profile_completion: false,
        }
    }
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    /// Id of the current identity, if signed in.
    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    /// Drop identity and everything derived from it.
    pub fn clear(&mut self) {
        self.identity = None;
        self.profile = None;
        self.needs_profile_completion = false;
    }
}
