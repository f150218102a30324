// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated identity and persisted session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Authenticated-user handle issued by the auth service.
///
/// Only the fields the client reads are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user id (also the key of the profile row)
    pub id: String,
    /// Email address, if the auth service reports one
    pub email: Option<String>,
}

/// Account created by a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUp {
    pub identity: Identity,
    /// False while the email address awaits confirmation; no session exists yet
    pub signed_in: bool,
}

/// User object as returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserPayload {
    #[serde(default)]
    pub id: String,
    pub email: Option<String>,
}

impl TryFrom<AuthUserPayload> for Identity {
    type Error = AppError;

    fn try_from(payload: AuthUserPayload) -> Result<Self, Self::Error> {
        let id = payload.id.trim();
        if id.is_empty() {
            return Err(AppError::transport("Auth response is missing the user id"));
        }
        Ok(Identity {
            id: id.to_string(),
            email: payload.email.filter(|e| !e.is_empty()),
        })
    }
}

/// Persisted auth session (the locally stored token record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl AuthSession {
    /// Check whether the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now + margin >= self.expires_at
    }
}

/// Kind of change reported on the auth-event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Event delivered to auth-state subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

impl AuthEvent {
    /// Identity carried by the event, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.user)
    }
}
