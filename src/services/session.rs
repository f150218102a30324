// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: owns the signed-in identity and the derived profile state.
//!
//! State lives in one [`SessionState`] behind a `watch` channel. Views hold a
//! receiver; every mutation goes through the manager. After [`dispose`] the
//! state is frozen, including for operations and auth events still in flight.
//!
//! [`dispose`]: SessionManager::dispose

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use validator::Validate;

use super::{report_failure, report_rejection, validation_message, Wording};
use crate::backend::{buckets, Backend};
use crate::config::Config;
use crate::error::{ActionError, ActionResult, AppError, Result};
use crate::models::{
    AuthEvent, Identity, ProfileInput, ProfileUpdate, SessionState, SignUp, UserProfile,
};
use crate::notify::Notifier;
use crate::resilience::with_timeout;
use crate::time_utils::{now_rfc3339, unix_millis};

const INITIALIZE: Wording = Wording {
    label: "Authentication initialization",
    timed_out: "Authentication initialization timed out. Please refresh the page.",
    fallback: "Failed to initialize authentication",
    success: "",
};

const FETCH_PROFILE: Wording = Wording {
    label: "Fetching user profile",
    timed_out: "Profile loading timed out. Please refresh the page.",
    fallback: "Failed to fetch user profile",
    success: "",
};

const LOGIN: Wording = Wording {
    label: "Login",
    timed_out: "Login timed out. Please try again.",
    fallback: "Login failed",
    success: "Login successful!",
};

const REGISTER: Wording = Wording {
    label: "Registration",
    timed_out: "Registration timed out. Please try again.",
    fallback: "Registration failed",
    success: "Registration successful!",
};

const LOGOUT: Wording = Wording {
    label: "Logout",
    timed_out: "Logout timed out. Please try again.",
    fallback: "Failed to logout",
    success: "Logged out successfully",
};

const COMPLETE_PROFILE: Wording = Wording {
    label: "Profile update",
    timed_out: "Profile update timed out. Please try again.",
    fallback: "Failed to update profile",
    success: "Profile updated successfully!",
};

const PICTURE_UPLOAD_LABEL: &str = "Profile picture upload";

/// Session manager.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    registration_settle: Duration,
    state: watch::Sender<SessionState>,
    /// Cleared by `dispose`; no state change happens afterwards.
    alive: Arc<AtomicBool>,
    started: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            notifier,
            timeout: config.timeout,
            registration_settle: config.registration_settle,
            state,
            alive: Arc::new(AtomicBool::new(true)),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    // ─── State Access ────────────────────────────────────────────────────────

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Apply `change` unless the manager is disposed. Receivers are only
    /// woken when the state actually changed.
    fn update(&self, change: impl FnOnce(&mut SessionState)) -> bool {
        if !self.is_alive() {
            tracing::debug!("Ignoring state change on disposed session manager");
            return false;
        }
        self.state.send_if_modified(|state| {
            let before = state.clone();
            change(state);
            *state != before
        })
    }

    fn set_identity(&self, identity: Option<Identity>) {
        self.update(|state| {
            let same_user = state.user_id() == identity.as_ref().map(|i| i.id.as_str());
            if !same_user {
                state.profile = None;
                state.needs_profile_completion = false;
            }
            state.identity = identity;
        });
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Subscribe to auth events and restore the persisted session.
    ///
    /// Runs once; later calls return immediately.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session manager already started");
            return;
        }
        self.listen_for_auth_events();
        self.initialize().await;
    }

    /// Restore the persisted session within the deadline.
    async fn initialize(&self) {
        let _loading = LoadingGuard(self);

        let backend = self.backend.clone();
        let restored = with_timeout(
            async move { backend.get_session().await },
            self.timeout,
            INITIALIZE.label,
        )
        .await;

        match restored {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Session restored");
                let user_id = session.user.id.clone();
                self.set_identity(Some(session.user));
                self.fetch_user_profile(&user_id).await;
            }
            Ok(None) => tracing::debug!("No persisted session"),
            Err(e) => {
                tracing::error!(error = %e, "Error initializing auth");
                let message = if e.is_timeout() {
                    INITIALIZE.timed_out
                } else {
                    INITIALIZE.fallback
                };
                self.notifier.error(message);
            }
        }
    }

    fn listen_for_auth_events(self: &Arc<Self>) {
        let mut events = self.backend.on_auth_state_change();
        let manager: Weak<Self> = Arc::downgrade(self);
        let alive = self.alive.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth events lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if !alive.load(Ordering::Acquire) {
                    break;
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_auth_event(event).await;
            }
            tracing::debug!("Auth event listener stopped");
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Overwrite the identity from an auth event and refresh derived state.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        if !self.is_alive() {
            return;
        }

        tracing::debug!(kind = ?event.kind, "Handling auth event");
        let identity = event.identity().cloned();
        self.set_identity(identity.clone());

        match identity {
            Some(identity) => self.fetch_user_profile(&identity.id).await,
            None => {
                self.update(SessionState::clear);
            }
        }
    }

    /// Stop following auth events and freeze the state.
    pub fn dispose(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
        tracing::debug!("Session manager disposed");
    }

    // ─── Profile ─────────────────────────────────────────────────────────────

    /// Load the profile row of `user_id` into the session.
    ///
    /// Failures are reported to the user and never returned. The result is
    /// dropped if the identity changed while the fetch was running.
    pub async fn fetch_user_profile(&self, user_id: &str) {
        let backend = self.backend.clone();
        let id = user_id.to_string();
        let fetched = with_timeout(
            async move { backend.fetch_profile(&id).await },
            self.timeout,
            FETCH_PROFILE.label,
        )
        .await;

        match fetched {
            Ok(row) => self.apply_profile(user_id, row),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Error fetching user profile");
                let message = if e.is_timeout() {
                    FETCH_PROFILE.timed_out
                } else {
                    FETCH_PROFILE.fallback
                };
                self.notifier.error(message);
            }
        }
    }

    fn apply_profile(&self, user_id: &str, row: Option<UserProfile>) {
        if self.state.borrow().user_id() != Some(user_id) {
            tracing::debug!(user_id, "Discarding profile of a replaced identity");
            return;
        }

        self.update(|state| {
            if state.user_id() != Some(user_id) {
                return;
            }
            match row {
                Some(profile) if profile.is_complete() => {
                    state.profile = Some(profile);
                    state.needs_profile_completion = false;
                }
                Some(_) => {
                    state.profile = None;
                    state.needs_profile_completion = true;
                }
                None => {
                    state.profile = None;
                    state.needs_profile_completion = false;
                }
            }
        });
    }

    /// Re-read the profile of the identity live on the auth service.
    ///
    /// Not deadline-bounded. Returns the row (complete or not), or `None`
    /// when nobody is signed in remotely.
    pub async fn refresh_user_profile(&self) -> Result<Option<UserProfile>> {
        match self.live_profile().await {
            Ok(Some((identity, row))) => {
                let user_id = identity.id.clone();
                self.set_identity(Some(identity));
                self.apply_profile(&user_id, row.clone());
                Ok(row)
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!(error = %e, "Error refreshing user profile");
                Err(e)
            }
        }
    }

    async fn live_profile(&self) -> Result<Option<(Identity, Option<UserProfile>)>> {
        let Some(identity) = self.backend.get_user().await? else {
            return Ok(None);
        };
        let row = self.backend.fetch_profile(&identity.id).await?;
        Ok(Some((identity, row)))
    }

    // ─── Account Operations ──────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> ActionResult {
        let backend = self.backend.clone();
        let (email, password) = (email.to_string(), password.to_string());
        let result = with_timeout(
            async move { backend.sign_in_with_password(&email, &password).await },
            self.timeout,
            LOGIN.label,
        )
        .await;

        match result {
            Ok(Some(identity)) => {
                tracing::info!(user_id = %identity.id, "Login succeeded");
                let user_id = identity.id.clone();
                self.set_identity(Some(identity));
                self.fetch_user_profile(&user_id).await;
                LOGIN.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Ok(None) => Err(self.reject(&LOGIN, LOGIN.fallback.to_string())),
            Err(e) => Err(self.fail(&LOGIN, &e)),
        }
    }

    /// Create an account; the profile is read after a settling delay.
    pub async fn register(&self, email: &str, password: &str) -> ActionResult {
        let backend = self.backend.clone();
        let (email, password) = (email.to_string(), password.to_string());
        let result = with_timeout(
            async move { backend.sign_up(&email, &password).await },
            self.timeout,
            REGISTER.label,
        )
        .await;

        match result {
            Ok(Some(SignUp {
                identity,
                signed_in: true,
            })) => {
                tracing::info!(user_id = %identity.id, "Registration succeeded");
                let user_id = identity.id.clone();
                self.set_identity(Some(identity));
                // The profile row is created by a backend trigger shortly after sign-up
                tokio::time::sleep(self.registration_settle).await;
                self.fetch_user_profile(&user_id).await;
                REGISTER.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Ok(Some(SignUp { identity, .. })) => {
                // No session until the address is confirmed; the sign-in event sets the identity
                tracing::info!(user_id = %identity.id, "Registration awaiting confirmation");
                REGISTER.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Ok(None) => Err(self.reject(&REGISTER, REGISTER.fallback.to_string())),
            Err(e) => Err(self.fail(&REGISTER, &e)),
        }
    }

    /// Sign out remotely and locally. Unlike the other operations, failures
    /// are returned to the caller after being reported.
    pub async fn logout(&self) -> Result<()> {
        let backend = self.backend.clone();
        let result = with_timeout(
            async move { backend.sign_out().await },
            self.timeout,
            LOGOUT.label,
        )
        .await;

        match result {
            Ok(()) => {
                self.update(SessionState::clear);
                tracing::info!("Logged out");
                LOGOUT.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Err(e) => {
                self.fail(&LOGOUT, &e);
                Err(e)
            }
        }
    }

    /// Finish onboarding: upload the optional picture, then write the row.
    pub async fn complete_profile(&self, input: ProfileInput) -> ActionResult {
        let Some(identity) = self.identity() else {
            return Err(ActionError::from("No user found"));
        };

        let input = input.trimmed();
        if let Err(errors) = input.validate() {
            return Err(self.reject(&COMPLETE_PROFILE, validation_message(&errors)));
        }

        let ProfileInput {
            username,
            age,
            interest_genres,
            bio,
            profile_picture,
        } = input;

        let picture_url = match profile_picture {
            Some(file) => {
                let key = file.object_key("profile", unix_millis());
                let backend = self.backend.clone();
                let upload_key = key.clone();
                let uploaded = with_timeout(
                    async move {
                        backend
                            .upload(buckets::PROFILE_PICTURES, &upload_key, &file)
                            .await
                    },
                    self.timeout,
                    PICTURE_UPLOAD_LABEL,
                )
                .await;

                match uploaded {
                    Ok(()) => Some(self.backend.public_url(buckets::PROFILE_PICTURES, &key)),
                    Err(e) if e.is_timeout() => return Err(self.fail(&COMPLETE_PROFILE, &e)),
                    Err(e) => {
                        tracing::error!(error = %e, "Error uploading profile picture");
                        let reason = e.user_message(COMPLETE_PROFILE.timed_out, "upload rejected");
                        return Err(self.reject(
                            &COMPLETE_PROFILE,
                            format!("Failed to upload profile picture: {}", reason),
                        ));
                    }
                }
            }
            None => None,
        };

        let update = ProfileUpdate {
            username,
            age,
            interest_genre: interest_genres,
            bio,
            profile_picture: picture_url,
            updated_at: now_rfc3339(),
        };

        let backend = self.backend.clone();
        let user_id = identity.id.clone();
        let result = with_timeout(
            async move { backend.update_profile(&user_id, &update).await },
            self.timeout,
            COMPLETE_PROFILE.label,
        )
        .await;

        if let Err(e) = result {
            return Err(self.fail(&COMPLETE_PROFILE, &e));
        }

        self.fetch_user_profile(&identity.id).await;
        COMPLETE_PROFILE.announce_success(self.notifier.as_ref());
        Ok(())
    }

    fn fail(&self, wording: &Wording, err: &AppError) -> ActionError {
        report_failure(self.notifier.as_ref(), wording, err)
    }

    fn reject(&self, wording: &Wording, message: String) -> ActionError {
        report_rejection(self.notifier.as_ref(), wording, message)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Clears `loading` on every exit path of initialization.
struct LoadingGuard<'a>(&'a SessionManager);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.update(|state| state.loading = false);
    }
}
