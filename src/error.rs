// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

/// Application error type shared by the backend client and the services.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The operation did not finish before its deadline.
    #[error("{label} timed out")]
    Timeout { label: String },

    /// The backend answered with an error (or could not be reached).
    #[error("Backend request failed: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Status codes the backend returns for failures worth retrying.
    pub const TRANSIENT_STATUSES: [u16; 2] = [404, 503];

    /// Build a remote failure from an HTTP status and message.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        AppError::Remote {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Build a remote failure that has no HTTP status (transport errors).
    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Remote {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }

    /// HTTP status carried by a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if the failure is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        self.status()
            .is_some_and(|s| Self::TRANSIENT_STATUSES.contains(&s))
    }

    /// Map the failure to the single line shown to the user.
    ///
    /// Deadline failures always use `timed_out`. Remote failures forward the
    /// backend message when it has one, otherwise `fallback`.
    pub fn user_message(&self, timed_out: &str, fallback: &str) -> String {
        match self {
            AppError::Timeout { .. } => timed_out.to_string(),
            AppError::Remote { message, .. } if !message.trim().is_empty() => message.clone(),
            AppError::Remote { .. } => fallback.to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Failure returned by operations that report errors as a message instead of
/// propagating an [`AppError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionError {
    fn from(msg: &str) -> Self {
        ActionError(msg.to_string())
    }
}

/// Result type alias for backend calls
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type for user-facing actions (`Ok` or a message).
pub type ActionResult = std::result::Result<(), ActionError>;
