// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod chapters;
pub mod novels;
pub mod reading;
pub mod session;

pub use chapters::ChapterService;
pub use novels::{NovelPage, NovelQuery, NovelService};
pub use reading::ReadingService;
pub use session::SessionManager;

use crate::error::{ActionError, AppError};
use crate::notify::Notifier;

/// Deadline label and user-facing wording of one operation.
pub(crate) struct Wording {
    pub label: &'static str,
    pub timed_out: &'static str,
    pub fallback: &'static str,
    /// Empty when the operation reports failures only
    pub success: &'static str,
}

impl Wording {
    pub(crate) fn announce_success(&self, notifier: &dyn Notifier) {
        if !self.success.is_empty() {
            notifier.success(self.success);
        }
    }
}

/// Log and report a failed operation; returns the message shown.
pub(crate) fn report_failure(
    notifier: &dyn Notifier,
    wording: &Wording,
    err: &AppError,
) -> ActionError {
    tracing::error!(operation = wording.label, error = %err, "Operation failed");
    let message = err.user_message(wording.timed_out, wording.fallback);
    notifier.error(&message);
    ActionError(message)
}

/// Report a failure that has no underlying `AppError`.
pub(crate) fn report_rejection(
    notifier: &dyn Notifier,
    wording: &Wording,
    message: String,
) -> ActionError {
    tracing::warn!(operation = wording.label, reason = %message, "Operation rejected");
    notifier.error(&message);
    ActionError(message)
}

/// First validation message, in field order.
pub(crate) fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid input".to_string())
}
