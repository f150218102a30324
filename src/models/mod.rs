// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod identity;
pub mod novel;
pub mod profile;
pub mod session;

pub use identity::{AuthEvent, AuthEventKind, AuthSession, AuthUserPayload, Identity, SignUp};
pub use novel::{
    Chapter, ChapterDraft, ChapterPatch, LibraryEntry, NewNovel, Novel, ReadingProgress,
};
pub use profile::{FileUpload, ProfileInput, ProfileUpdate, UserProfile};
pub use session::SessionState;
