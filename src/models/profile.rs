// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model and the profile-completion input.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Application profile row, keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Missing until onboarding is complete
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub interest_genre: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// Public URL of the profile picture
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl UserProfile {
    /// A profile is complete once it carries a non-empty username.
    pub fn is_complete(&self) -> bool {
        self.username.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// File handed to the client for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Original file name (used for the extension)
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Extension of the original file name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }

    /// Object key `<prefix>_<millis>.<ext>` for this file.
    pub fn object_key(&self, prefix: &str, millis: i64) -> String {
        match self.extension() {
            Some(ext) => format!("{}_{}.{}", prefix, millis, ext),
            None => format!("{}_{}", prefix, millis),
        }
    }
}

/// Data collected by the profile-completion form.
#[derive(Debug, Clone, Validate)]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 50, message = "Username must be 1-50 characters"))]
    pub username: String,
    #[validate(range(min = 1, max = 150, message = "Age must be between 1 and 150"))]
    pub age: u32,
    pub interest_genres: Vec<String>,
    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: String,
    pub profile_picture: Option<FileUpload>,
}

impl ProfileInput {
    /// Strip surrounding whitespace so a blank username fails validation.
    pub fn trimmed(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self
    }
}

/// Columns written when a profile is completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub age: u32,
    pub interest_genre: Vec<String>,
    pub bio: String,
    /// Omitted without a new upload, so the stored picture is kept rather
    /// than cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub updated_at: String,
}
