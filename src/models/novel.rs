// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Novel, chapter, reading-progress and library rows.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Novel row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    pub novel_id: String,
    pub title: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    /// Public URL of the cover image
    #[serde(default)]
    pub novel_coverpage: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Data for a new novel (the author fills these in).
#[derive(Debug, Clone, Serialize, Validate)]
pub struct NewNovel {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    pub author_id: String,
    pub synopsis: String,
    pub genre: Vec<String>,
}

/// Chapter row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: String,
    pub novel_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub chapter_number: u32,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Fields of a chapter that an author writes.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterDraft {
    pub title: String,
    pub content: String,
    pub chapter_number: u32,
}

/// Partial chapter edit; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
}

/// Reading position of a user in a novel (one row per user and novel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub user_id: String,
    pub novel_id: String,
    pub chapter_id: String,
    pub lastread_at: String,
}

/// Novel saved to a user's library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    pub user_id: String,
    pub novel_id: String,
}
