// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend layer (hosted auth, row store and object storage).
//!
//! The traits describe the remote contract the services rely on.
//! [`SupabaseClient`] implements all of them over HTTP.

pub mod query;
pub mod supabase;
pub mod token_store;

pub use query::{Query, Rows};
pub use supabase::SupabaseClient;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{
    AuthEvent, AuthSession, FileUpload, Identity, ProfileUpdate, SignUp, UserProfile,
};

/// Table names as constants.
pub mod tables {
    /// Canonical user-profile table
    pub const USERS: &str = "Users";
    pub const NOVELS: &str = "Novels";
    pub const CHAPTERS: &str = "Chapters";
    pub const READING_PROGRESS: &str = "Reading_Progress";
    pub const LIBRARY: &str = "Library";
}

/// Storage bucket names.
pub mod buckets {
    pub const PROFILE_PICTURES: &str = "profile_pictures";
    pub const NOVEL_COVERS: &str = "novel_coverpage";
}

/// Remote functions invoked through RPC.
pub mod functions {
    pub const INCREMENT_NOVEL_VIEWS: &str = "increment_novel_views";
    pub const INCREMENT_CHAPTER_VIEWS: &str = "increment_chapter_views";
}

/// Authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Restore the persisted session, refreshing it if it is about to expire.
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<SignUp>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Identity>>;

    /// End the remote session and remove the persisted token.
    async fn sign_out(&self) -> Result<()>;

    /// Identity currently live on the auth service (bypasses local caches).
    async fn get_user(&self) -> Result<Option<Identity>>;

    /// Subscribe to auth-state changes. Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Access to the user-profile table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Single-row lookup by user id.
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()>;
}

/// Object storage buckets.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: &str, key: &str, file: &FileUpload) -> Result<()>;

    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Generic access to the domain tables.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Rows>;

    async fn insert(&self, table: &str, row: Value) -> Result<()>;

    /// Apply `patch` to every row matched by the query filters.
    async fn update(&self, query: &Query, patch: Value) -> Result<()>;

    /// Insert or merge on the table's primary key.
    async fn upsert(&self, table: &str, row: Value) -> Result<()>;

    async fn delete(&self, query: &Query) -> Result<()>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;
}

/// Everything the services need from the hosted backend.
pub trait Backend: AuthApi + ProfileStore + ObjectStorage + TableStore {}

impl<T> Backend for T where T: AuthApi + ProfileStore + ObjectStorage + TableStore {}
