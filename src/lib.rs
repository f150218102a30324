// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Novel-Client: reader and author client for a hosted web-novel backend
//!
//! This crate keeps the signed-in session consistent with the backend's
//! auth service and wraps every remote call in a deadline or a retry.

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod resilience;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use backend::{Backend, FileTokenStore, SupabaseClient};
use config::Config;
use notify::Notifier;
use services::{ChapterService, NovelService, ReadingService, SessionManager};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub novels: NovelService,
    pub chapters: ChapterService,
    pub reading: ReadingService,
}

impl AppState {
    /// Wire every service to one backend client.
    pub fn new(config: Config, backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session: Arc::new(SessionManager::new(
                backend.clone(),
                notifier.clone(),
                &config,
            )),
            novels: NovelService::new(backend.clone(), notifier.clone(), &config),
            chapters: ChapterService::new(backend.clone(), notifier.clone(), &config),
            reading: ReadingService::new(backend, notifier, &config),
            config,
        }
    }

    /// Build the HTTP backend with a file-backed session record.
    pub fn connect(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let tokens = Arc::new(FileTokenStore::new(config.token_store_dir.clone()));
        let backend = Arc::new(SupabaseClient::new(&config, tokens));
        Self::new(config, backend, notifier)
    }
}
