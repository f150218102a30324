// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reading progress and the personal library.

use std::sync::Arc;
use std::time::Duration;

use super::{report_failure, Wording};
use crate::backend::{tables, Backend, Query};
use crate::config::Config;
use crate::error::{ActionResult, AppError, Result};
use crate::models::{LibraryEntry, ReadingProgress};
use crate::notify::Notifier;
use crate::resilience::{with_retry, with_timeout, RetryPolicy};
use crate::time_utils::now_rfc3339;

const UPDATE_PROGRESS: Wording = Wording {
    label: "Updating reading progress",
    timed_out: "Updating reading progress timed out. Please try again.",
    fallback: "Failed to update reading progress",
    success: "",
};

const ADD_TO_LIBRARY: Wording = Wording {
    label: "Adding to library",
    timed_out: "Adding to library timed out. Please try again.",
    fallback: "Failed to add novel to library",
    success: "Added to library",
};

const REMOVE_FROM_LIBRARY: Wording = Wording {
    label: "Removing from library",
    timed_out: "Removing from library timed out. Please try again.",
    fallback: "Failed to remove novel from library",
    success: "Removed from library",
};

pub struct ReadingService {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReadingService {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            backend,
            notifier,
            timeout: config.timeout,
            retry: config.retry,
        }
    }

    // ─── Reading progress ──────────────────────────────────────────

    /// Record the chapter a user last opened in a novel.
    ///
    /// One row per user and novel; a second call overwrites the first.
    /// Only failures are announced.
    pub async fn update_reading_progress(
        &self,
        user_id: &str,
        novel_id: &str,
        chapter_id: &str,
    ) -> ActionResult {
        let progress = ReadingProgress {
            user_id: user_id.to_string(),
            novel_id: novel_id.to_string(),
            chapter_id: chapter_id.to_string(),
            lastread_at: now_rfc3339(),
        };
        let row = match encode(&progress) {
            Ok(row) => row,
            Err(e) => return Err(report_failure(self.notifier.as_ref(), &UPDATE_PROGRESS, &e)),
        };

        let backend = self.backend.clone();
        let result = with_timeout(
            async move { backend.upsert(tables::READING_PROGRESS, row).await },
            self.timeout,
            UPDATE_PROGRESS.label,
        )
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(user_id, novel_id, chapter_id, "Reading progress saved");
                Ok(())
            }
            Err(e) => Err(report_failure(self.notifier.as_ref(), &UPDATE_PROGRESS, &e)),
        }
    }

    /// Where the user left off in a novel, if anywhere.
    pub async fn reading_progress(
        &self,
        user_id: &str,
        novel_id: &str,
    ) -> Result<Option<ReadingProgress>> {
        let query = Query::from(tables::READING_PROGRESS)
            .eq("user_id", user_id)
            .eq("novel_id", novel_id)
            .range(0, 0);
        let query = &query;
        let backend = &self.backend;

        with_retry(self.retry, move || backend.select(query))
            .await?
            .first()
    }

    // ─── Library ───────────────────────────────────────────────────

    pub async fn is_in_library(&self, user_id: &str, novel_id: &str) -> Result<bool> {
        let query = library_entry(user_id, novel_id).range(0, 0);
        let query = &query;
        let backend = &self.backend;

        let entry: Option<LibraryEntry> = with_retry(self.retry, move || backend.select(query))
            .await?
            .first()?;
        Ok(entry.is_some())
    }

    pub async fn list_library(&self, user_id: &str) -> Result<Vec<LibraryEntry>> {
        let query = Query::from(tables::LIBRARY).eq("user_id", user_id);
        let query = &query;
        let backend = &self.backend;

        with_retry(self.retry, move || backend.select(query))
            .await?
            .decode()
    }

    pub async fn add_to_library(&self, user_id: &str, novel_id: &str) -> ActionResult {
        let entry = LibraryEntry {
            library_id: None,
            user_id: user_id.to_string(),
            novel_id: novel_id.to_string(),
        };
        let row = match encode(&entry) {
            Ok(row) => row,
            Err(e) => return Err(report_failure(self.notifier.as_ref(), &ADD_TO_LIBRARY, &e)),
        };

        let backend = self.backend.clone();
        self.run(&ADD_TO_LIBRARY, async move {
            backend.insert(tables::LIBRARY, row).await
        })
        .await
    }

    pub async fn remove_from_library(&self, user_id: &str, novel_id: &str) -> ActionResult {
        let query = library_entry(user_id, novel_id);

        let backend = self.backend.clone();
        self.run(&REMOVE_FROM_LIBRARY, async move {
            backend.delete(&query).await
        })
        .await
    }

    async fn run<F>(&self, wording: &Wording, write: F) -> ActionResult
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        match with_timeout(write, self.timeout, wording.label).await {
            Ok(()) => {
                wording.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Err(e) => Err(report_failure(self.notifier.as_ref(), wording, &e)),
        }
    }
}

fn library_entry(user_id: &str, novel_id: &str) -> Query {
    Query::from(tables::LIBRARY)
        .eq("user_id", user_id)
        .eq("novel_id", novel_id)
}

fn encode<T: serde::Serialize>(row: &T) -> Result<serde_json::Value> {
    serde_json::to_value(row)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode row: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_entry_filters_on_user_and_novel() {
        let params = library_entry("u1", "n1").filter_params();
        assert_eq!(
            params,
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("novel_id".to_string(), "eq.n1".to_string()),
            ]
        );
    }

    #[test]
    fn new_library_entry_omits_id() {
        let entry = LibraryEntry {
            library_id: None,
            user_id: "u1".to_string(),
            novel_id: "n1".to_string(),
        };
        assert_eq!(
            encode(&entry).unwrap(),
            serde_json::json!({ "user_id": "u1", "novel_id": "n1" })
        );
    }
}
