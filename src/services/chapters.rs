// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chapter reading and authoring.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use super::{report_failure, Wording};
use crate::backend::{functions, tables, Backend, Query};
use crate::config::Config;
use crate::error::{ActionResult, AppError, Result};
use crate::models::{Chapter, ChapterDraft, ChapterPatch};
use crate::notify::Notifier;
use crate::resilience::{with_retry, with_timeout, RetryPolicy};
use crate::time_utils::now_rfc3339;

const CREATE_CHAPTER: Wording = Wording {
    label: "Creating chapter",
    timed_out: "Creating chapter timed out. Please try again.",
    fallback: "Failed to create chapter",
    success: "Chapter created successfully!",
};

const UPDATE_CHAPTER: Wording = Wording {
    label: "Updating chapter",
    timed_out: "Updating chapter timed out. Please try again.",
    fallback: "Failed to update chapter",
    success: "Chapter updated successfully!",
};

const DELETE_CHAPTER: Wording = Wording {
    label: "Deleting chapter",
    timed_out: "Deleting chapter timed out. Please try again.",
    fallback: "Failed to delete chapter",
    success: "Chapter deleted successfully!",
};

#[derive(Serialize)]
struct ChapterInsert {
    novel_id: String,
    #[serde(flatten)]
    draft: ChapterDraft,
    views: u64,
    created_at: String,
}

#[derive(Serialize)]
struct ChapterUpdate {
    #[serde(flatten)]
    patch: ChapterPatch,
    updated_at: String,
}

pub struct ChapterService {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ChapterService {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            backend,
            notifier,
            timeout: config.timeout,
            retry: config.retry,
        }
    }

    pub async fn get_chapter(&self, chapter_id: &str) -> Result<Option<Chapter>> {
        let query = Query::from(tables::CHAPTERS)
            .eq("chapter_id", chapter_id)
            .range(0, 0);
        let query = &query;
        let backend = &self.backend;

        with_retry(self.retry, move || backend.select(query))
            .await?
            .first()
    }

    /// Count a view of the chapter. Failures are logged only.
    pub async fn record_chapter_view(&self, chapter_id: &str) {
        let backend = self.backend.clone();
        let args = json!({ "chapter_uuid": chapter_id });
        let result = with_timeout(
            async move { backend.rpc(functions::INCREMENT_CHAPTER_VIEWS, args).await },
            self.timeout,
            "Incrementing chapter views",
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(chapter_id, error = %e, "Error incrementing chapter views");
        }
    }

    pub async fn create_chapter(&self, novel_id: &str, draft: ChapterDraft) -> ActionResult {
        let row = ChapterInsert {
            novel_id: novel_id.to_string(),
            draft,
            views: 0,
            created_at: now_rfc3339(),
        };

        let row = match encode(&row) {
            Ok(row) => row,
            Err(e) => return Err(report_failure(self.notifier.as_ref(), &CREATE_CHAPTER, &e)),
        };

        let backend = self.backend.clone();
        self.run(&CREATE_CHAPTER, async move {
            backend.insert(tables::CHAPTERS, row).await
        })
        .await
    }

    pub async fn update_chapter(&self, chapter_id: &str, patch: ChapterPatch) -> ActionResult {
        let query = Query::from(tables::CHAPTERS).eq("chapter_id", chapter_id);
        let change = ChapterUpdate {
            patch,
            updated_at: now_rfc3339(),
        };

        let patch = match encode(&change) {
            Ok(patch) => patch,
            Err(e) => return Err(report_failure(self.notifier.as_ref(), &UPDATE_CHAPTER, &e)),
        };

        let backend = self.backend.clone();
        self.run(&UPDATE_CHAPTER, async move {
            backend.update(&query, patch).await
        })
        .await
    }

    pub async fn delete_chapter(&self, chapter_id: &str) -> ActionResult {
        let query = Query::from(tables::CHAPTERS).eq("chapter_id", chapter_id);

        let backend = self.backend.clone();
        self.run(&DELETE_CHAPTER, async move { backend.delete(&query).await })
            .await
    }

    /// Run a write within the deadline and report the outcome.
    async fn run<F>(&self, wording: &Wording, write: F) -> ActionResult
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        match with_timeout(write, self.timeout, wording.label).await {
            Ok(()) => {
                tracing::info!(operation = wording.label, "Chapter write succeeded");
                wording.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Err(e) => Err(report_failure(self.notifier.as_ref(), wording, &e)),
        }
    }
}

fn encode<T: Serialize>(row: &T) -> Result<serde_json::Value> {
    serde_json::to_value(row)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode chapter: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_update_only_writes_set_fields() {
        let change = ChapterUpdate {
            patch: ChapterPatch {
                title: Some("Renamed".to_string()),
                ..ChapterPatch::default()
            },
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        };

        let value = encode(&change).unwrap();
        assert_eq!(
            value,
            json!({ "title": "Renamed", "updated_at": "2026-01-01T00:00:00.000Z" })
        );
    }
}
