// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Novel browsing and publishing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use validator::Validate;

use super::{report_failure, report_rejection, validation_message, Wording};
use crate::backend::{buckets, functions, tables, Backend, Query};
use crate::config::Config;
use crate::error::{ActionResult, AppError, Result};
use crate::models::{Chapter, FileUpload, NewNovel, Novel};
use crate::notify::Notifier;
use crate::resilience::{with_retry, with_timeout, RetryPolicy};
use crate::time_utils::{now_rfc3339, unix_millis};

/// Genre value that disables the genre filter.
pub const ALL_GENRES: &str = "All";

const CREATE_NOVEL: Wording = Wording {
    label: "Creating novel",
    timed_out: "Creating novel timed out. Please try again.",
    fallback: "Failed to create novel",
    success: "Novel created successfully!",
};

/// One page of the novel listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub genre: String,
    /// Column sorted in descending order
    pub order_by: String,
}

impl Default for NovelQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            genre: ALL_GENRES.to_string(),
            order_by: "views".to_string(),
        }
    }
}

impl NovelQuery {
    /// Row query for this page.
    pub fn to_query(&self) -> Query {
        let page = u64::from(self.page.max(1));
        let limit = u64::from(self.limit.max(1));
        let start = (page - 1) * limit;
        let end = start + limit - 1;

        let query = Query::from(tables::NOVELS)
            .order(&self.order_by, false)
            .range(start, end)
            .with_count();

        if self.genre == ALL_GENRES {
            query
        } else {
            query.contains("genre", &[self.genre.as_str()])
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NovelPage {
    pub novels: Vec<Novel>,
    /// Number of novels matching the filter
    pub total: u64,
    pub has_more: bool,
}

/// Row written for a new novel.
#[derive(Serialize)]
struct NovelInsert<'a> {
    #[serde(flatten)]
    novel: &'a NewNovel,
    novel_coverpage: Option<String>,
    views: u64,
    created_at: String,
}

pub struct NovelService {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl NovelService {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            backend,
            notifier,
            timeout: config.timeout,
            retry: config.retry,
        }
    }

    /// List novels, most-viewed first by default.
    pub async fn fetch_novels(&self, request: &NovelQuery) -> Result<NovelPage> {
        let query = request.to_query();
        let query = &query;
        let backend = &self.backend;

        let rows = with_retry(self.retry, move || backend.select(query))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Error fetching novels"))?;

        let total = rows.count.unwrap_or(0);
        let novels: Vec<Novel> = rows.decode()?;
        let shown = u64::from(request.page.max(1)) * u64::from(request.limit.max(1));

        Ok(NovelPage {
            novels,
            total,
            has_more: total > shown,
        })
    }

    pub async fn get_novel(&self, novel_id: &str) -> Result<Option<Novel>> {
        let query = Query::from(tables::NOVELS)
            .eq("novel_id", novel_id)
            .range(0, 0);
        let query = &query;
        let backend = &self.backend;

        with_retry(self.retry, move || backend.select(query))
            .await?
            .first()
    }

    /// Chapters of a novel in reading order.
    pub async fn list_chapters(&self, novel_id: &str) -> Result<Vec<Chapter>> {
        let query = Query::from(tables::CHAPTERS)
            .eq("novel_id", novel_id)
            .order("chapter_number", true);
        let query = &query;
        let backend = &self.backend;

        with_retry(self.retry, move || backend.select(query))
            .await?
            .decode()
    }

    /// Count a view of the novel. Failures are logged only.
    pub async fn record_novel_view(&self, novel_id: &str) {
        let backend = self.backend.clone();
        let args = json!({ "novel_uuid": novel_id });
        let result = with_timeout(
            async move { backend.rpc(functions::INCREMENT_NOVEL_VIEWS, args).await },
            self.timeout,
            "Incrementing novel views",
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(novel_id, error = %e, "Error incrementing novel views");
        }
    }

    /// Publish a novel, uploading its cover first when one is given.
    pub async fn create_novel(&self, novel: NewNovel, cover: Option<FileUpload>) -> ActionResult {
        if let Err(errors) = novel.validate() {
            return Err(report_rejection(
                self.notifier.as_ref(),
                &CREATE_NOVEL,
                validation_message(&errors),
            ));
        }

        let novel_coverpage = match cover {
            Some(file) => match self.upload_cover(&file).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::error!(error = %e, "Error uploading novel cover");
                    let reason = e.user_message(CREATE_NOVEL.timed_out, "upload rejected");
                    return Err(report_rejection(
                        self.notifier.as_ref(),
                        &CREATE_NOVEL,
                        format!("Failed to upload cover image: {}", reason),
                    ));
                }
            },
            None => None,
        };

        let row = NovelInsert {
            novel: &novel,
            novel_coverpage,
            views: 0,
            created_at: now_rfc3339(),
        };
        let row = serde_json::to_value(&row)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode novel: {}", e)));

        let result = match row {
            Ok(row) => self.backend.insert(tables::NOVELS, row).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(title = %novel.title, "Novel created");
                CREATE_NOVEL.announce_success(self.notifier.as_ref());
                Ok(())
            }
            Err(e) => Err(report_failure(self.notifier.as_ref(), &CREATE_NOVEL, &e)),
        }
    }

    async fn upload_cover(&self, file: &FileUpload) -> Result<String> {
        let key = file.object_key("novel_cover", unix_millis());
        self.backend
            .upload(buckets::NOVEL_COVERS, &key, file)
            .await?;
        Ok(self.backend.public_url(buckets::NOVEL_COVERS, &key))
    }
}
