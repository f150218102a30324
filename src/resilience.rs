// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deadline and retry helpers wrapped around backend calls.
//!
//! - [`with_timeout`] races a call against a timer. A call that loses the race
//!   keeps running as a detached task and its result is discarded.
//! - [`with_retry`] re-invokes idempotent calls on transient failures with
//!   exponential backoff.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Backoff policy for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after every retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Run `operation` with a deadline.
///
/// The operation is spawned so that it can outlive the caller when the
/// deadline fires first; in that case the result it eventually produces is
/// dropped and `AppError::Timeout` tagged with `label` is returned.
pub async fn with_timeout<T, F>(operation: F, deadline: Duration, label: &str) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let settled = Arc::new(AtomicBool::new(false));
    let task_settled = settled.clone();
    let task_label = label.to_string();

    let mut handle = tokio::spawn(async move {
        let result = operation.await;
        if task_settled.load(Ordering::Acquire) {
            tracing::debug!(label = %task_label, "Discarding result that arrived after the deadline");
            return None;
        }
        Some(result)
    });

    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(Some(result)) => result,
            Ok(None) => Err(AppError::Timeout { label: label.to_string() }),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!("{} task failed: {}", label, e))),
        },
        _ = tokio::time::sleep(deadline) => {
            settled.store(true, Ordering::Release);
            tracing::warn!(label, deadline_ms = deadline.as_millis() as u64, "Operation timed out");
            Err(AppError::Timeout { label: label.to_string() })
        }
    }
}

/// Run `operation`, retrying transient failures (HTTP 404 / 503).
///
/// Every other failure is returned immediately. Only wrap reads and uploads:
/// a retried non-upsert write may be applied twice.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    status = e.status(),
                    delay_ms = delay.as_millis() as u64,
                    "Transient backend failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
