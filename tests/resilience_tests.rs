// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deadline and retry behaviour under a paused clock.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use novel_client::error::AppError;
use novel_client::resilience::{with_retry, with_timeout, RetryPolicy};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_timeout_returns_value_before_deadline() {
    let result = with_timeout(
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(7)
        },
        Duration::from_secs(1),
        "Quick call",
    )
    .await;

    assert_eq!(result.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_forwards_operation_error() {
    let result: novel_client::error::Result<()> = with_timeout(
        async { Err(AppError::remote(400, "Invalid login credentials")) },
        Duration::from_secs(1),
        "Login",
    )
    .await;

    let err = result.unwrap_err();
    assert!(!err.is_timeout());
    assert_eq!(err.status(), Some(400));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_deadline_with_label() {
    let start = Instant::now();
    let result: novel_client::error::Result<()> = with_timeout(
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        },
        Duration::from_secs(10),
        "Fetching user profile",
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "Fetching user profile timed out");
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_operation_keeps_running() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let result: novel_client::error::Result<()> = with_timeout(
        async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_secs(1),
        "Slow write",
    )
    .await;
    assert!(result.unwrap_err().is_timeout());
    assert!(!finished.load(Ordering::SeqCst));

    // The abandoned call completes on its own; its result goes nowhere
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_retry_backs_off_exponentially_on_transient_errors() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();
    let mut attempts_at = Vec::new();

    let result = with_retry(RetryPolicy::default(), || {
        attempts_at.push(start.elapsed());
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(AppError::remote(503, "Service unavailable"))
            } else {
                Ok("rows")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "rows");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        attempts_at,
        vec![
            Duration::ZERO,
            Duration::from_millis(1000),
            Duration::from_millis(3000),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);

    let result: novel_client::error::Result<()> = with_retry(RetryPolicy::default(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(AppError::remote(404, "Not found")) }
    })
    .await;

    assert_eq!(result.unwrap_err().status(), Some(404));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_does_not_retry_other_failures() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result: novel_client::error::Result<()> = with_retry(RetryPolicy::default(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(AppError::remote(400, "Bad request")) }
    })
    .await;

    assert_eq!(result.unwrap_err().status(), Some(400));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_retry_does_not_retry_timeouts() {
    let calls = AtomicU32::new(0);

    let result: novel_client::error::Result<()> = with_retry(RetryPolicy::default(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_secs(10),
            "Fetching novels",
        )
    })
    .await;

    assert!(result.unwrap_err().is_timeout());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
