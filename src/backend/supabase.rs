// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the hosted backend (Supabase-compatible REST surface).
//!
//! Handles:
//! - Password sign-up / sign-in and sign-out
//! - Session persistence and refresh when the access token is expiring
//! - Auth-state change broadcast
//! - Row-store queries, writes and RPC calls
//! - Object uploads and public URLs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};

use super::query::parse_content_range_total;
use super::{tables, AuthApi, ObjectStorage, ProfileStore, Query, Rows, TableStore, TokenStore};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AuthEvent, AuthEventKind, AuthSession, AuthUserPayload, FileUpload, Identity, ProfileUpdate,
    SignUp, UserProfile,
};
use crate::resilience::{with_retry, RetryPolicy};

/// Margin before token expiration when we proactively refresh (1 minute).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the auth service reports no expiry.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Buffered auth events per subscriber.
const AUTH_EVENT_CAPACITY: usize = 32;

/// Backend client.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    storage_key: String,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenStore>,
    /// Current session; mirrors the persisted record.
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    /// Create a client; the persisted session is read lazily by `get_session`.
    pub fn new(config: &Config, tokens: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            storage_key: config.storage_key.clone(),
            retry: config.retry,
            tokens,
            session: RwLock::new(None),
            events,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn table_url(&self, table: &str) -> String {
        self.url(&format!("/rest/v1/{}", urlencoding::encode(table)))
    }

    /// Request authenticated with the anon key only.
    fn anon_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Request authenticated as the signed-in user, or anonymously.
    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());

        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::transport(e.to_string()))?;
        check_response(response).await
    }

    // ─── Session Handling ────────────────────────────────────────────────────

    fn emit(&self, kind: AuthEventKind, session: Option<AuthSession>) {
        tracing::debug!(?kind, "Auth state changed");
        // No subscribers is fine
        let _ = self.events.send(AuthEvent { kind, session });
    }

    async fn store_session(&self, session: AuthSession, kind: AuthEventKind) -> Result<()> {
        self.tokens.save(&self.storage_key, &session)?;
        *self.session.write().await = Some(session.clone());
        self.emit(kind, Some(session));
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.tokens.remove(&self.storage_key)?;
        *self.session.write().await = None;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let url = self.url("/auth/v1/token?grant_type=refresh_token");
        let response = self
            .send(
                self.anon_request(Method::POST, &url)
                    .json(&json!({ "refresh_token": refresh_token })),
            )
            .await?;

        let tokens: TokenResponse = parse_json(response).await?;
        tokens.into_session(Utc::now())
    }

    /// Password grant; shared by sign-in.
    async fn password_grant(&self, email: &str, password: &str) -> Result<AuthSession> {
        let url = self.url("/auth/v1/token?grant_type=password");
        let response = self
            .send(
                self.anon_request(Method::POST, &url)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        let tokens: TokenResponse = parse_json(response).await?;
        tokens.into_session(Utc::now())
    }

    async fn fetch_user_once(&self, access_token: &str) -> Result<Option<Identity>> {
        let response = self
            .send(
                self.http
                    .get(self.url("/auth/v1/user"))
                    .header("apikey", &self.anon_key)
                    .bearer_auth(access_token),
            )
            .await?;

        let payload: AuthUserPayload = parse_json(response).await?;
        Identity::try_from(payload).map(Some)
    }

    // ─── Rows and Objects ────────────────────────────────────────────────────

    async fn select_once(&self, query: &Query) -> Result<Rows> {
        let mut builder = self
            .request(Method::GET, &self.table_url(&query.table))
            .await
            .query(&query.to_params());
        if query.wants_count() {
            builder = builder.header("Prefer", "count=exact");
        }

        let response = self.send(builder).await?;
        let count = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let rows: Vec<Value> = parse_json(response).await?;

        Ok(Rows { rows, count })
    }

    async fn upload_once(&self, bucket: &str, key: &str, file: &FileUpload) -> Result<()> {
        let url = self.url(&format!(
            "/storage/v1/object/{}/{}",
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        ));

        let builder = self
            .request(Method::POST, &url)
            .await
            .header(header::CONTENT_TYPE, file.content_type.as_str())
            .header(header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(file.bytes.clone());

        self.send(builder).await?;
        Ok(())
    }

    /// Reject writes that would hit every row of a table.
    fn require_filters(query: &Query) -> Result<Vec<(String, String)>> {
        let params = query.filter_params();
        if params.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Refusing to modify every row of {}",
                query.table
            )));
        }
        Ok(params)
    }
}

#[async_trait]
impl AuthApi for SupabaseClient {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        let cached = self.session.read().await.clone();
        let session = match cached {
            Some(session) => session,
            None => match self.tokens.load(&self.storage_key)? {
                Some(session) => session,
                None => return Ok(None),
            },
        };

        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if !session.expires_within(Utc::now(), margin) {
            *self.session.write().await = Some(session.clone());
            return Ok(Some(session));
        }

        tracing::info!(user_id = %session.user.id, "Access token expiring, refreshing session");

        match self.refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                self.store_session(fresh.clone(), AuthEventKind::TokenRefreshed)
                    .await?;
                Ok(Some(fresh))
            }
            Err(e) if e.status().is_some_and(|s| (400..500).contains(&s)) => {
                // Refresh token revoked or already used: the stored session is dead
                tracing::warn!(error = %e, "Stored session rejected, discarding it");
                self.tokens.remove(&self.storage_key)?;
                *self.session.write().await = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<SignUp>> {
        let response = self
            .send(
                self.anon_request(Method::POST, &self.url("/auth/v1/signup"))
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        let body: Value = parse_json(response).await?;

        if body.get("access_token").is_some() {
            let tokens: TokenResponse = decode_value(body)?;
            let session = tokens.into_session(Utc::now())?;
            let identity = session.user.clone();
            self.store_session(session, AuthEventKind::SignedIn).await?;
            tracing::info!(user_id = %identity.id, "Registered and signed in");
            return Ok(Some(SignUp {
                identity,
                signed_in: true,
            }));
        }

        // Email confirmation pending: the response carries the user only
        let user = body.get("user").cloned().unwrap_or(body);
        let payload: AuthUserPayload = decode_value(user)?;
        if payload.id.is_empty() {
            return Ok(None);
        }
        let identity = Identity::try_from(payload)?;
        tracing::info!(user_id = %identity.id, "Registered, awaiting email confirmation");
        Ok(Some(SignUp {
            identity,
            signed_in: false,
        }))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        let session = self.password_grant(email, password).await?;
        let identity = session.user.clone();
        self.store_session(session, AuthEventKind::SignedIn).await?;
        tracing::info!(user_id = %identity.id, "Signed in");
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> Result<()> {
        let current = self.session.read().await.clone();

        if let Some(session) = current {
            let result = self
                .send(
                    self.http
                        .post(self.url("/auth/v1/logout"))
                        .header("apikey", &self.anon_key)
                        .bearer_auth(&session.access_token),
                )
                .await;

            match result {
                Ok(_) => {}
                Err(e) if matches!(e.status(), Some(401) | Some(403) | Some(404)) => {
                    tracing::debug!(error = %e, "Remote session already gone");
                }
                Err(e) => return Err(e),
            }
        }

        self.clear_session().await
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };

        let token = session.access_token.as_str();
        with_retry(self.retry, move || self.fetch_user_once(token)).await
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let query = Query::from(tables::USERS)
            .eq("user_id", user_id)
            .range(0, 0);
        let query = &query;

        let rows = with_retry(self.retry, move || self.select_once(query)).await?;
        rows.first()
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        let patch = serde_json::to_value(update)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode profile: {}", e)))?;
        self.update(&Query::from(tables::USERS).eq("user_id", user_id), patch)
            .await
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(&self, bucket: &str, key: &str, file: &FileUpload) -> Result<()> {
        with_retry(self.retry, move || self.upload_once(bucket, key, file)).await?;
        tracing::info!(bucket, key, bytes = file.bytes.len(), "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        self.url(&format!(
            "/storage/v1/object/public/{}/{}",
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        ))
    }
}

#[async_trait]
impl TableStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Rows> {
        self.select_once(query).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<()> {
        let builder = self
            .request(Method::POST, &self.table_url(table))
            .await
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(builder).await?;
        Ok(())
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<()> {
        let params = Self::require_filters(query)?;
        let builder = self
            .request(Method::PATCH, &self.table_url(&query.table))
            .await
            .query(&params)
            .header("Prefer", "return=minimal")
            .json(&patch);
        self.send(builder).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<()> {
        let builder = self
            .request(Method::POST, &self.table_url(table))
            .await
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.send(builder).await?;
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<()> {
        let params = Self::require_filters(query)?;
        let builder = self
            .request(Method::DELETE, &self.table_url(&query.table))
            .await
            .query(&params);
        self.send(builder).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let url = self.url(&format!("/rest/v1/rpc/{}", urlencoding::encode(function)));
        let response = self
            .send(self.request(Method::POST, &url).await.json(&args))
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| AppError::transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| AppError::transport(format!("JSON parse error: {}", e)))
    }
}

/// Token grant response from the auth service.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix timestamp
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUserPayload,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Result<AuthSession> {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
            .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

        Ok(AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: Identity::try_from(self.user)?,
        })
    }
}

/// Check response status and turn failures into `AppError::Remote`.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_default();

    if status.as_u16() == 503 {
        tracing::warn!("Backend unavailable (503)");
    } else {
        tracing::debug!(status = status.as_u16(), reason = %message, "Backend request failed");
    }

    Err(AppError::remote(status.as_u16(), message))
}

/// Extract the human-readable message from an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| {
            value
                .get(*key)?
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| AppError::transport(format!("JSON parse error: {}", e)))
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AppError::transport(format!("JSON parse error: {}", e)))
}
