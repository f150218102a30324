// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory backend and notifier shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use novel_client::backend::{tables, AuthApi, ObjectStorage, ProfileStore, Query, Rows, TableStore};
use novel_client::config::Config;
use novel_client::error::{AppError, Result};
use novel_client::models::{
    AuthEvent, AuthEventKind, AuthSession, FileUpload, Identity, ProfileUpdate, SignUp,
    UserProfile,
};
use novel_client::notify::{Notice, NoticeLevel, Notifier};
use novel_client::resilience::RetryPolicy;
use novel_client::services::SessionManager;

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Config with the production deadline and retry defaults.
pub fn test_config() -> Config {
    Config {
        timeout: Duration::from_secs(10),
        registration_settle: Duration::from_secs(1),
        retry: RetryPolicy::default(),
        ..Config::default()
    }
}

pub fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
    }
}

pub fn session_for(identity: &Identity) -> AuthSession {
    AuthSession {
        access_token: format!("access-{}", identity.id),
        refresh_token: format!("refresh-{}", identity.id),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: identity.clone(),
    }
}

pub fn complete_profile(user_id: &str, username: &str) -> UserProfile {
    UserProfile {
        username: Some(username.to_string()),
        ..incomplete_profile(user_id)
    }
}

pub fn incomplete_profile(user_id: &str) -> UserProfile {
    UserProfile {
        user_id: user_id.to_string(),
        username: None,
        age: None,
        interest_genre: Vec::new(),
        bio: None,
        profile_picture: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn picture(name: &str) -> FileUpload {
    FileUpload {
        file_name: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
    }
}

/// Session manager over `backend`, not yet started.
pub fn manager(backend: &Arc<FakeBackend>, notifier: &Arc<RecordingNotifier>) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        backend.clone(),
        notifier.clone(),
        &test_config(),
    ))
}

/// Let spawned tasks (auth listener, detached calls) run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ─── Notifier ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(NoticeLevel::Error)
    }

    pub fn successes(&self) -> Vec<String> {
        self.messages(NoticeLevel::Success)
    }

    fn messages(&self, level: NoticeLevel) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// Backend call, used to script delays and failures and to count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetSession,
    SignUp,
    SignIn,
    SignOut,
    GetUser,
    FetchProfile,
    UpdateProfile,
    Upload,
    Select,
    Insert,
    Update,
    Upsert,
    Delete,
    Rpc,
}

/// Scripted failure; rebuilt into an `AppError` on every use.
#[derive(Debug, Clone)]
pub struct Fault {
    pub status: Option<u16>,
    pub message: String,
}

impl Fault {
    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status: Some(status),
            message: message.to_string(),
        }
    }

    fn to_error(&self) -> AppError {
        match self.status {
            Some(status) => AppError::remote(status, self.message.clone()),
            None => AppError::transport(self.message.clone()),
        }
    }
}

#[derive(Default)]
struct Script {
    delays: HashMap<Op, Duration>,
    /// Consumed one per call before `always` is consulted
    queued: HashMap<Op, VecDeque<Fault>>,
    always: HashMap<Op, Fault>,
    calls: HashMap<Op, u32>,
}

#[derive(Default)]
struct Data {
    session: Option<AuthSession>,
    accounts: HashMap<String, (String, Identity)>,
    profiles: HashMap<String, UserProfile>,
    profile_updates: Vec<(String, ProfileUpdate)>,
    tables: HashMap<String, Vec<Value>>,
    uploads: Vec<(String, String)>,
    rpcs: Vec<(String, Value)>,
    /// Sign-up leaves new accounts unconfirmed, without a session
    confirm_email: bool,
}

/// In-memory stand-in for the hosted backend.
///
/// Sign-in, sign-up and sign-out publish auth events like the HTTP client
/// does. Sign-up creates an empty profile row, as the backend trigger does.
pub struct FakeBackend {
    script: Mutex<Script>,
    data: Mutex<Data>,
    events: broadcast::Sender<AuthEvent>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            script: Mutex::new(Script::default()),
            data: Mutex::new(Data::default()),
            events,
        })
    }

    // Scripting

    pub fn delay(&self, op: Op, delay: Duration) {
        self.script.lock().unwrap().delays.insert(op, delay);
    }

    pub fn fail_once(&self, op: Op, fault: Fault) {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    pub fn fail_always(&self, op: Op, fault: Fault) {
        self.script.lock().unwrap().always.insert(op, fault);
    }

    pub fn calls(&self, op: Op) -> u32 {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    // Data

    pub fn add_account(&self, email: &str, password: &str, identity: Identity) {
        self.data
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), (password.to_string(), identity));
    }

    pub fn require_email_confirmation(&self) {
        self.data.lock().unwrap().confirm_email = true;
    }

    pub fn set_session(&self, session: Option<AuthSession>) {
        self.data.lock().unwrap().session = session;
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.data.lock().unwrap().session.clone()
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.data
            .lock()
            .unwrap()
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn profile_updates(&self) -> Vec<(String, ProfileUpdate)> {
        self.data.lock().unwrap().profile_updates.clone()
    }

    pub fn put_row(&self, table: &str, row: Value) {
        self.data
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.data
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.data.lock().unwrap().uploads.clone()
    }

    pub fn rpcs(&self) -> Vec<(String, Value)> {
        self.data.lock().unwrap().rpcs.clone()
    }

    /// Publish an auth event as the auth service would.
    pub fn emit(&self, kind: AuthEventKind, session: Option<AuthSession>) {
        let _ = self.events.send(AuthEvent { kind, session });
    }

    /// Count the call, wait out its delay and return its scripted fault.
    async fn enter(&self, op: Op) -> Result<()> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            *script.calls.entry(op).or_default() += 1;
            script.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if let Some(fault) = script.queued.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(fault.to_error());
        }
        match script.always.get(&op) {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn sign_in_session(&self, identity: &Identity) {
        let session = session_for(identity);
        self.data.lock().unwrap().session = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session));
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.enter(Op::GetSession).await?;
        Ok(self.session())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<SignUp>> {
        self.enter(Op::SignUp).await?;
        let (identity, confirm_email) = {
            let mut data = self.data.lock().unwrap();
            if data.accounts.contains_key(email) {
                return Err(AppError::remote(422, "User already registered"));
            }
            let identity = Identity {
                id: format!("user-{}", data.accounts.len() + 1),
                email: Some(email.to_string()),
            };
            data.accounts
                .insert(email.to_string(), (password.to_string(), identity.clone()));
            data.profiles
                .insert(identity.id.clone(), incomplete_profile(&identity.id));
            (identity, data.confirm_email)
        };
        if confirm_email {
            return Ok(Some(SignUp {
                identity,
                signed_in: false,
            }));
        }
        self.sign_in_session(&identity);
        Ok(Some(SignUp {
            identity,
            signed_in: true,
        }))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        self.enter(Op::SignIn).await?;
        let account = self.data.lock().unwrap().accounts.get(email).cloned();
        match account {
            Some((expected, identity)) if expected == password => {
                self.sign_in_session(&identity);
                Ok(Some(identity))
            }
            _ => Err(AppError::remote(400, "Invalid login credentials")),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.enter(Op::SignOut).await?;
        self.data.lock().unwrap().session = None;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        self.enter(Op::GetUser).await?;
        Ok(self.session().map(|s| s.user))
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ProfileStore for FakeBackend {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.enter(Op::FetchProfile).await?;
        Ok(self.data.lock().unwrap().profiles.get(user_id).cloned())
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        self.enter(Op::UpdateProfile).await?;
        let mut data = self.data.lock().unwrap();
        data.profile_updates
            .push((user_id.to_string(), update.clone()));

        let profile = data
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| incomplete_profile(user_id));
        profile.username = Some(update.username.clone());
        profile.age = Some(update.age);
        profile.interest_genre = update.interest_genre.clone();
        profile.bio = Some(update.bio.clone());
        if update.profile_picture.is_some() {
            profile.profile_picture = update.profile_picture.clone();
        }
        profile.updated_at = Some(update.updated_at.clone());
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for FakeBackend {
    async fn upload(&self, bucket: &str, key: &str, _file: &FileUpload) -> Result<()> {
        self.enter(Op::Upload).await?;
        self.data
            .lock()
            .unwrap()
            .uploads
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("https://storage.test/{}/{}", bucket, key)
    }
}

#[async_trait]
impl TableStore for FakeBackend {
    async fn select(&self, query: &Query) -> Result<Rows> {
        self.enter(Op::Select).await?;
        let matching: Vec<Value> = self
            .rows(&query.table)
            .into_iter()
            .filter(|row| matches_filters(row, query))
            .collect();

        let params = query.to_params();
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<usize>().ok())
        };
        let offset = param("offset").unwrap_or(0);
        let limit = param("limit").unwrap_or(usize::MAX);

        Ok(Rows {
            count: query.wants_count().then_some(matching.len() as u64),
            rows: matching.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn insert(&self, table: &str, row: Value) -> Result<()> {
        self.enter(Op::Insert).await?;
        self.put_row(table, row);
        Ok(())
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<()> {
        self.enter(Op::Update).await?;
        let mut data = self.data.lock().unwrap();
        if let Some(rows) = data.tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|row| matches_filters(row, query)) {
                merge(row, &patch);
            }
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<()> {
        self.enter(Op::Upsert).await?;
        let key: &[&str] = if table == tables::READING_PROGRESS {
            &["user_id", "novel_id"]
        } else {
            &[]
        };

        let mut data = self.data.lock().unwrap();
        let rows = data.tables.entry(table.to_string()).or_default();
        let existing = rows
            .iter_mut()
            .find(|r| !key.is_empty() && key.iter().all(|k| r.get(k) == row.get(k)));
        match existing {
            Some(existing) => merge(existing, &row),
            None => rows.push(row),
        }
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<()> {
        self.enter(Op::Delete).await?;
        let mut data = self.data.lock().unwrap();
        if let Some(rows) = data.tables.get_mut(&query.table) {
            rows.retain(|row| !matches_filters(row, query));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        self.enter(Op::Rpc).await?;
        self.data
            .lock()
            .unwrap()
            .rpcs
            .push((function.to_string(), args));
        Ok(Value::Null)
    }
}

/// Evaluate the rendered `eq.` and `cs.{}` filters against a row.
fn matches_filters(row: &Value, query: &Query) -> bool {
    query.filter_params().iter().all(|(column, filter)| {
        let field = row.get(column);
        if let Some(expected) = filter.strip_prefix("eq.") {
            return match field {
                Some(Value::String(s)) => s == expected,
                Some(other) => other.to_string() == expected,
                None => false,
            };
        }
        if let Some(list) = filter
            .strip_prefix("cs.{")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let wanted: Vec<&str> = list.split(',').map(|v| v.trim_matches('"')).collect();
            let have: Vec<&str> = field
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            return wanted.iter().all(|w| have.contains(w));
        }
        false
    })
}

fn merge(row: &mut Value, patch: &Value) {
    if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            row.insert(key.clone(), value.clone());
        }
    }
}
