//! In-memory collaborators for unit and router tests.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        email::EmailSender,
        password::hash_password,
        repo::UserStore,
        repo_types::{EmailTaken, NewUser, User},
    },
    config::{AppConfig, EmailConfig, JwtConfig, StorageConfig},
    sessions::{
        repo::SessionStore,
        repo_types::{NewSession, Session, SessionMember, SessionPatch},
    },
    state::AppState,
    storage::{join_url, split_key, StorageClient},
    tasks::{
        repo::TaskStore,
        repo_types::{NewTask, Task, TaskPatch},
    },
};

const FAKE_PUBLIC_URL: &str = "https://fake.local/profile-images";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 24 * 60,
        },
        email: EmailConfig {
            api_key: None,
            api_url: "http://mail.invalid".into(),
            from: "E-Life <no-reply@elife.test>".into(),
        },
        storage: StorageConfig {
            endpoint: "https://fake.local".into(),
            bucket: "profile-images".into(),
            region: "us-east-1".into(),
            access_key: "test".into(),
            secret_key: "test".into(),
            public_url: FAKE_PUBLIC_URL.into(),
        },
    }
}

// --- users ---

#[derive(Default)]
pub struct InMemoryUserStore {
    rows: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new.email) {
            return Err(EmailTaken.into());
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            image: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn update_names(
        &self,
        id: Uuid,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> anyhow::Result<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.iter_mut().find(|u| u.id == id).map(|u| {
            if first_name.is_some() {
                u.first_name = first_name;
            }
            if last_name.is_some() {
                u.last_name = last_name;
            }
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn set_image(&self, id: Uuid, image: &str) -> anyhow::Result<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.iter_mut().find(|u| u.id == id).map(|u| {
            u.image = Some(image.to_string());
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }
}

// --- sessions ---

#[derive(Default)]
struct SessionTables {
    sessions: Vec<Session>,
    members: Vec<SessionMember>,
}

impl SessionTables {
    fn insert_member(&mut self, session_id: Uuid, user_id: Uuid) -> bool {
        let exists = self
            .members
            .iter()
            .any(|m| m.session_id == session_id && m.user_id == user_id);
        if !exists {
            self.members.push(SessionMember {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                joined_at: OffsetDateTime::now_utc(),
            });
        }
        !exists
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    tables: Mutex<SessionTables>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, new: NewSession, member_ids: &[Uuid]) -> anyhow::Result<Session> {
        let mut t = self.tables.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            description: new.description,
            status: new.status,
            is_group: new.is_group,
            start_time: new.start_time,
            end_time: None,
            duration_minutes: new.duration_minutes,
            created_at: now,
            updated_at: now,
        };
        t.sessions.push(session.clone());
        for user_id in member_ids {
            t.insert_member(session.id, *user_id);
        }
        Ok(session)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        let t = self.tables.lock().unwrap();
        Ok(t.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn members(&self, session_id: Uuid) -> anyhow::Result<Vec<SessionMember>> {
        let t = self.tables.lock().unwrap();
        let owner = t
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.user_id);
        let mut rows: Vec<SessionMember> = t
            .members
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| Some(m.user_id) != owner);
        Ok(rows)
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Session>> {
        let t = self.tables.lock().unwrap();
        Ok(t.sessions
            .iter()
            .rev()
            .filter(|s| {
                s.user_id == user_id
                    || t.members
                        .iter()
                        .any(|m| m.session_id == s.id && m.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, patch: SessionPatch) -> anyhow::Result<Option<Session>> {
        let mut t = self.tables.lock().unwrap();
        Ok(t.sessions.iter_mut().find(|s| s.id == id).map(|s| {
            if let Some(title) = patch.title {
                s.title = title;
            }
            if patch.description.is_some() {
                s.description = patch.description;
            }
            if let Some(status) = patch.status {
                s.status = status;
            }
            if patch.start_time.is_some() {
                s.start_time = patch.start_time;
            }
            if patch.end_time.is_some() {
                s.end_time = patch.end_time;
            }
            s.updated_at = OffsetDateTime::now_utc();
            s.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().unwrap();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.id != id);
        t.members.retain(|m| m.session_id != id);
        Ok(t.sessions.len() != before)
    }

    async fn add_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().unwrap();
        Ok(t.insert_member(session_id, user_id))
    }

    async fn remove_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().unwrap();
        let before = t.members.len();
        t.members
            .retain(|m| !(m.session_id == session_id && m.user_id == user_id));
        Ok(t.members.len() != before)
    }
}

// --- tasks ---

#[derive(Default)]
pub struct InMemoryTaskStore {
    rows: Mutex<Vec<Task>>,
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Task>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    async fn create(&self, user_id: Uuid, new: NewTask) -> anyhow::Result<Task> {
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            is_completed: new.is_completed,
            time: new.time,
            duration_minutes: new.duration_minutes,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: TaskPatch,
    ) -> anyhow::Result<Option<Task>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
            .map(|t| {
                if let Some(title) = patch.title {
                    t.title = title;
                }
                if patch.description.is_some() {
                    t.description = patch.description;
                }
                if let Some(done) = patch.is_completed {
                    t.is_completed = done;
                }
                if patch.time.is_some() {
                    t.time = patch.time;
                }
                if patch.duration_minutes.is_some() {
                    t.duration_minutes = patch.duration_minutes;
                }
                t.updated_at = OffsetDateTime::now_utc();
                t.clone()
            }))
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(rows.len() != before)
    }
}

// --- mail ---

/// Keeps every (recipient, code) pair it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        _first_name: Option<&str>,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl EmailSender for FailingMailer {
    async fn send_verification_code(
        &self,
        _to: &str,
        _code: &str,
        _first_name: Option<&str>,
    ) -> anyhow::Result<()> {
        Err(anyhow!("mail provider unavailable"))
    }
}

// --- object storage ---

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<Vec<(String, Bytes)>>,
    fail_deletes: bool,
}

impl FakeStorage {
    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Default::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|(k, _)| k != key);
        objects.push((key.to_string(), body));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes {
            return Err(anyhow!("delete refused"));
        }
        self.objects.lock().unwrap().retain(|(k, _)| k != key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(FAKE_PUBLIC_URL, key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        split_key(FAKE_PUBLIC_URL, url)
    }
}

// --- state ---

impl AppState {
    pub fn fake() -> Self {
        Self::fake_with_outbox().0
    }

    pub fn fake_with_outbox() -> (Self, Arc<RecordingMailer>) {
        let outbox = Arc::new(RecordingMailer::default());
        let state = Self {
            config: Arc::new(test_config()),
            users: Arc::new(InMemoryUserStore::default()),
            sessions: Arc::new(InMemorySessionStore::default()),
            tasks: Arc::new(InMemoryTaskStore::default()),
            mailer: outbox.clone(),
            storage: Arc::new(FakeStorage::default()),
        };
        (state, outbox)
    }

    /// Verified account that can log in with `password`.
    pub async fn seed_user(&self, email: &str, password: &str) -> User {
        let password_hash = hash_password(password.to_string()).await.unwrap();
        self.users
            .create(NewUser {
                email: email.into(),
                password_hash,
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap()
    }

    /// Account without a usable password, for tests that never log in.
    pub async fn seed_account(&self, email: &str) -> User {
        self.users
            .create(NewUser {
                email: email.into(),
                password_hash: "!".into(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap()
    }
}
