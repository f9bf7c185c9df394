//! Test utilities shared by unit and HTTP tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum_test::TestServer;
use serde_json::Value;

use crate::{
    AppState,
    auth::{
        password::{Argon2Params, hash_password_with_params},
        session::SessionAccessor,
    },
    build_router,
    config::{Config, DatabaseConfig, EmailConfig, EmailTransportConfig},
    db::{
        handlers::{MemoryUsers, UserRepository},
        models::users::User,
    },
    email::{EmailService, MailError, MailTransport},
    errors::{Error, Result},
    types::Role,
};

/// Fast Argon2 parameters. Never use outside tests.
pub const TEST_ARGON2: Argon2Params = Argon2Params {
    memory_kib: 1024,
    iterations: 1,
    parallelism: 1,
};

const TOKEN_MARKER: &str = "your token is ";

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: Some(DatabaseConfig::Memory),
        ..Default::default()
    };
    config.auth.session.cookie_secure = false;
    config.auth.password.argon2_memory_kib = TEST_ARGON2.memory_kib;
    config.auth.password.argon2_iterations = TEST_ARGON2.iterations;
    config.auth.password.argon2_parallelism = TEST_ARGON2.parallelism;
    config
}

/// Mail settings for use with [`RecordingTransport`]. The file path is never written.
pub fn test_email_config() -> EmailConfig {
    EmailConfig {
        transport: EmailTransportConfig::File {
            path: std::env::temp_dir().join("warden-test-emails").to_string_lossy().to_string(),
        },
        from_email: Some("accounts@example.com".to_string()),
        template: format!("Hello {{{{ User }}}},\n{TOKEN_MARKER}{{{{ Token }}}}\n"),
        ..Default::default()
    }
}

/// An app over an in-memory store, without mail.
pub async fn create_test_app(config: Config) -> (TestServer, AppState, Arc<RecordingTransport>) {
    let users: Arc<dyn UserRepository> = Arc::new(MemoryUsers::new());
    let state = AppState::new(config, users, None);
    let server = TestServer::new(build_router(state.clone()).expect("Failed to build router")).expect("Failed to create test server");
    (server, state, Arc::new(RecordingTransport::default()))
}

/// An app over an in-memory store, with mail captured by the returned transport.
pub async fn create_test_app_with_mail(mut config: Config) -> (TestServer, AppState, Arc<RecordingTransport>) {
    config.email = Some(test_email_config());
    let transport = Arc::new(RecordingTransport::default());
    let mailer = EmailService::new(&test_email_config(), transport.clone()).expect("Failed to create email service");

    let users: Arc<dyn UserRepository> = Arc::new(MemoryUsers::new());
    let state = AppState::new(config, users, Some(mailer));
    let server = TestServer::new(build_router(state.clone()).expect("Failed to build router")).expect("Failed to create test server");
    (server, state, transport)
}

/// Save a user without a password.
pub async fn create_test_user(users: &dyn UserRepository, username: &str, roles: &[&str]) -> User {
    let user = User::new(username, format!("{username}@example.com")).with_roles(roles.iter().map(|r| Role::from(*r)));
    users.save(&user).await.expect("Failed to save test user");
    user
}

/// Save a user who can log in with `password`.
pub async fn create_test_user_with_password(users: &dyn UserRepository, username: &str, password: &str) -> User {
    let mut user = User::new(username, format!("{username}@example.com"));
    user.password_hash = Some(hash_password_with_params(password, Some(TEST_ARGON2)).expect("Failed to hash password"));
    users.save(&user).await.expect("Failed to save test user");
    user
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub from: String,
    pub to: String,
    /// The full formatted message, headers included
    pub body: String,
}

/// Captures outgoing mail instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl RecordingTransport {
    /// A transport that rejects every message.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The token from the most recent message rendered with [`test_email_config`].
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last()?.body;
        let start = body.find(TOKEN_MARKER)? + TOKEN_MARKER.len();
        let token: String = body[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait::async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, from: &str, to: &str, message: &[u8]) -> std::result::Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(SentMail {
            from: from.to_string(),
            to: to.to_string(),
            body: String::from_utf8_lossy(message).to_string(),
        });
        Ok(())
    }
}

/// A session backed by a map, counting id cycles.
#[derive(Default)]
pub struct MapSession {
    data: Mutex<HashMap<String, Value>>,
    cycles: AtomicUsize,
    fail: bool,
}

impl MapSession {
    pub fn with(key: &str, value: Value) -> Self {
        let session = Self::default();
        session.data.lock().unwrap().insert(key.to_string(), value);
        session
    }

    /// A session whose every operation fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.lock().unwrap().clone()
    }

    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(Error::Internal {
                operation: "read session: store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionAccessor for MapSession {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check()?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check()?;
        self.data.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn cycle_id(&self) -> Result<()> {
        self.check()?;
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.data.lock().unwrap().clear();
        Ok(())
    }
}
