//! PostgreSQL repository for users.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::repository::UserRepository,
        models::users::{PendingReset, User},
    },
    types::{Role, UserId, abbrev_uuid},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    password_hash TEXT,
    roles TEXT[] NOT NULL DEFAULT '{}',
    reset_token_hash TEXT,
    reset_token_issued_at TIMESTAMPTZ,
    authorized_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT users_username_key UNIQUE (username),
    CONSTRAINT users_email_key UNIQUE (email),
    CONSTRAINT users_username_not_empty CHECK (username <> ''),
    CONSTRAINT users_email_not_empty CHECK (email <> '')
);
CREATE UNIQUE INDEX IF NOT EXISTS users_reset_token_hash_idx ON users (reset_token_hash) WHERE reset_token_hash IS NOT NULL;
"#;

const SELECT_USER: &str = "SELECT id, username, email, password_hash, roles, reset_token_hash, reset_token_issued_at, \
     authorized_at, created_at, updated_at FROM users";

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    email: String,
    password_hash: Option<String>,
    roles: Vec<String>,
    reset_token_hash: Option<String>,
    reset_token_issued_at: Option<DateTime<Utc>>,
    authorized_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let reset_token = match (row.reset_token_hash, row.reset_token_issued_at) {
            (Some(token_hash), Some(issued_at)) => Some(PendingReset { token_hash, issued_at }),
            _ => None,
        };

        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            roles: row.roles.into_iter().map(Role::from).collect(),
            reset_token,
            authorized_at: row.authorized_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Users table backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for PgUsers {
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip_all, err)]
    async fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE reset_token_hash = $1"))
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip(self, user), fields(user_id = %abbrev_uuid(&user.id)), err)]
    async fn save(&self, user: &User) -> Result<()> {
        let roles: Vec<String> = user.roles.iter().map(|r| r.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, roles, reset_token_hash, reset_token_issued_at,
                               authorized_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                roles = EXCLUDED.roles,
                reset_token_hash = EXCLUDED.reset_token_hash,
                reset_token_issued_at = EXCLUDED.reset_token_issued_at,
                authorized_at = EXCLUDED.authorized_at,
                updated_at = NOW()
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(roles)
        .bind(user.reset_token.as_ref().map(|t| t.token_hash.clone()))
        .bind(user.reset_token.as_ref().map(|t| t.issued_at))
        .bind(user.authorized_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn table_exists(&self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = 'users')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self), err)]
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}
