//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use uuid::Uuid;

use crate::{
    entities::accounts::{self, AccountStatus, Provider},
    repo::roles::{RolesRepo, SeaOrmRolesRepo},
    schema,
    service::{
        accounts::DEFAULT_ROLE,
        refresh_tokens::{refresh_token_key, RefreshTokenStore, RefreshTokenStoreError},
    },
    state::DatabaseClient,
};

pub struct TestDatabaseClient {
    conn: DatabaseConnection,
}

impl DatabaseClient for TestDatabaseClient {
    fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

/// SQLite database in a temporary directory, removed on drop.
pub struct TestDb {
    client: Arc<TestDatabaseClient>,
    _dir: TempDir,
}

impl TestDb {
    pub fn client(&self) -> Arc<dyn DatabaseClient> {
        self.client.clone()
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.client.conn
    }
}

pub async fn empty_db() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("auth.db").display());
    let conn = Database::connect(&url).await.expect("sqlite connect");
    schema::apply(&conn).await.expect("schema apply");
    TestDb {
        client: Arc::new(TestDatabaseClient { conn }),
        _dir: dir,
    }
}

pub async fn seeded_db() -> TestDb {
    let db = empty_db().await;
    let roles = SeaOrmRolesRepo::new(db.client());
    for role in [DEFAULT_ROLE, "ADMIN"] {
        roles.ensure_exists(role).await.expect("seed role");
    }
    db
}

/// A password account that has never signed in through a provider.
pub async fn insert_local_account(db: &TestDb, email: &str) -> accounts::Model {
    let now = Utc::now();
    accounts::ActiveModel {
        uid: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(Some("$argon2id$v=19$placeholder".to_string())),
        provider: Set(Provider::Local),
        provider_subject: Set(None),
        status: Set(AccountStatus::Pending),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db.conn())
    .await
    .expect("insert local account")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToken {
    pub value: String,
    pub ttl: Duration,
}

pub struct MemoryRefreshTokenStore {
    prefix: String,
    entries: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self {
            prefix: "refreshtoken:".to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn entry(&self, key: &str) -> Option<StoredToken> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn set(
        &self,
        username: &str,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError> {
        self.entries.lock().unwrap().insert(
            refresh_token_key(&self.prefix, username),
            StoredToken {
                value: refresh_token.to_string(),
                ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<Option<String>, RefreshTokenStoreError> {
        Ok(self
            .entry(&refresh_token_key(&self.prefix, username))
            .map(|stored| stored.value))
    }
}

/// Every call fails as if the cache were unreachable.
pub struct UnavailableRefreshTokenStore;

#[async_trait]
impl RefreshTokenStore for UnavailableRefreshTokenStore {
    async fn set(
        &self,
        _username: &str,
        _refresh_token: &str,
        _ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError> {
        Err(unavailable())
    }

    async fn get(&self, _username: &str) -> Result<Option<String>, RefreshTokenStoreError> {
        Err(unavailable())
    }
}

fn unavailable() -> RefreshTokenStoreError {
    RefreshTokenStoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}
