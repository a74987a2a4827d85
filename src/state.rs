use sea_orm::{DatabaseConnection, DbErr};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::{
    repo::{
        accounts::SeaOrmAccountsRepo,
        profiles::SeaOrmProfilesRepo,
        roles::{RolesRepo, SeaOrmRolesRepo},
    },
    service::{
        accounts::{AccountsServiceImpl, DEFAULT_ROLE},
        auth::{AuthService, AuthServiceImpl},
        config::ConfigService,
        refresh_tokens::{RedisRefreshTokenStore, RefreshTokenStoreError},
        tokens::JwtTokenIssuer,
    },
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} is not set")]
    MissingConfig(&'static str),
    #[error("database setup failed: {0}")]
    Database(#[from] DbErr),
    #[error("refresh token store unavailable: {0}")]
    RefreshTokenStore(#[from] RefreshTokenStoreError),
}

pub trait DatabaseClient: Send + Sync {
    fn conn(&self) -> &DatabaseConnection;
}

pub struct SeaOrmDatabaseClient {
    conn: DatabaseConnection,
}

impl SeaOrmDatabaseClient {
    pub async fn new(database_url: &str) -> Result<Self, DbErr> {
        let conn = crate::db::connect(database_url).await?;
        crate::schema::apply(&conn).await?;
        Ok(Self { conn })
    }
}

impl DatabaseClient for SeaOrmDatabaseClient {
    fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

pub struct AppState {
    db: Arc<dyn DatabaseClient>,
    auth: Arc<dyn AuthService>,
    config: Arc<dyn ConfigService>,
    http: reqwest::Client,
}

impl AppState {
    pub async fn new(config: Arc<dyn ConfigService>) -> Result<Arc<Self>, StartupError> {
        let values = config.values();
        let database_url = values
            .database_url
            .as_deref()
            .ok_or(StartupError::MissingConfig("DATABASE_URL"))?;
        let redis_url = values
            .redis_url
            .as_deref()
            .ok_or(StartupError::MissingConfig("REDIS_URL"))?;
        let jwt_secret = values
            .jwt_secret
            .as_deref()
            .ok_or(StartupError::MissingConfig("JWT_SECRET"))?;

        let db: Arc<dyn DatabaseClient> = Arc::new(SeaOrmDatabaseClient::new(database_url).await?);
        let accounts_repo = Arc::new(SeaOrmAccountsRepo::new(db.clone()));
        let profiles_repo = Arc::new(SeaOrmProfilesRepo::new(db.clone()));
        let roles_repo = Arc::new(SeaOrmRolesRepo::new(db.clone()));
        roles_repo.ensure_exists(DEFAULT_ROLE).await?;

        let accounts = Arc::new(AccountsServiceImpl::new(
            db.clone(),
            accounts_repo,
            profiles_repo.clone(),
            roles_repo.clone(),
        ));
        let tokens = Arc::new(JwtTokenIssuer::new(
            jwt_secret,
            values.jwt_issuer.clone(),
            values.access_token_ttl_seconds,
            values.refresh_token_ttl_seconds,
        ));
        let refresh_tokens = Arc::new(
            RedisRefreshTokenStore::new(redis_url, values.refresh_token_key_prefix.clone())
                .await?,
        );
        let auth = Arc::new(AuthServiceImpl::new(
            accounts,
            profiles_repo,
            roles_repo,
            tokens,
            refresh_tokens,
            Duration::from_secs(values.refresh_token_ttl_seconds),
        ));

        Ok(Arc::new(Self {
            db,
            auth,
            config,
            http: reqwest::Client::new(),
        }))
    }

    pub fn db(&self) -> &dyn DatabaseClient {
        self.db.as_ref()
    }

    pub fn auth(&self) -> &dyn AuthService {
        self.auth.as_ref()
    }

    pub fn config(&self) -> &dyn ConfigService {
        self.config.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
