use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum RefreshTokenStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("refresh token ttl must be at least one second")]
    InvalidTtl,
}

/// Holds the single live refresh token of each account.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Overwrites whatever token is stored for `username`.
    async fn set(
        &self,
        username: &str,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError>;
    async fn get(&self, username: &str) -> Result<Option<String>, RefreshTokenStoreError>;
}

pub fn refresh_token_key(prefix: &str, username: &str) -> String {
    format!("{}{}", prefix, username)
}

/// Whole seconds for `SET EX`; redis rejects a zero expiry.
fn expiry_seconds(ttl: Duration) -> Result<u64, RefreshTokenStoreError> {
    match ttl.as_secs() {
        0 => Err(RefreshTokenStoreError::InvalidTtl),
        seconds => Ok(seconds),
    }
}

pub struct RedisRefreshTokenStore {
    conn: Arc<Mutex<MultiplexedConnection>>,
    key_prefix: String,
}

impl RedisRefreshTokenStore {
    pub async fn new(redis_url: &str, key_prefix: String) -> Result<Self, RefreshTokenStoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_prefix,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    async fn set(
        &self,
        username: &str,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError> {
        let seconds = expiry_seconds(ttl)?;
        let key = refresh_token_key(&self.key_prefix, username);
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(key, refresh_token, seconds).await?;
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<Option<String>, RefreshTokenStoreError> {
        let key = refresh_token_key(&self.key_prefix, username);
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_prefix_followed_by_username() {
        assert_eq!(
            refresh_token_key("refreshtoken:", "a@x.com"),
            "refreshtoken:a@x.com"
        );
    }

    #[test]
    fn expiry_rejects_sub_second_ttl() {
        assert!(matches!(
            expiry_seconds(Duration::ZERO),
            Err(RefreshTokenStoreError::InvalidTtl)
        ));
        assert!(matches!(
            expiry_seconds(Duration::from_millis(999)),
            Err(RefreshTokenStoreError::InvalidTtl)
        ));
        assert_eq!(
            expiry_seconds(Duration::from_secs(7 * 24 * 60 * 60)).unwrap(),
            604_800
        );
    }

    #[tokio::test]
    async fn redis_store_overwrites_previous_token() -> Result<(), Box<dyn std::error::Error>> {
        let redis_url = match std::env::var("REDIS_URL") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => return Ok(()),
        };

        let prefix = format!("test-{}:", uuid::Uuid::new_v4().simple());
        let store = RedisRefreshTokenStore::new(&redis_url, prefix.clone()).await?;
        let ttl = Duration::from_secs(60);

        store.set("a@x.com", "first", ttl).await?;
        store.set("a@x.com", "second", ttl).await?;

        assert_eq!(store.get("a@x.com").await?, Some("second".to_string()));
        assert_eq!(store.get("b@x.com").await?, None);

        let remaining: i64 = store
            .conn
            .lock()
            .await
            .ttl(refresh_token_key(&prefix, "a@x.com"))
            .await?;
        assert!(remaining > 0 && remaining <= 60, "ttl {remaining}");

        assert!(matches!(
            store.set("a@x.com", "third", Duration::ZERO).await,
            Err(RefreshTokenStoreError::InvalidTtl)
        ));
        assert_eq!(store.get("a@x.com").await?, Some("second".to_string()));
        Ok(())
    }
}
