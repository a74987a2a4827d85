use std::{env, sync::Arc};

use crate::config::Config;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 60 * 60 * 24 * 7;

pub trait ConfigService: Send + Sync {
    fn port(&self) -> u16;
    fn values(&self) -> &Config;
}

pub struct ConfigServiceImpl {
    config: Arc<Config>,
}

impl ConfigServiceImpl {
    fn strip_wrapping_quotes(value: &str) -> &str {
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            let first = bytes[0];
            let last = bytes[value.len() - 1];
            if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
                return &value[1..value.len() - 1];
            }
        }
        value
    }

    fn normalize(value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = Self::strip_wrapping_quotes(trimmed).trim();
        if normalized.is_empty() {
            None
        } else {
            Some(normalized.to_string())
        }
    }

    fn env_nonempty(key: &str) -> Option<String> {
        env::var(key).ok().and_then(|value| Self::normalize(&value))
    }

    fn env_u16(key: &str) -> Option<u16> {
        Self::env_nonempty(key).and_then(|value| value.parse::<u16>().ok())
    }

    fn env_u64(key: &str) -> Option<u64> {
        Self::env_nonempty(key).and_then(|value| value.parse::<u64>().ok())
    }

    fn env_bool(key: &str, default: bool) -> bool {
        Self::env_nonempty(key)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    pub fn new() -> Self {
        Self::from_config(Self::load())
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn load() -> Config {
        let port = Self::env_u16("PORT").unwrap_or(3333);
        let database_url = Self::env_nonempty("DATABASE_URL");
        let redis_url = Self::env_nonempty("REDIS_URL");

        let jwt_secret = Self::env_nonempty("JWT_SECRET");
        let jwt_issuer =
            Self::env_nonempty("JWT_ISSUER").unwrap_or_else(|| "booking-auth-api".to_string());
        let access_token_ttl_seconds = Self::env_u64("ACCESS_TOKEN_TTL_SECONDS")
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS);
        let refresh_token_ttl_seconds = Self::env_u64("REFRESH_TOKEN_TTL_SECONDS")
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECONDS);
        let refresh_token_key_prefix = Self::env_nonempty("REFRESH_TOKEN_KEY_PREFIX")
            .unwrap_or_else(|| "refreshtoken:".to_string());

        let google_client_id = Self::env_nonempty("AUTH_GOOGLE_CLIENT_ID");
        let google_client_secret = Self::env_nonempty("AUTH_GOOGLE_CLIENT_SECRET");
        let google_redirect_url = Self::env_nonempty("AUTH_GOOGLE_REDIRECT_URL");
        let google_mock_enabled = Self::env_bool("AUTH_GOOGLE_MOCK_ENABLED", false);
        let google_authorize_url =
            Self::env_nonempty("AUTH_GOOGLE_AUTHORIZE_URL").unwrap_or_else(|| {
                if google_mock_enabled {
                    "http://localhost:3333/__google_mock__/o/oauth2/v2/auth".to_string()
                } else {
                    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
                }
            });
        let google_token_url = Self::env_nonempty("AUTH_GOOGLE_TOKEN_URL").unwrap_or_else(|| {
            if google_mock_enabled {
                "http://google-mock/token".to_string()
            } else {
                "https://oauth2.googleapis.com/token".to_string()
            }
        });
        let google_userinfo_url =
            Self::env_nonempty("AUTH_GOOGLE_USERINFO_URL").unwrap_or_else(|| {
                if google_mock_enabled {
                    "http://google-mock/v1/userinfo".to_string()
                } else {
                    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
                }
            });

        Config {
            port,
            database_url,
            redis_url,
            jwt_secret,
            jwt_issuer,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            refresh_token_key_prefix,
            google_client_id,
            google_client_secret,
            google_redirect_url,
            google_authorize_url,
            google_token_url,
            google_userinfo_url,
        }
    }
}

impl ConfigService for ConfigServiceImpl {
    fn port(&self) -> u16 {
        self.config.port
    }

    fn values(&self) -> &Config {
        &self.config
    }
}
