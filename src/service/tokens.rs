//! Signed access and refresh tokens.
//!
//! Both kinds are HS256 JWTs sharing one secret and issuer; a `typ` claim keeps
//! a refresh token from being accepted where an access token is expected and
//! the other way round.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("expected a {expected:?} token, got {found:?}")]
    WrongKind { expected: TokenKind, found: TokenKind },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Who a token is issued to: the account and the roles it holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub account_uid: Uuid,
    pub username: String,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub uid: Uuid,
    pub roles: Vec<String>,
    pub typ: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub typ: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub trait TokenIssuer: Send + Sync {
    fn issue_access(&self, principal: &Principal) -> Result<String, TokenError>;
    fn issue_refresh(&self, principal: &Principal) -> Result<String, TokenError>;
    fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError>;
    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError>;
}

pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtTokenIssuer {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
    ) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            access_ttl: Duration::seconds(access_ttl_seconds as i64),
            refresh_ttl: Duration::seconds(refresh_ttl_seconds as i64),
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(TokenError::Encode)
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue_access(&self, principal: &Principal) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: principal.username.clone(),
            uid: principal.account_uid,
            roles: principal.roles.clone(),
            typ: TokenKind::Access,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        };
        self.sign(&claims)
    }

    fn issue_refresh(&self, principal: &Principal) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: principal.username.clone(),
            typ: TokenKind::Refresh,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        };
        self.sign(&claims)
    }

    fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(TokenError::Invalid)?
            .claims;
        if claims.typ != TokenKind::Access {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Access,
                found: claims.typ,
            });
        }
        Ok(claims)
    }

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims = decode::<RefreshClaims>(token, &self.decoding_key, &self.validation)
            .map_err(TokenError::Invalid)?
            .claims;
        if claims.typ != TokenKind::Refresh {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                found: claims.typ,
            });
        }
        Ok(claims)
    }
}
