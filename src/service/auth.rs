use async_trait::async_trait;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        accounts::{self, Provider},
        profiles,
    },
    repo::{profiles::ProfilesRepo, roles::RolesRepo},
    service::{
        accounts::{AccountsService, ReconcileError},
        claims::{ClaimsError, FederatedIdentity, IdentityAssertion},
        refresh_tokens::{RefreshTokenStore, RefreshTokenStoreError},
        tokens::{Principal, TokenError, TokenIssuer},
    },
};

const MISSING_FULL_NAME: &str = "No Name";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid identity assertion: {0}")]
    InvalidAssertion(#[from] ClaimsError),
    #[error("role {0} is missing from the role catalog")]
    RoleNotFound(String),
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("invalid access token")]
    InvalidAccessToken,
    #[error("token signing failed: {0}")]
    Token(#[from] TokenError),
    #[error("refresh token store failed: {0}")]
    Store(#[from] RefreshTokenStoreError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl AuthError {
    /// Whether the caller, rather than this service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidAssertion(_)
                | AuthError::InvalidRefreshToken
                | AuthError::InvalidAccessToken
        )
    }
}

impl From<ReconcileError> for AuthError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::RoleNotFound(role) => AuthError::RoleNotFound(role),
            ReconcileError::Database(err) => AuthError::Database(err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: ProfileResponse,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Caller-facing summary of an account; a missing profile is not an error.
pub fn build_profile_response(
    account: &accounts::Model,
    profile: Option<&profiles::Model>,
) -> ProfileResponse {
    let Some(profile) = profile else {
        return ProfileResponse {
            id: account.uid,
            email: account.email.clone(),
            full_name: MISSING_FULL_NAME.to_string(),
            avatar_url: None,
            phone: None,
            address: None,
            bank_name: None,
            bank_account_number: None,
        };
    };

    ProfileResponse {
        id: account.uid,
        email: account.email.clone(),
        full_name: profile.full_name.clone(),
        avatar_url: profile.avatar_url.clone(),
        phone: profile.phone.clone(),
        address: profile.address.clone(),
        bank_name: profile.bank_name.clone(),
        bank_account_number: profile.bank_account_number.clone(),
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login_federated(
        &self,
        provider: Provider,
        assertion: &IdentityAssertion,
    ) -> Result<AuthResponse, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, AuthError>;
    async fn current_profile(&self, access_token: &str) -> Result<ProfileResponse, AuthError>;
}

pub struct AuthServiceImpl {
    accounts: Arc<dyn AccountsService>,
    profiles_repo: Arc<dyn ProfilesRepo>,
    roles_repo: Arc<dyn RolesRepo>,
    tokens: Arc<dyn TokenIssuer>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    refresh_token_ttl: Duration,
}

impl AuthServiceImpl {
    pub fn new(
        accounts: Arc<dyn AccountsService>,
        profiles_repo: Arc<dyn ProfilesRepo>,
        roles_repo: Arc<dyn RolesRepo>,
        tokens: Arc<dyn TokenIssuer>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self {
            accounts,
            profiles_repo,
            roles_repo,
            tokens,
            refresh_tokens,
            refresh_token_ttl,
        }
    }

    async fn principal(&self, account: &accounts::Model) -> Result<Principal, AuthError> {
        let roles = self.roles_repo.find_names_by_account_id(account.id).await?;
        Ok(Principal {
            account_uid: account.uid,
            username: account.email.clone(),
            roles,
        })
    }

    fn issue_pair(&self, principal: &Principal) -> Result<TokenPairResponse, AuthError> {
        Ok(TokenPairResponse {
            access_token: self.tokens.issue_access(principal)?,
            refresh_token: self.tokens.issue_refresh(principal)?,
        })
    }
}

#[async_trait]
impl AuthService for AuthServiceImpl {
    async fn login_federated(
        &self,
        provider: Provider,
        assertion: &IdentityAssertion,
    ) -> Result<AuthResponse, AuthError> {
        let identity = FederatedIdentity::from_assertion(provider, assertion)?;
        let reconciled = self.accounts.reconcile_federated(&identity).await?;
        let account = reconciled.account;

        let principal = self.principal(&account).await?;
        let tokens = self.issue_pair(&principal)?;

        // The tokens are still handed out when the cache is down; only a
        // later refresh with this token will be refused.
        if let Err(err) = self
            .refresh_tokens
            .set(
                &principal.username,
                &tokens.refresh_token,
                self.refresh_token_ttl,
            )
            .await
        {
            tracing::warn!(
                account_uid = %account.uid,
                error = %err,
                "failed to store refresh token"
            );
        }

        let profile = self.profiles_repo.find_by_account_id(account.id).await?;
        tracing::info!(
            account_uid = %account.uid,
            outcome = ?reconciled.outcome,
            "federated login succeeded"
        );

        Ok(AuthResponse {
            user: build_profile_response(&account, profile.as_ref()),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|err| {
            tracing::debug!(error = %err, "refresh token rejected");
            AuthError::InvalidRefreshToken
        })?;

        let current = self.refresh_tokens.get(&claims.sub).await?;
        if current.as_deref() != Some(refresh_token) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let Some(account) = self.accounts.find_by_email(&claims.sub).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };

        let principal = self.principal(&account).await?;
        let tokens = self.issue_pair(&principal)?;
        self.refresh_tokens
            .set(
                &principal.username,
                &tokens.refresh_token,
                self.refresh_token_ttl,
            )
            .await?;

        tracing::info!(account_uid = %account.uid, "refresh token rotated");
        Ok(tokens)
    }

    async fn current_profile(&self, access_token: &str) -> Result<ProfileResponse, AuthError> {
        let claims = self.tokens.verify_access(access_token).map_err(|err| {
            tracing::debug!(error = %err, "access token rejected");
            AuthError::InvalidAccessToken
        })?;

        let Some(account) = self.accounts.find_by_email(&claims.sub).await? else {
            return Err(AuthError::InvalidAccessToken);
        };
        let profile = self.profiles_repo.find_by_account_id(account.id).await?;
        Ok(build_profile_response(&account, profile.as_ref()))
    }
}
