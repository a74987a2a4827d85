use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseTransaction, DbErr, Set, SqlErr, TransactionError, TransactionTrait};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::{
        accounts::{self, AccountStatus},
        profiles,
    },
    repo::{accounts::AccountsRepo, profiles::ProfilesRepo, roles::RolesRepo},
    service::claims::FederatedIdentity,
    state::DatabaseClient,
};

pub const DEFAULT_ROLE: &str = "USER";

const MAX_RECONCILE_ATTEMPTS: usize = 2;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("role {0} is missing from the role catalog")]
    RoleNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    Created,
    Linked,
    Unchanged,
}

#[derive(Clone, Debug)]
pub struct ReconcileOutput {
    pub account: accounts::Model,
    pub outcome: Reconciled,
}

#[async_trait]
pub trait AccountsService: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr>;
    /// Maps a federated identity onto exactly one local account.
    async fn reconcile_federated(
        &self,
        identity: &FederatedIdentity,
    ) -> Result<ReconcileOutput, ReconcileError>;
}

pub struct AccountsServiceImpl {
    db: Arc<dyn DatabaseClient>,
    accounts_repo: Arc<dyn AccountsRepo>,
    profiles_repo: Arc<dyn ProfilesRepo>,
    roles_repo: Arc<dyn RolesRepo>,
}

impl AccountsServiceImpl {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        accounts_repo: Arc<dyn AccountsRepo>,
        profiles_repo: Arc<dyn ProfilesRepo>,
        roles_repo: Arc<dyn RolesRepo>,
    ) -> Self {
        Self {
            db,
            accounts_repo,
            profiles_repo,
            roles_repo,
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl AccountsService for AccountsServiceImpl {
    async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr> {
        self.accounts_repo.find_by_email(email).await
    }

    async fn reconcile_federated(
        &self,
        identity: &FederatedIdentity,
    ) -> Result<ReconcileOutput, ReconcileError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let accounts_repo = self.accounts_repo.clone();
            let profiles_repo = self.profiles_repo.clone();
            let roles_repo = self.roles_repo.clone();
            let txn_identity = identity.clone();

            let result = self
                .db
                .conn()
                .transaction::<_, ReconcileOutput, ReconcileError>(move |txn| {
                    Box::pin(async move {
                        reconcile_federated_txn(
                            txn,
                            accounts_repo.as_ref(),
                            profiles_repo.as_ref(),
                            roles_repo.as_ref(),
                            &txn_identity,
                        )
                        .await
                    })
                })
                .await;

            match result {
                Ok(output) => return Ok(output),
                Err(TransactionError::Transaction(ReconcileError::Database(err)))
                    if attempt < MAX_RECONCILE_ATTEMPTS && is_unique_violation(&err) =>
                {
                    // Another login created the account between our read and insert.
                    tracing::warn!(
                        provider = ?identity.provider,
                        error = %err,
                        "account created concurrently, retrying reconciliation"
                    );
                }
                Err(TransactionError::Connection(err)) => return Err(ReconcileError::Database(err)),
                Err(TransactionError::Transaction(err)) => return Err(err),
            }
        }
    }
}

async fn reconcile_federated_txn(
    txn: &DatabaseTransaction,
    accounts_repo: &dyn AccountsRepo,
    profiles_repo: &dyn ProfilesRepo,
    roles_repo: &dyn RolesRepo,
    identity: &FederatedIdentity,
) -> Result<ReconcileOutput, ReconcileError> {
    if let Some(account) = accounts_repo
        .find_by_email_with_txn(txn, &identity.email)
        .await?
    {
        if account.has_provider_subject() {
            return Ok(ReconcileOutput {
                account,
                outcome: Reconciled::Unchanged,
            });
        }

        let mut active: accounts::ActiveModel = account.into();
        active.provider_subject = Set(Some(identity.subject.clone()));
        active.status = Set(AccountStatus::Active);
        active.updated_at = Set(Utc::now().into());
        let account = accounts_repo.update_with_txn(txn, active).await?;

        tracing::info!(
            account_uid = %account.uid,
            provider = ?identity.provider,
            "linked provider subject to existing account"
        );
        return Ok(ReconcileOutput {
            account,
            outcome: Reconciled::Linked,
        });
    }

    let role = roles_repo
        .find_by_name_with_txn(txn, DEFAULT_ROLE)
        .await?
        .ok_or_else(|| ReconcileError::RoleNotFound(DEFAULT_ROLE.to_string()))?;

    let now = Utc::now();
    let account_model = accounts::ActiveModel {
        uid: Set(Uuid::new_v4()),
        email: Set(identity.email.clone()),
        password_hash: Set(None),
        provider: Set(identity.provider),
        provider_subject: Set(Some(identity.subject.clone())),
        status: Set(AccountStatus::Active),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    let account = accounts_repo.insert_with_txn(txn, account_model).await?;

    roles_repo.assign_with_txn(txn, account.id, role.id).await?;

    let profile_model = profiles::ActiveModel {
        account_id: Set(account.id),
        full_name: Set(identity.full_name()),
        avatar_url: Set(Some(identity.avatar_url())),
        phone: Set(None),
        address: Set(None),
        bank_name: Set(None),
        bank_account_number: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    profiles_repo.insert_with_txn(txn, profile_model).await?;

    tracing::info!(
        account_uid = %account.uid,
        provider = ?identity.provider,
        "created account for federated identity"
    );
    Ok(ReconcileOutput {
        account,
        outcome: Reconciled::Created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entities::{account_roles, accounts::Provider, roles},
        repo::{accounts::SeaOrmAccountsRepo, profiles::SeaOrmProfilesRepo, roles::SeaOrmRolesRepo},
        service::claims::IdentityAssertion,
        test_support::{self, TestDb},
    };
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service(db: &TestDb) -> AccountsServiceImpl {
        let client = db.client();
        AccountsServiceImpl::new(
            client.clone(),
            Arc::new(SeaOrmAccountsRepo::new(client.clone())),
            Arc::new(SeaOrmProfilesRepo::new(client.clone())),
            Arc::new(SeaOrmRolesRepo::new(client)),
        )
    }

    fn identity(email: &str, subject: &str) -> FederatedIdentity {
        FederatedIdentity {
            provider: Provider::Google,
            email: email.to_string(),
            name: Some("A B".to_string()),
            picture: None,
            subject: subject.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_account_profile_and_role_link() {
        let db = test_support::seeded_db().await;
        let service = service(&db);

        let output = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();

        assert_eq!(output.outcome, Reconciled::Created);
        let account = output.account;
        assert_eq!(account.email, "a@x.com");
        assert_eq!(account.provider, Provider::Google);
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.password_hash, None);
        assert_eq!(account.provider_subject.as_deref(), Some("g123"));

        let profile = profiles::Entity::find_by_id(account.id)
            .one(db.conn())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.full_name, "A B");
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://ui-avatars.com/api/?name=A+B&background=random")
        );

        let links = account_roles::Entity::find().all(db.conn()).await.unwrap();
        let user_role = roles::Entity::find()
            .all(db.conn())
            .await
            .unwrap()
            .into_iter()
            .find(|role| role.name == DEFAULT_ROLE)
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].account_id, account.id);
        assert_eq!(links[0].role_id, user_role.id);
    }

    #[tokio::test]
    async fn repeated_login_leaves_account_untouched() {
        let db = test_support::seeded_db().await;
        let service = service(&db);

        let first = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();
        let second = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();

        assert_eq!(second.outcome, Reconciled::Unchanged);
        assert_eq!(first.account, second.account);
        assert_eq!(accounts::Entity::find().count(db.conn()).await.unwrap(), 1);
        assert_eq!(profiles::Entity::find().count(db.conn()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn links_subject_to_unlinked_account_once() {
        let db = test_support::seeded_db().await;
        let local = test_support::insert_local_account(&db, "a@x.com").await;
        let service = service(&db);

        let linked = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();
        assert_eq!(linked.outcome, Reconciled::Linked);
        assert_eq!(linked.account.id, local.id);
        assert_eq!(linked.account.provider_subject.as_deref(), Some("g123"));
        assert_eq!(linked.account.status, AccountStatus::Active);
        assert_eq!(linked.account.provider, Provider::Local);

        let again = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();
        assert_eq!(again.outcome, Reconciled::Unchanged);
        assert_eq!(again.account.updated_at, linked.account.updated_at);
        assert_eq!(profiles::Entity::find().count(db.conn()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mixed_case_local_account_is_linked_not_duplicated() {
        let db = test_support::seeded_db().await;
        let local = test_support::insert_local_account(&db, "Jane@Example.com").await;
        let service = service(&db);
        let assertion =
            IdentityAssertion::from_iter([("email", "Jane@Example.com"), ("sub", "g1")]);
        let identity = FederatedIdentity::from_assertion(Provider::Google, &assertion).unwrap();

        let output = service.reconcile_federated(&identity).await.unwrap();

        assert_eq!(output.outcome, Reconciled::Linked);
        assert_eq!(output.account.id, local.id);
        assert_eq!(output.account.email, "Jane@Example.com");
        assert_eq!(output.account.provider_subject.as_deref(), Some("g1"));
        assert_eq!(accounts::Entity::find().count(db.conn()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_default_role_aborts_without_writes() {
        let db = test_support::empty_db().await;
        let service = service(&db);

        let result = service
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await;

        assert!(matches!(result, Err(ReconcileError::RoleNotFound(role)) if role == DEFAULT_ROLE));
        assert_eq!(accounts::Entity::find().count(db.conn()).await.unwrap(), 0);
    }

    /// Hides the account from the first lookup, as if a concurrent login
    /// inserted it right after we looked.
    struct StaleFirstRead {
        inner: SeaOrmAccountsRepo,
        stale: AtomicBool,
    }

    #[async_trait]
    impl AccountsRepo for StaleFirstRead {
        async fn insert_with_txn(
            &self,
            txn: &DatabaseTransaction,
            model: accounts::ActiveModel,
        ) -> Result<accounts::Model, DbErr> {
            self.inner.insert_with_txn(txn, model).await
        }

        async fn update_with_txn(
            &self,
            txn: &DatabaseTransaction,
            model: accounts::ActiveModel,
        ) -> Result<accounts::Model, DbErr> {
            self.inner.update_with_txn(txn, model).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_email_with_txn(
            &self,
            txn: &DatabaseTransaction,
            email: &str,
        ) -> Result<Option<accounts::Model>, DbErr> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_email_with_txn(txn, email).await
        }
    }

    #[tokio::test]
    async fn lost_creation_race_rereads_existing_account() {
        let db = test_support::seeded_db().await;
        let client = db.client();
        service(&db)
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();

        let racing = AccountsServiceImpl::new(
            client.clone(),
            Arc::new(StaleFirstRead {
                inner: SeaOrmAccountsRepo::new(client.clone()),
                stale: AtomicBool::new(true),
            }),
            Arc::new(SeaOrmProfilesRepo::new(client.clone())),
            Arc::new(SeaOrmRolesRepo::new(client)),
        );

        let output = racing
            .reconcile_federated(&identity("a@x.com", "g123"))
            .await
            .unwrap();

        assert_eq!(output.outcome, Reconciled::Unchanged);
        assert_eq!(output.account.email, "a@x.com");
        assert_eq!(accounts::Entity::find().count(db.conn()).await.unwrap(), 1);
        assert_eq!(profiles::Entity::find().count(db.conn()).await.unwrap(), 1);
        assert_eq!(account_roles::Entity::find().count(db.conn()).await.unwrap(), 1);
    }
}
