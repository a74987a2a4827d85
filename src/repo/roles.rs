use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::{
    entities::{account_roles, roles},
    state::DatabaseClient,
};

#[async_trait]
pub trait RolesRepo: Send + Sync {
    async fn find_by_name_with_txn(
        &self,
        txn: &DatabaseTransaction,
        name: &str,
    ) -> Result<Option<roles::Model>, sea_orm::DbErr>;
    async fn assign_with_txn(
        &self,
        txn: &DatabaseTransaction,
        account_id: i64,
        role_id: i64,
    ) -> Result<account_roles::Model, sea_orm::DbErr>;
    async fn find_names_by_account_id(&self, account_id: i64)
        -> Result<Vec<String>, sea_orm::DbErr>;
    /// Inserts the role unless one with the same name already exists.
    async fn ensure_exists(&self, name: &str) -> Result<roles::Model, sea_orm::DbErr>;
}

pub struct SeaOrmRolesRepo {
    db: std::sync::Arc<dyn DatabaseClient>,
}

impl SeaOrmRolesRepo {
    pub fn new(db: std::sync::Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RolesRepo for SeaOrmRolesRepo {
    async fn find_by_name_with_txn(
        &self,
        txn: &DatabaseTransaction,
        name: &str,
    ) -> Result<Option<roles::Model>, sea_orm::DbErr> {
        roles::Entity::find()
            .filter(roles::Column::Name.eq(name))
            .one(txn)
            .await
    }

    async fn assign_with_txn(
        &self,
        txn: &DatabaseTransaction,
        account_id: i64,
        role_id: i64,
    ) -> Result<account_roles::Model, sea_orm::DbErr> {
        account_roles::ActiveModel {
            account_id: Set(account_id),
            role_id: Set(role_id),
            created_at: Set(Utc::now().into()),
        }
        .insert(txn)
        .await
    }

    async fn find_names_by_account_id(
        &self,
        account_id: i64,
    ) -> Result<Vec<String>, sea_orm::DbErr> {
        let role_ids: Vec<i64> = account_roles::Entity::find()
            .select_only()
            .column(account_roles::Column::RoleId)
            .filter(account_roles::Column::AccountId.eq(account_id))
            .into_tuple()
            .all(self.db.conn())
            .await?;
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let roles = roles::Entity::find()
            .filter(roles::Column::Id.is_in(role_ids))
            .order_by_asc(roles::Column::Name)
            .all(self.db.conn())
            .await?;
        Ok(roles.into_iter().map(|role| role.name).collect())
    }

    async fn ensure_exists(&self, name: &str) -> Result<roles::Model, sea_orm::DbErr> {
        if let Some(existing) = roles::Entity::find()
            .filter(roles::Column::Name.eq(name))
            .one(self.db.conn())
            .await?
        {
            return Ok(existing);
        }

        roles::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(self.db.conn())
        .await
    }
}
