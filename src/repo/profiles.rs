use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, EntityTrait};

use crate::{entities::profiles, state::DatabaseClient};

#[async_trait]
pub trait ProfilesRepo: Send + Sync {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: profiles::ActiveModel,
    ) -> Result<profiles::Model, sea_orm::DbErr>;
    async fn find_by_account_id(
        &self,
        account_id: i64,
    ) -> Result<Option<profiles::Model>, sea_orm::DbErr>;
}

pub struct SeaOrmProfilesRepo {
    db: std::sync::Arc<dyn DatabaseClient>,
}

impl SeaOrmProfilesRepo {
    pub fn new(db: std::sync::Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfilesRepo for SeaOrmProfilesRepo {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: profiles::ActiveModel,
    ) -> Result<profiles::Model, sea_orm::DbErr> {
        model.insert(txn).await
    }

    async fn find_by_account_id(
        &self,
        account_id: i64,
    ) -> Result<Option<profiles::Model>, sea_orm::DbErr> {
        profiles::Entity::find_by_id(account_id)
            .one(self.db.conn())
            .await
    }
}
