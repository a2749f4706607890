use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

use crate::credentials;

/// Administrator account. Admins provision the other account kinds and
/// carry no initial-password bookkeeping of their own.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "admins")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        panic!("No RelationDef implemented")
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        password: &str,
    ) -> Result<Self, DbErr> {
        let active = ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(credentials::hash_password(password)?),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await
    }

    pub async fn get_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn get_by_username(
        db: &DatabaseConnection,
        username: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::Username.eq(username))
            .one(db)
            .await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        credentials::verify_password(password, &self.password_hash)
    }

    pub async fn set_password(&self, db: &DatabaseConnection, new_password: &str) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.password_hash = Set(credentials::hash_password(new_password)?);
        active.updated_at = Set(Utc::now());
        active.update(db).await
    }
}
