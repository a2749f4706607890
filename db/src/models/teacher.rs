use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

use crate::credentials;

/// Teacher account. Teachers own attendance tasks and approve leave.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "teachers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Institution-issued teacher number, doubles as the login name.
    pub teacher_number: String,
    pub email: String,
    pub name: String,
    pub title: Option<String>,
    pub department: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Hash of the generated first password, kept for the permanent
    /// "still on the initial password" check at login.
    #[serde(skip_serializing)]
    pub initial_password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_task::Entity")]
    Tasks,
}

impl Related<super::attendance_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tasks.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Create a teacher account. The password is the generated initial one;
    /// its hash is stored twice, as the live credential and as the
    /// initial-password reference.
    pub async fn create(
        db: &DatabaseConnection,
        teacher_number: &str,
        email: &str,
        name: &str,
        title: Option<&str>,
        department: Option<&str>,
        password: &str,
    ) -> Result<Self, DbErr> {
        let hash = credentials::hash_password(password)?;
        let active = ActiveModel {
            teacher_number: Set(teacher_number.to_string()),
            email: Set(email.to_string()),
            name: Set(name.to_string()),
            title: Set(title.map(|s| s.to_string())),
            department: Set(department.map(|s| s.to_string())),
            password_hash: Set(hash.clone()),
            initial_password_hash: Set(hash),
            is_active: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await
    }

    pub async fn get_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn get_by_teacher_number(
        db: &DatabaseConnection,
        teacher_number: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::TeacherNumber.eq(teacher_number))
            .one(db)
            .await
    }

    pub async fn get_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<Self>, DbErr> {
        Entity::find().filter(Column::Email.eq(email)).one(db).await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        credentials::verify_password(password, &self.password_hash)
    }

    /// True while the presented password still matches the initial one.
    pub fn is_initial_password(&self, password: &str) -> bool {
        credentials::verify_password(password, &self.initial_password_hash)
    }

    /// Change the password and activate the account.
    pub async fn set_password(&self, db: &DatabaseConnection, new_password: &str) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.password_hash = Set(credentials::hash_password(new_password)?);
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(db).await
    }

    pub async fn delete_by_id(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        Entity::delete_by_id(id).exec(db).await.map(|_| ())
    }
}
