use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::credentials;

/// Student account, enrolled with one face embedding (held in the embedding
/// store, keyed by `student_number`). The running counters are mutated only
/// by the check-in engine and the absence reconciler.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Institution-issued student number, doubles as the login name.
    pub student_number: String,
    pub email: String,
    pub name: String,
    pub class_name: String,
    pub department: Option<String>,
    pub major: Option<String>,
    pub grade: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub initial_password_hash: String,
    pub is_active: bool,
    pub attendance_count: i64,
    pub late_count: i64,
    pub absence_count: i64,
    pub leave_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
    #[sea_orm(has_many = "super::leave_request::Entity")]
    LeaveRequests,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Optional filters for the student directory listing.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_name: Option<String>,
    pub department: Option<String>,
    pub major: Option<String>,
    pub grade: Option<String>,
    pub is_active: Option<bool>,
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        student_number: &str,
        email: &str,
        name: &str,
        class_name: &str,
        department: Option<&str>,
        major: Option<&str>,
        grade: Option<&str>,
        password: &str,
    ) -> Result<Self, DbErr> {
        let hash = credentials::hash_password(password)?;
        let active = ActiveModel {
            student_number: Set(student_number.to_string()),
            email: Set(email.to_string()),
            name: Set(name.to_string()),
            class_name: Set(class_name.to_string()),
            department: Set(department.map(|s| s.to_string())),
            major: Set(major.map(|s| s.to_string())),
            grade: Set(grade.map(|s| s.to_string())),
            password_hash: Set(hash.clone()),
            initial_password_hash: Set(hash),
            is_active: Set(false),
            attendance_count: Set(0),
            late_count: Set(0),
            absence_count: Set(0),
            leave_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await
    }

    pub async fn get_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn get_by_student_number(
        db: &DatabaseConnection,
        student_number: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::StudentNumber.eq(student_number))
            .one(db)
            .await
    }

    pub async fn get_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<Self>, DbErr> {
        Entity::find().filter(Column::Email.eq(email)).one(db).await
    }

    pub async fn find_by_ids(db: &DatabaseConnection, ids: &[i64]) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::Id.is_in(ids.to_vec()))
            .all(db)
            .await
    }

    /// All students whose class matches any of the given names.
    pub async fn find_by_class_names(
        db: &DatabaseConnection,
        class_names: &[String],
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::ClassName.is_in(class_names.to_vec()))
            .all(db)
            .await
    }

    /// Student directory, ordered by student number.
    pub async fn filter(db: &DatabaseConnection, f: &StudentFilter) -> Result<Vec<Self>, DbErr> {
        let mut query = Entity::find();
        if let Some(ref class_name) = f.class_name {
            query = query.filter(Column::ClassName.eq(class_name));
        }
        if let Some(ref department) = f.department {
            query = query.filter(Column::Department.eq(department));
        }
        if let Some(ref major) = f.major {
            query = query.filter(Column::Major.eq(major));
        }
        if let Some(ref grade) = f.grade {
            query = query.filter(Column::Grade.eq(grade));
        }
        if let Some(is_active) = f.is_active {
            query = query.filter(Column::IsActive.eq(is_active));
        }
        query.order_by_asc(Column::StudentNumber).all(db).await
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

    /// Atomic `col = col + 1` on one of the running counters. Takes any
    /// connection so it can join the caller's transaction.
    pub async fn increment_counter<C: ConnectionTrait>(
        conn: &C,
        student_id: i64,
        counter: Column,
    ) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(counter, Expr::col(counter).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(student_id))
            .exec(conn)
            .await
            .map(|_| ())
    }

    pub async fn delete_by_id(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        Entity::delete_by_id(id).exec(db).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn create_and_find_by_class() {
        let db = setup_test_db().await;

        Model::create(&db, "s1", "s1@test.edu", "Alice", "CS-1", None, None, None, "pw")
            .await
            .unwrap();
        Model::create(&db, "s2", "s2@test.edu", "Bob", "CS-2", None, None, None, "pw")
            .await
            .unwrap();

        let cs1 = Model::find_by_class_names(&db, &["CS-1".to_string()])
            .await
            .unwrap();
        assert_eq!(cs1.len(), 1);
        assert_eq!(cs1[0].student_number, "s1");

        let both = Model::find_by_class_names(&db, &["CS-1".into(), "CS-2".into()])
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
    }

    #[tokio::test]
    async fn counter_increment_is_cumulative() {
        let db = setup_test_db().await;
        let s = Model::create(&db, "s1", "s1@test.edu", "Alice", "CS-1", None, None, None, "pw")
            .await
            .unwrap();

        Model::increment_counter(&db, s.id, Column::LateCount)
            .await
            .unwrap();
        Model::increment_counter(&db, s.id, Column::LateCount)
            .await
            .unwrap();

        let s = Model::get_by_id(&db, s.id).await.unwrap().unwrap();
        assert_eq!(s.late_count, 2);
        assert_eq!(s.attendance_count, 0);
    }

    #[tokio::test]
    async fn initial_password_detector_survives_password_changes() {
        let db = setup_test_db().await;
        let s = Model::create(&db, "s1", "s1@test.edu", "Alice", "CS-1", None, None, None, "first")
            .await
            .unwrap();
        assert!(s.is_initial_password("first"));

        let s = s.set_password(&db, "second").await.unwrap();
        assert!(s.is_active);
        assert!(!s.is_initial_password("second"));

        // Changing back to the original password re-triggers the detector.
        let s = s.set_password(&db, "first").await.unwrap();
        assert!(s.is_initial_password("first"));
        assert!(s.verify_password("first"));
    }
}
