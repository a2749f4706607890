use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Outcome recorded for a (task, student) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "late")]
    Late,
    #[sea_orm(string_value = "absent")]
    Absent,
}

/// One row per (task, student) pair — the composite primary key is the
/// idempotence guarantee. `checked_in_at` is null for reconciler-produced
/// absences. Rows are never mutated after creation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub task_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub late_minutes: i64,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_task::Entity",
        from = "Column::TaskId",
        to = "super::attendance_task::Column::Id"
    )]
    Task,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::attendance_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Optional filters for a student's attendance history.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub task_id: Option<i64>,
    pub status: Option<AttendanceStatus>,
}

impl Model {
    pub async fn find_for(
        db: &DatabaseConnection,
        task_id: i64,
        student_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id((task_id, student_id)).one(db).await
    }

    pub async fn list_for_task(db: &DatabaseConnection, task_id: i64) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .all(db)
            .await
    }

    /// A student's records, newest first.
    pub async fn list_for_student(
        db: &DatabaseConnection,
        student_id: i64,
        filter: &RecordFilter,
    ) -> Result<Vec<Self>, DbErr> {
        let mut query = Entity::find().filter(Column::StudentId.eq(student_id));
        if let Some(from) = filter.from {
            query = query.filter(Column::CheckedInAt.gte(from));
        }
        if let Some(until) = filter.until {
            query = query.filter(Column::CheckedInAt.lte(until));
        }
        if let Some(task_id) = filter.task_id {
            query = query.filter(Column::TaskId.eq(task_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        query.order_by_desc(Column::CheckedInAt).all(db).await
    }
}
