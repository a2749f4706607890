use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Leave request for a (task, student) pair. An approved leave suppresses
/// the reconciler's absent outcome for that pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "leave_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub task_id: i64,
    pub student_id: i64,
    pub reason: String,
    pub status: LeaveStatus,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
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
    #[sea_orm(
        belongs_to = "super::teacher::Entity",
        from = "Column::ApprovedBy",
        to = "super::teacher::Column::Id"
    )]
    Approver,
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

impl Model {
    pub async fn file(
        db: &DatabaseConnection,
        task_id: i64,
        student_id: i64,
        reason: &str,
    ) -> Result<Self, DbErr> {
        let active = ActiveModel {
            task_id: Set(task_id),
            student_id: Set(student_id),
            reason: Set(reason.to_string()),
            status: Set(LeaveStatus::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await
    }

    pub async fn get_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn has_pending(
        db: &DatabaseConnection,
        task_id: i64,
        student_id: i64,
    ) -> Result<bool, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::Status.eq(LeaveStatus::Pending))
            .count(db)
            .await
            .map(|n| n > 0)
    }

    pub async fn has_approved(
        db: &DatabaseConnection,
        task_id: i64,
        student_id: i64,
    ) -> Result<bool, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::Status.eq(LeaveStatus::Approved))
            .count(db)
            .await
            .map(|n| n > 0)
    }

    pub async fn list_for_task(db: &DatabaseConnection, task_id: i64) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .order_by_asc(Column::CreatedAt)
            .all(db)
            .await
    }

    /// Record the teacher's decision on a pending request.
    pub async fn decide(
        db: &DatabaseConnection,
        id: i64,
        approve: bool,
        teacher_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let Some(request) = Self::get_by_id(db, id).await? else {
            return Err(DbErr::RecordNotFound("Leave request not found".into()));
        };
        let mut active = request.into_active_model();
        active.status = Set(if approve {
            LeaveStatus::Approved
        } else {
            LeaveStatus::Rejected
        });
        active.approved_by = Set(Some(teacher_id));
        active.approved_at = Set(Some(at));
        active.update(db).await
    }
}
