use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Lifecycle state of an attendance task. Transitions are explicit
/// operations; wall-clock time only gates check-in admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Attendance task model representing the `attendance_tasks` table.
///
/// The eligible roster is snapshotted into `task_roster` in the same
/// transaction that inserts the task row; later class membership changes
/// never alter it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes after `start_time` during which a check-in still counts
    /// as on time.
    pub late_threshold_minutes: i32,
    pub face_required: bool,
    pub status: TaskStatus,
    /// Set by the first absence sweep; a reconciled task is never swept again.
    pub reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::teacher::Entity",
        from = "Column::TeacherId",
        to = "super::teacher::Column::Id"
    )]
    Teacher,
    #[sea_orm(has_many = "super::task_roster::Entity")]
    Roster,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::teacher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
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

impl Model {
    /// Insert the task row and its roster snapshot in one transaction.
    /// The caller has already validated the window and resolved the roster.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        teacher_id: i64,
        title: &str,
        description: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        late_threshold_minutes: i32,
        face_required: bool,
        roster_student_ids: &[i64],
    ) -> Result<Self, DbErr> {
        let txn = db.begin().await?;

        let task = ActiveModel {
            teacher_id: Set(teacher_id),
            title: Set(title.to_string()),
            description: Set(description.map(|s| s.to_string())),
            start_time: Set(start_time),
            end_time: Set(end_time),
            late_threshold_minutes: Set(late_threshold_minutes),
            face_required: Set(face_required),
            status: Set(TaskStatus::Draft),
            reconciled_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let rows = roster_student_ids
            .iter()
            .map(|student_id| super::task_roster::ActiveModel {
                task_id: Set(task.id),
                student_id: Set(*student_id),
                created_at: Set(Utc::now()),
            });
        super::task_roster::Entity::insert_many(rows).exec(&txn).await?;

        txn.commit().await?;
        Ok(task)
    }

    pub async fn get_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn get_by_teacher_id(
        db: &DatabaseConnection,
        teacher_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::TeacherId.eq(teacher_id))
            .order_by_desc(Column::StartTime)
            .all(db)
            .await
    }

    pub async fn edit(
        db: &DatabaseConnection,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        late_threshold_minutes: Option<i32>,
        face_required: Option<bool>,
    ) -> Result<Self, DbErr> {
        let Some(task) = Self::get_by_id(db, id).await? else {
            return Err(DbErr::RecordNotFound("Attendance task not found".into()));
        };

        let mut active = task.into_active_model();
        if let Some(t) = title {
            active.title = Set(t.to_string());
        }
        if let Some(d) = description {
            active.description = Set(Some(d.to_string()));
        }
        if let Some(s) = start_time {
            active.start_time = Set(s);
        }
        if let Some(e) = end_time {
            active.end_time = Set(e);
        }
        if let Some(m) = late_threshold_minutes {
            active.late_threshold_minutes = Set(m);
        }
        if let Some(f) = face_required {
            active.face_required = Set(f);
        }
        active.updated_at = Set(Utc::now());
        active.update(db).await
    }

    /// Takes any connection so status changes can join a caller's
    /// transaction.
    pub async fn set_status<C: ConnectionTrait>(
        conn: &C,
        id: i64,
        status: TaskStatus,
    ) -> Result<Self, DbErr> {
        let Some(task) = Entity::find_by_id(id).one(conn).await? else {
            return Err(DbErr::RecordNotFound("Attendance task not found".into()));
        };
        let mut active = task.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        active.update(conn).await
    }

    pub async fn mark_reconciled<C: ConnectionTrait>(
        conn: &C,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let Some(task) = Entity::find_by_id(id).one(conn).await? else {
            return Err(DbErr::RecordNotFound("Attendance task not found".into()));
        };
        let mut active = task.into_active_model();
        active.reconciled_at = Set(Some(at));
        active.updated_at = Set(Utc::now());
        active.update(conn).await
    }

    pub async fn delete_by_id(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        Entity::delete_by_id(id).exec(db).await.map(|_| ())
    }
}
