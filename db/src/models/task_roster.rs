use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};

/// Roster snapshot row: student `student_id` is eligible for task `task_id`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "task_roster")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub task_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,
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

impl Model {
    pub async fn contains(
        db: &DatabaseConnection,
        task_id: i64,
        student_id: i64,
    ) -> Result<bool, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .filter(Column::StudentId.eq(student_id))
            .count(db)
            .await
            .map(|n| n > 0)
    }

    pub async fn student_ids(db: &DatabaseConnection, task_id: i64) -> Result<Vec<i64>, DbErr> {
        Entity::find()
            .filter(Column::TaskId.eq(task_id))
            .select_only()
            .column(Column::StudentId)
            .into_tuple()
            .all(db)
            .await
    }

    pub async fn task_ids_for_student(
        db: &DatabaseConnection,
        student_id: i64,
    ) -> Result<Vec<i64>, DbErr> {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .select_only()
            .column(Column::TaskId)
            .into_tuple()
            .all(db)
            .await
    }
}
