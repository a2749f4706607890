use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use db::models::attendance_task::{self, TaskStatus};
use db::models::{student, task_roster};

use crate::error::ServiceError;
use crate::principal::{Principal, Role};
use crate::roster::{self, RosterSelector};

#[derive(Debug, Clone)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub late_threshold_minutes: u32,
    pub face_required: bool,
    /// Exactly one of the two selector lists must be non-empty.
    pub student_ids: Option<Vec<i64>>,
    pub class_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub late_threshold_minutes: Option<u32>,
    pub face_required: Option<bool>,
}

/// Load a task and require the principal to be its owning teacher or an
/// admin.
pub(crate) async fn owned_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<attendance_task::Model, ServiceError> {
    let task = attendance_task::Model::get_by_id(db, task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("attendance task {task_id} not found")))?;

    let permitted = match principal {
        Principal::Admin(_) => true,
        Principal::Teacher(t) => t.id == task.teacher_id,
        Principal::Student(_) => false,
    };
    if !permitted {
        return Err(ServiceError::Forbidden(
            "only the owning teacher may manage this task".into(),
        ));
    }
    Ok(task)
}

/// Create a task in `draft` state with a snapshotted roster.
pub async fn create_task(
    db: &DatabaseConnection,
    principal: &Principal,
    params: CreateTaskParams,
) -> Result<attendance_task::Model, ServiceError> {
    let teacher = match principal {
        Principal::Teacher(t) => t,
        _ => {
            return Err(ServiceError::Forbidden(
                "only teachers can create attendance tasks".into(),
            ));
        }
    };

    if params.start_time >= params.end_time {
        return Err(ServiceError::InvalidArgument(
            "end time must be after start time".into(),
        ));
    }

    let selector = RosterSelector::from_options(params.student_ids, params.class_names)?;
    let students = roster::resolve(db, &selector).await?;
    let roster_ids: Vec<i64> = students.iter().map(|s| s.id).collect();

    let task = attendance_task::Model::create(
        db,
        teacher.id,
        &params.title,
        params.description.as_deref(),
        params.start_time,
        params.end_time,
        params.late_threshold_minutes as i32,
        params.face_required,
        &roster_ids,
    )
    .await?;

    log::info!(
        "task {} created by teacher {} with {} rostered students",
        task.id,
        teacher.id,
        roster_ids.len()
    );
    Ok(task)
}

/// Partial update, allowed while the task is draft or active. Moving the
/// window after check-ins exist is permitted but never reclassifies
/// existing records.
pub async fn update_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
    changes: UpdateTaskParams,
) -> Result<attendance_task::Model, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;
    if !matches!(task.status, TaskStatus::Draft | TaskStatus::Active) {
        return Err(ServiceError::TaskNotActive);
    }

    let new_start = changes.start_time.unwrap_or(task.start_time);
    let new_end = changes.end_time.unwrap_or(task.end_time);
    if new_start >= new_end {
        return Err(ServiceError::InvalidArgument(
            "end time must be after start time".into(),
        ));
    }

    let window_moved = changes.start_time.is_some() || changes.end_time.is_some();
    if window_moved {
        let existing = db::models::attendance_record::Model::list_for_task(db, task.id).await?;
        if !existing.is_empty() {
            log::warn!(
                "task {} window changed with {} records present; existing records keep their classification",
                task.id,
                existing.len()
            );
        }
    }

    let updated = attendance_task::Model::edit(
        db,
        task.id,
        changes.title.as_deref(),
        changes.description.as_deref(),
        changes.start_time,
        changes.end_time,
        changes.late_threshold_minutes.map(|m| m as i32),
        changes.face_required,
    )
    .await?;
    Ok(updated)
}

/// draft → active. Only active tasks admit check-ins.
pub async fn activate_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<attendance_task::Model, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;
    match task.status {
        TaskStatus::Draft => {
            Ok(attendance_task::Model::set_status(db, task.id, TaskStatus::Active).await?)
        }
        _ => Err(ServiceError::TaskNotActive),
    }
}

/// draft/active → cancelled. Takes effect for all subsequent check-ins
/// immediately since the engine re-reads status on every attempt.
pub async fn cancel_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<attendance_task::Model, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;
    match task.status {
        TaskStatus::Draft | TaskStatus::Active => {
            Ok(attendance_task::Model::set_status(db, task.id, TaskStatus::Cancelled).await?)
        }
        _ => Err(ServiceError::TaskNotActive),
    }
}

/// active → completed. Completing an already-completed task is a no-op so
/// the reconciler can call this unconditionally.
pub async fn complete_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<attendance_task::Model, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;
    match task.status {
        TaskStatus::Active => {
            Ok(attendance_task::Model::set_status(db, task.id, TaskStatus::Completed).await?)
        }
        TaskStatus::Completed => Ok(task),
        _ => Err(ServiceError::TaskNotActive),
    }
}

/// Task plus its roster. Admins and teachers may read any task; a student
/// only tasks they are rostered on.
pub async fn get_task_with_roster(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<(attendance_task::Model, Vec<student::Model>), ServiceError> {
    let task = attendance_task::Model::get_by_id(db, task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("attendance task {task_id} not found")))?;

    if principal.role() == Role::Student
        && !task_roster::Model::contains(db, task.id, principal.id()).await?
    {
        return Err(ServiceError::Forbidden(
            "students may only view tasks they are rostered on".into(),
        ));
    }

    let ids = task_roster::Model::student_ids(db, task.id).await?;
    let students = student::Model::find_by_ids(db, &ids).await?;
    Ok((task, students))
}
