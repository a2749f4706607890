use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, Set, SqlErr, TransactionTrait,
};
use std::collections::HashSet;

use db::models::attendance_record::{self, AttendanceStatus};
use db::models::attendance_task::{self, TaskStatus};
use db::models::{leave_request, student, task_roster};

use crate::error::ServiceError;
use crate::principal::Principal;
use crate::task::owned_task;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Roster members marked absent by this sweep.
    pub absent: usize,
    /// Roster members excused by an approved leave.
    pub on_leave: usize,
    /// Roster members who already had a record (checked in, or a
    /// concurrent writer beat this sweep to the insert).
    pub already_recorded: usize,
}

/// File a leave request for a task the student is rostered on. Allowed up
/// to the end of the task window; one pending request per pair at a time.
pub async fn file_leave(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<leave_request::Model, ServiceError> {
    let student = match principal {
        Principal::Student(s) => s,
        _ => {
            return Err(ServiceError::Forbidden(
                "only students may file leave requests".into(),
            ));
        }
    };
    if reason.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(
            "a leave request needs a reason".into(),
        ));
    }

    let task = attendance_task::Model::get_by_id(db, task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("attendance task {task_id} not found")))?;
    if matches!(task.status, TaskStatus::Cancelled) {
        return Err(ServiceError::TaskNotActive);
    }
    if now > task.end_time {
        return Err(ServiceError::WindowClosed);
    }
    if !task_roster::Model::contains(db, task.id, student.id).await? {
        return Err(ServiceError::NotInRoster);
    }
    if leave_request::Model::has_pending(db, task.id, student.id).await?
        || leave_request::Model::has_approved(db, task.id, student.id).await?
    {
        return Err(ServiceError::InvalidArgument(
            "a leave request for this task already exists".into(),
        ));
    }

    Ok(leave_request::Model::file(db, task.id, student.id, reason).await?)
}

/// Approve or reject a pending leave request. Only the owning teacher (or
/// an admin acting for them) decides; the decision is stamped with the
/// decider and time.
pub async fn decide_leave(
    db: &DatabaseConnection,
    principal: &Principal,
    leave_id: i64,
    approve: bool,
    now: DateTime<Utc>,
) -> Result<leave_request::Model, ServiceError> {
    let request = leave_request::Model::get_by_id(db, leave_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("leave request {leave_id} not found")))?;
    let task = owned_task(db, principal, request.task_id).await?;

    if request.status != leave_request::LeaveStatus::Pending {
        return Err(ServiceError::InvalidArgument(
            "leave request has already been decided".into(),
        ));
    }

    let decided =
        leave_request::Model::decide(db, request.id, approve, task.teacher_id, now).await?;
    Ok(decided)
}

/// Post-window sweep: materialize `absent` records for roster members with
/// no check-in, crediting approved leaves instead of marking them absent.
///
/// Idempotent: every write of the sweep, the `reconciled_at` stamp
/// included, commits in one transaction, so a failed sweep leaves no
/// partial counts behind and a stamped task is never swept twice. The
/// records table additionally guards each pair against double-marking when
/// a sweep races a last-instant check-in.
pub async fn reconcile_task(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;

    match task.status {
        TaskStatus::Active => {
            if now <= task.end_time {
                return Err(ServiceError::InvalidArgument(
                    "cannot reconcile before the task window has closed".into(),
                ));
            }
        }
        TaskStatus::Completed => {}
        TaskStatus::Draft | TaskStatus::Cancelled => return Err(ServiceError::TaskNotActive),
    }

    if task.reconciled_at.is_some() {
        log::debug!("task {} already reconciled, skipping sweep", task.id);
        return Ok(ReconcileSummary::default());
    }

    let roster = task_roster::Model::student_ids(db, task.id).await?;
    let recorded: HashSet<i64> = attendance_record::Model::list_for_task(db, task.id)
        .await?
        .into_iter()
        .map(|r| r.student_id)
        .collect();

    let mut summary = ReconcileSummary::default();
    let mut excused = Vec::new();
    let mut missing = Vec::new();
    for student_id in roster {
        if recorded.contains(&student_id) {
            summary.already_recorded += 1;
        } else if leave_request::Model::has_approved(db, task.id, student_id).await? {
            excused.push(student_id);
        } else {
            missing.push(student_id);
        }
    }

    let txn = db.begin().await?;

    if task.status == TaskStatus::Active {
        attendance_task::Model::set_status(&txn, task.id, TaskStatus::Completed).await?;
    }

    for student_id in excused {
        student::Model::increment_counter(&txn, student_id, student::Column::LeaveCount).await?;
        summary.on_leave += 1;
    }

    for student_id in missing {
        match insert_absent(&txn, task.id, student_id).await {
            Ok(()) => summary.absent += 1,
            // A check-in landed between our snapshot and this insert; the
            // student's own record wins.
            Err(e) if is_unique_violation(&e) => summary.already_recorded += 1,
            Err(e) => return Err(ServiceError::Db(e)),
        }
    }

    attendance_task::Model::mark_reconciled(&txn, task.id, now).await?;
    txn.commit().await?;

    log::info!(
        "task {} reconciled: {} absent, {} on leave, {} already recorded",
        task.id,
        summary.absent,
        summary.on_leave,
        summary.already_recorded
    );
    Ok(summary)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn insert_absent<C: ConnectionTrait>(
    conn: &C,
    task_id: i64,
    student_id: i64,
) -> Result<(), DbErr> {
    attendance_record::ActiveModel {
        task_id: Set(task_id),
        student_id: Set(student_id),
        checked_in_at: Set(None),
        status: Set(AttendanceStatus::Absent),
        late_minutes: Set(0),
        remark: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    student::Model::increment_counter(conn, student_id, student::Column::AbsenceCount).await
}
