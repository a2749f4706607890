use std::collections::HashMap;

use sea_orm::DatabaseConnection;

use db::models::attendance_record::{self, AttendanceStatus, RecordFilter};
use db::models::student::{self, StudentFilter};
use db::models::{attendance_task, teacher};

use crate::error::ServiceError;
use crate::principal::Principal;
use crate::task::owned_task;

/// One row of a student's attendance history, joined with the task it
/// belongs to and the teacher who published it.
#[derive(Debug)]
pub struct HistoryItem {
    pub record: attendance_record::Model,
    pub task_title: String,
    pub teacher_name: String,
}

/// A student's own attendance history, newest first.
pub async fn student_history(
    db: &DatabaseConnection,
    principal: &Principal,
    filter: &RecordFilter,
) -> Result<Vec<HistoryItem>, ServiceError> {
    let student = match principal {
        Principal::Student(s) => s,
        _ => {
            return Err(ServiceError::Forbidden(
                "attendance history is student-only".into(),
            ));
        }
    };

    let records = attendance_record::Model::list_for_student(db, student.id, filter).await?;

    // Resolve each distinct task once, then its teacher once.
    let mut tasks: HashMap<i64, attendance_task::Model> = HashMap::new();
    let mut teachers: HashMap<i64, String> = HashMap::new();
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        if !tasks.contains_key(&record.task_id) {
            let task = attendance_task::Model::get_by_id(db, record.task_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("task {} not found", record.task_id))
                })?;
            tasks.insert(record.task_id, task);
        }
        let task = &tasks[&record.task_id];
        if !teachers.contains_key(&task.teacher_id) {
            let name = teacher::Model::get_by_id(db, task.teacher_id)
                .await?
                .map(|t| t.name)
                .unwrap_or_default();
            teachers.insert(task.teacher_id, name);
        }
        items.push(HistoryItem {
            task_title: task.title.clone(),
            teacher_name: teachers[&task.teacher_id].clone(),
            record,
        });
    }
    Ok(items)
}

/// Student directory for admins and teachers, ordered by student number.
pub async fn student_directory(
    db: &DatabaseConnection,
    principal: &Principal,
    filter: &StudentFilter,
) -> Result<Vec<student::Model>, ServiceError> {
    match principal {
        Principal::Admin(_) | Principal::Teacher(_) => {}
        Principal::Student(_) => {
            return Err(ServiceError::Forbidden(
                "the student directory is staff-only".into(),
            ));
        }
    }
    Ok(student::Model::filter(db, filter).await?)
}

/// One roster member's standing on a task. `record` is `None` while the
/// student has neither checked in nor been swept absent.
#[derive(Debug)]
pub struct RosterEntry {
    pub student: student::Model,
    pub record: Option<attendance_record::Model>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusTally {
    pub normal: usize,
    pub late: usize,
    pub absent: usize,
    pub pending: usize,
}

#[derive(Debug)]
pub struct TaskAttendanceReport {
    pub task: attendance_task::Model,
    pub entries: Vec<RosterEntry>,
    pub tally: StatusTally,
}

/// Per-task attendance listing with status tallies, for the task's owning
/// teacher or an admin. Every roster member appears exactly once.
pub async fn task_attendance(
    db: &DatabaseConnection,
    principal: &Principal,
    task_id: i64,
) -> Result<TaskAttendanceReport, ServiceError> {
    let task = owned_task(db, principal, task_id).await?;

    let student_ids = db::models::task_roster::Model::student_ids(db, task_id).await?;
    let students = student::Model::find_by_ids(db, &student_ids).await?;
    let mut records: HashMap<i64, attendance_record::Model> =
        attendance_record::Model::list_for_task(db, task_id)
            .await?
            .into_iter()
            .map(|r| (r.student_id, r))
            .collect();

    let mut tally = StatusTally::default();
    let mut entries = Vec::with_capacity(students.len());
    for student in students {
        let record = records.remove(&student.id);
        match record.as_ref().map(|r| r.status) {
            Some(AttendanceStatus::Normal) => tally.normal += 1,
            Some(AttendanceStatus::Late) => tally.late += 1,
            Some(AttendanceStatus::Absent) => tally.absent += 1,
            None => tally.pending += 1,
        }
        entries.push(RosterEntry { student, record });
    }

    Ok(TaskAttendanceReport {
        task,
        entries,
        tally,
    })
}
