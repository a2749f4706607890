use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set, SqlErr, TransactionTrait};

use db::models::attendance_record::{self, AttendanceStatus};
use db::models::attendance_task::{self, TaskStatus};
use db::models::{student, task_roster};

use crate::error::ServiceError;
use crate::face::{self, Embedding, EmbeddingStore};
use crate::principal::Principal;

/// Engine configuration, passed explicitly so tests and per-deployment
/// setups can vary it without touching process-wide state.
#[derive(Debug, Clone)]
pub struct CheckInConfig {
    /// Maximum embedding distance still accepted as the same identity
    /// (inclusive).
    pub face_tolerance: f32,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self { face_tolerance: 0.6 }
    }
}

impl CheckInConfig {
    pub fn from_config() -> Self {
        Self {
            face_tolerance: common::config::Config::get().face_tolerance,
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Attempt a check-in for the authenticated student against a task.
///
/// `now` is the server clock; any client-presented timestamp is
/// informational only and never consulted for window checks. On success the
/// attendance record and the matching student counter commit together.
pub async fn check_in(
    db: &DatabaseConnection,
    store: &dyn EmbeddingStore,
    cfg: &CheckInConfig,
    principal: &Principal,
    task_id: i64,
    now: DateTime<Utc>,
    captured: Option<&Embedding>,
) -> Result<attendance_record::Model, ServiceError> {
    let student = match principal {
        Principal::Student(s) => s,
        _ => {
            return Err(ServiceError::Forbidden(
                "only the enrolled student may check in as themselves".into(),
            ));
        }
    };

    // 1. Task must exist and be open for check-ins. Status is re-read on
    //    every attempt, so a cancellation takes effect immediately.
    let task = attendance_task::Model::get_by_id(db, task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("attendance task {task_id} not found")))?;
    if task.status != TaskStatus::Active {
        return Err(ServiceError::TaskNotActive);
    }

    // 2. Roster membership.
    if !task_roster::Model::contains(db, task.id, student.id).await? {
        return Err(ServiceError::NotInRoster);
    }

    // 3. Window gate. The late threshold affects classification only,
    //    never admission.
    if now < task.start_time || now > task.end_time {
        return Err(ServiceError::WindowClosed);
    }

    // 4. Advisory duplicate check; the composite primary key is the
    //    authoritative guard (step 7).
    if attendance_record::Model::find_for(db, task.id, student.id)
        .await?
        .is_some()
    {
        return Err(ServiceError::DuplicateCheckIn);
    }

    // 5. Identity verification.
    if task.face_required {
        let captured = captured.ok_or_else(|| {
            ServiceError::InvalidArgument("this task requires a captured face embedding".into())
        })?;
        let stored = store
            .get(&student.student_number)?
            .ok_or(ServiceError::IdentityNotEnrolled)?;
        let distance = captured.euclidean_distance(&stored);
        if !face::matches(captured, &stored, cfg.face_tolerance) {
            return Err(ServiceError::FaceMismatch {
                distance,
                tolerance: cfg.face_tolerance,
            });
        }
    }

    // 6. Classification. Whole elapsed minutes round up, so the first
    //    second past the threshold already counts as one late minute.
    let elapsed_seconds = (now - task.start_time).num_seconds();
    let threshold_seconds = i64::from(task.late_threshold_minutes) * 60;
    let (status, late_minutes) = if elapsed_seconds <= threshold_seconds {
        (AttendanceStatus::Normal, 0)
    } else {
        let elapsed_minutes = (elapsed_seconds + 59) / 60;
        let late = elapsed_minutes - i64::from(task.late_threshold_minutes);
        (AttendanceStatus::Late, late.max(1))
    };

    // 7. Record + counter commit together or not at all.
    let txn = db.begin().await?;

    let record = attendance_record::ActiveModel {
        task_id: Set(task.id),
        student_id: Set(student.id),
        checked_in_at: Set(Some(now)),
        status: Set(status),
        late_minutes: Set(late_minutes),
        remark: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&txn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ServiceError::DuplicateCheckIn
        } else {
            ServiceError::Db(e)
        }
    })?;

    let counter = match status {
        AttendanceStatus::Normal => student::Column::AttendanceCount,
        AttendanceStatus::Late => student::Column::LateCount,
        AttendanceStatus::Absent => unreachable!("check-in never records an absence"),
    };
    student::Model::increment_counter(&txn, student.id, counter).await?;

    txn.commit().await?;

    log::info!(
        "student {} checked in to task {} as {:?} ({} late minutes)",
        student.id,
        task.id,
        status,
        late_minutes
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FsEmbeddingStore;
    use crate::task::{self, CreateTaskParams};
    use chrono::Duration;
    use db::models::teacher;
    use db::test_utils::setup_test_db;

    struct Fixture {
        db: DatabaseConnection,
        store: FsEmbeddingStore,
        _dir: tempfile::TempDir,
        teacher: Principal,
        student: student::Model,
    }

    async fn fixture() -> Fixture {
        let db = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FsEmbeddingStore::new(dir.path());
        let teacher = Principal::Teacher(
            teacher::Model::create(&db, "t1", "t1@test.edu", "Dr. Li", None, None, "pw")
                .await
                .unwrap(),
        );
        let student = student::Model::create(
            &db, "s1", "s1@test.edu", "Alice", "CS-1", None, None, None, "pw",
        )
        .await
        .unwrap();
        Fixture {
            db,
            store,
            _dir: dir,
            teacher,
            student,
        }
    }

    async fn active_task(
        f: &Fixture,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold: u32,
        face_required: bool,
        roster: Vec<i64>,
    ) -> attendance_task::Model {
        let t = task::create_task(
            &f.db,
            &f.teacher,
            CreateTaskParams {
                title: "Roll call".into(),
                description: None,
                start_time: start,
                end_time: end,
                late_threshold_minutes: threshold,
                face_required,
                student_ids: Some(roster),
                class_names: None,
            },
        )
        .await
        .unwrap();
        task::activate_task(&f.db, &f.teacher, t.id).await.unwrap()
    }

    #[test]
    fn engine_tolerance_comes_from_process_config() {
        let log_file = std::env::temp_dir()
            .join("facemark-engine-test")
            .join("app.log");
        std::env::set_var("DATABASE_PATH", "data/test.sqlite");
        std::env::set_var("LOG_FILE", log_file.to_str().unwrap());
        std::env::set_var("FACE_TOLERANCE", "0.42");
        common::config::Config::init(".env.does-not-exist");

        let cfg = CheckInConfig::from_config();
        assert!((cfg.face_tolerance - 0.42).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn on_time_check_in_is_normal_and_counts() {
        let f = fixture().await;
        let start = Utc::now() - Duration::minutes(5);
        let t = active_task(&f, start, start + Duration::hours(1), 15, false, vec![f.student.id])
            .await;

        let p = Principal::Student(f.student.clone());
        let rec = check_in(&f.db, &f.store, &CheckInConfig::default(), &p, t.id, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(rec.status, AttendanceStatus::Normal);
        assert_eq!(rec.late_minutes, 0);

        let s = student::Model::get_by_id(&f.db, f.student.id).await.unwrap().unwrap();
        assert_eq!(s.attendance_count, 1);
        assert_eq!(s.late_count, 0);
    }

    #[tokio::test]
    async fn late_threshold_boundary() {
        let f = fixture().await;
        let p = Principal::Student(f.student.clone());
        let cfg = CheckInConfig::default();
        let start = Utc::now() - Duration::hours(1);
        let end = start + Duration::hours(3);

        // Exactly at start + threshold: still normal.
        let t = active_task(&f, start, end, 15, false, vec![f.student.id]).await;
        let rec = check_in(&f.db, &f.store, &cfg, &p, t.id, start + Duration::minutes(15), None)
            .await
            .unwrap();
        assert_eq!(rec.status, AttendanceStatus::Normal);
        assert_eq!(rec.late_minutes, 0);

        // One second past the threshold: late by one minute.
        let t = active_task(&f, start, end, 15, false, vec![f.student.id]).await;
        let rec = check_in(
            &f.db,
            &f.store,
            &cfg,
            &p,
            t.id,
            start + Duration::minutes(15) + Duration::seconds(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(rec.status, AttendanceStatus::Late);
        assert_eq!(rec.late_minutes, 1);

        // Twelve minutes in with threshold ten: two late minutes.
        let t = active_task(&f, start, end, 10, false, vec![f.student.id]).await;
        let rec = check_in(&f.db, &f.store, &cfg, &p, t.id, start + Duration::minutes(12), None)
            .await
            .unwrap();
        assert_eq!(rec.status, AttendanceStatus::Late);
        assert_eq!(rec.late_minutes, 2);
    }

    #[tokio::test]
    async fn window_gate_dominates_everything_else() {
        let f = fixture().await;
        let p = Principal::Student(f.student.clone());
        let cfg = CheckInConfig::default();
        let start = Utc::now() + Duration::hours(1);
        // Face-required task, enrolled identity, perfect embedding — still
        // rejected outside the window.
        f.store.put("s1", &Embedding(vec![0.0; 8])).unwrap();
        let t = active_task(&f, start, start + Duration::hours(1), 15, true, vec![f.student.id])
            .await;

        let cap = Embedding(vec![0.0; 8]);
        let before = check_in(&f.db, &f.store, &cfg, &p, t.id, start - Duration::seconds(1), Some(&cap))
            .await
            .unwrap_err();
        assert!(matches!(before, ServiceError::WindowClosed));

        let after = check_in(
            &f.db,
            &f.store,
            &cfg,
            &p,
            t.id,
            start + Duration::hours(1) + Duration::seconds(1),
            Some(&cap),
        )
        .await
        .unwrap_err();
        assert!(matches!(after, ServiceError::WindowClosed));
    }

    #[tokio::test]
    async fn inactive_tasks_and_strangers_are_rejected() {
        let f = fixture().await;
        let p = Principal::Student(f.student.clone());
        let cfg = CheckInConfig::default();
        let now = Utc::now();

        // Draft task was never opened.
        let draft = task::create_task(
            &f.db,
            &f.teacher,
            CreateTaskParams {
                title: "Draft".into(),
                description: None,
                start_time: now - Duration::minutes(5),
                end_time: now + Duration::hours(1),
                late_threshold_minutes: 0,
                face_required: false,
                student_ids: Some(vec![f.student.id]),
                class_names: None,
            },
        )
        .await
        .unwrap();
        let err = check_in(&f.db, &f.store, &cfg, &p, draft.id, now, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::TaskNotActive));

        // Cancelled task rejects immediately.
        let t = active_task(&f, now - Duration::minutes(5), now + Duration::hours(1), 0, false, vec![f.student.id]).await;
        task::cancel_task(&f.db, &f.teacher, t.id).await.unwrap();
        let err = check_in(&f.db, &f.store, &cfg, &p, t.id, now, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::TaskNotActive));

        // Student outside the roster.
        let outsider = student::Model::create(
            &f.db, "s2", "s2@test.edu", "Bob", "CS-2", None, None, None, "pw",
        )
        .await
        .unwrap();
        let t = active_task(&f, now - Duration::minutes(5), now + Duration::hours(1), 0, false, vec![f.student.id]).await;
        let err = check_in(
            &f.db,
            &f.store,
            &cfg,
            &Principal::Student(outsider),
            t.id,
            now,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotInRoster));

        // Unknown task.
        let err = check_in(&f.db, &f.store, &cfg, &p, 424242, now, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // Teachers cannot check in.
        let err = check_in(&f.db, &f.store, &cfg, &f.teacher, t.id, now, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn second_attempt_is_a_duplicate() {
        let f = fixture().await;
        let p = Principal::Student(f.student.clone());
        let cfg = CheckInConfig::default();
        let now = Utc::now();
        let t = active_task(&f, now - Duration::minutes(1), now + Duration::hours(1), 0, false, vec![f.student.id]).await;

        let first = check_in(&f.db, &f.store, &cfg, &p, t.id, now, None).await.unwrap();
        let err = check_in(&f.db, &f.store, &cfg, &p, t.id, now + Duration::minutes(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateCheckIn));

        // The original record is untouched.
        let kept = attendance_record::Model::find_for(&f.db, t.id, f.student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.checked_in_at, first.checked_in_at);
    }

    #[tokio::test]
    async fn face_verification_paths() {
        let f = fixture().await;
        let p = Principal::Student(f.student.clone());
        let cfg = CheckInConfig { face_tolerance: 0.5 };
        let now = Utc::now();
        let start = now - Duration::minutes(1);
        let end = now + Duration::hours(1);

        // Missing captured embedding.
        let t = active_task(&f, start, end, 0, true, vec![f.student.id]).await;
        let err = check_in(&f.db, &f.store, &cfg, &p, t.id, now, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));

        // Not enrolled.
        let cap = Embedding(vec![0.0, 0.0]);
        let err = check_in(&f.db, &f.store, &cfg, &p, t.id, now, Some(&cap)).await.unwrap_err();
        assert!(matches!(err, ServiceError::IdentityNotEnrolled));

        // Distance beyond tolerance.
        f.store.put("s1", &Embedding(vec![1.0, 0.0])).unwrap();
        let err = check_in(&f.db, &f.store, &cfg, &p, t.id, now, Some(&cap)).await.unwrap_err();
        assert!(matches!(err, ServiceError::FaceMismatch { .. }));

        // Distance exactly at tolerance passes (inclusive boundary).
        f.store.put("s1", &Embedding(vec![0.5, 0.0])).unwrap();
        let rec = check_in(&f.db, &f.store, &cfg, &p, t.id, now, Some(&cap)).await.unwrap();
        assert_eq!(rec.status, AttendanceStatus::Normal);
    }
}
