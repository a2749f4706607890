//! End-to-end flow through the attendance engine: provisioning, task
//! publication, windowed check-in with face verification, and the
//! post-window absence sweep.

use chrono::{Duration, Utc};
use futures::future::join_all;
use sea_orm::DatabaseConnection;

use db::models::attendance_record::AttendanceStatus;
use db::models::{admin, student, teacher};
use db::test_utils::setup_test_db;
use services::check_in::{check_in, CheckInConfig};
use services::face::{Embedding, EmbeddingExtractor, FsEmbeddingStore};
use services::principal::Principal;
use services::provision::{self, NewStudent};
use services::reconcile::reconcile_task;
use services::task::{self, CreateTaskParams};
use services::ServiceError;

/// Treats the image bytes as the embedding itself, so tests control the
/// vector a capture produces.
struct ByteExtractor;

impl EmbeddingExtractor for ByteExtractor {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ServiceError> {
        if image.is_empty() {
            return Err(ServiceError::CaptureError("no face detected".into()));
        }
        Ok(Embedding(image.iter().map(|b| f32::from(*b)).collect()))
    }
}

async fn seed_admin(db: &DatabaseConnection) -> Principal {
    Principal::Admin(admin::Model::create(db, "root", "pw").await.unwrap())
}

async fn seed_teacher(db: &DatabaseConnection) -> Principal {
    Principal::Teacher(
        teacher::Model::create(db, "t1", "t1@test.edu", "Dr. Li", None, None, "pw")
            .await
            .unwrap(),
    )
}

async fn enroll(
    db: &DatabaseConnection,
    store: &FsEmbeddingStore,
    admin: &Principal,
    number: &str,
    face: &[u8],
) -> student::Model {
    provision::create_student(
        db,
        store,
        &ByteExtractor,
        admin,
        NewStudent {
            student_number: number.into(),
            name: format!("Student {number}"),
            email: format!("{number}@test.edu"),
            class_name: "CS-1".into(),
            department: None,
            major: None,
            grade: None,
        },
        face,
    )
    .await
    .unwrap()
    .account
}

#[tokio::test]
async fn full_session_normal_late_and_swept_absent() {
    let db = setup_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let store = FsEmbeddingStore::new(dir.path());
    let admin = seed_admin(&db).await;
    let teacher = seed_teacher(&db).await;

    let a = enroll(&db, &store, &admin, "s1", &[10, 20]).await;
    let b = enroll(&db, &store, &admin, "s2", &[30, 40]).await;
    let c = enroll(&db, &store, &admin, "s3", &[50, 60]).await;

    let start = Utc::now() - Duration::minutes(20);
    let end = start + Duration::minutes(30);
    let t = task::create_task(
        &db,
        &teacher,
        CreateTaskParams {
            title: "Lecture 1".into(),
            description: None,
            start_time: start,
            end_time: end,
            late_threshold_minutes: 10,
            face_required: true,
            student_ids: None,
            class_names: Some(vec!["CS-1".into()]),
        },
    )
    .await
    .unwrap();
    let t = task::activate_task(&db, &teacher, t.id).await.unwrap();
    let cfg = CheckInConfig::default();

    // A checks in 5 minutes after the window opens, face matching.
    let rec_a = check_in(
        &db,
        &store,
        &cfg,
        &Principal::Student(a.clone()),
        t.id,
        start + Duration::minutes(5),
        Some(&Embedding(vec![10.0, 20.0])),
    )
    .await
    .unwrap();
    assert_eq!(rec_a.status, AttendanceStatus::Normal);
    assert_eq!(rec_a.late_minutes, 0);

    // B checks in 12 minutes in with a 10 minute threshold: 2 minutes late.
    let rec_b = check_in(
        &db,
        &store,
        &cfg,
        &Principal::Student(b.clone()),
        t.id,
        start + Duration::minutes(12),
        Some(&Embedding(vec![30.0, 40.0])),
    )
    .await
    .unwrap();
    assert_eq!(rec_b.status, AttendanceStatus::Late);
    assert_eq!(rec_b.late_minutes, 2);

    // A face that doesn't match the enrolled identity is rejected even
    // inside the window.
    let err = check_in(
        &db,
        &store,
        &cfg,
        &Principal::Student(c.clone()),
        t.id,
        start + Duration::minutes(6),
        Some(&Embedding(vec![0.0, 0.0])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::FaceMismatch { .. }));

    // C never checks in; the sweep marks them absent and completes the task.
    let summary = reconcile_task(&db, &teacher, t.id, end + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(summary.absent, 1);
    assert_eq!(summary.already_recorded, 2);

    let a = student::Model::get_by_id(&db, a.id).await.unwrap().unwrap();
    let b = student::Model::get_by_id(&db, b.id).await.unwrap().unwrap();
    let c = student::Model::get_by_id(&db, c.id).await.unwrap().unwrap();
    assert_eq!((a.attendance_count, a.late_count, a.absence_count), (1, 0, 0));
    assert_eq!((b.attendance_count, b.late_count, b.absence_count), (0, 1, 0));
    assert_eq!((c.attendance_count, c.late_count, c.absence_count), (0, 0, 1));

    // Sweeping again is a no-op.
    let again = reconcile_task(&db, &teacher, t.id, end + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(again.absent, 0);
    let c = student::Model::get_by_id(&db, c.id).await.unwrap().unwrap();
    assert_eq!(c.absence_count, 1);
}

#[tokio::test]
async fn concurrent_check_ins_record_exactly_once() {
    let db = setup_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let store = FsEmbeddingStore::new(dir.path());
    let admin = seed_admin(&db).await;
    let teacher = seed_teacher(&db).await;
    let s = enroll(&db, &store, &admin, "s1", &[1]).await;

    let start = Utc::now() - Duration::minutes(1);
    let t = task::create_task(
        &db,
        &teacher,
        CreateTaskParams {
            title: "Roll call".into(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
            late_threshold_minutes: 15,
            face_required: false,
            student_ids: Some(vec![s.id]),
            class_names: None,
        },
    )
    .await
    .unwrap();
    let t = task::activate_task(&db, &teacher, t.id).await.unwrap();

    let cfg = CheckInConfig::default();
    let now = Utc::now();
    let principal = Principal::Student(s.clone());
    let attempts = (0..8).map(|_| {
        let db = db.clone();
        let store = &store;
        let cfg = &cfg;
        let principal = &principal;
        async move { check_in(&db, store, cfg, principal, t.id, now, None).await }
    });
    let outcomes = join_all(attempts).await;

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(err, ServiceError::DuplicateCheckIn));
        }
    }

    let s = student::Model::get_by_id(&db, s.id).await.unwrap().unwrap();
    assert_eq!(s.attendance_count, 1);
}
