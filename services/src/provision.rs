use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::DatabaseConnection;

use db::models::{admin, student, teacher};

use crate::error::ServiceError;
use crate::face::{EmbeddingExtractor, EmbeddingStore};
use crate::principal::Principal;

const INITIAL_PASSWORD_LEN: usize = 10;

/// A freshly created account together with its generated initial password.
/// The password is returned exactly once and stored only as a hash.
#[derive(Debug)]
pub struct ProvisionedAccount<T> {
    pub account: T,
    pub initial_password: String,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub student_number: String,
    pub name: String,
    pub email: String,
    pub class_name: String,
    pub department: Option<String>,
    pub major: Option<String>,
    pub grade: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTeacher {
    pub teacher_number: String,
    pub name: String,
    pub email: String,
    pub title: Option<String>,
    pub department: Option<String>,
}

/// One pre-decoded row of a bulk student import. Spreadsheet and archive
/// decoding happen upstream; by the time rows reach this module they are
/// plain fields plus raw image bytes.
#[derive(Debug, Clone)]
pub struct StudentImportRow {
    pub student: NewStudent,
    pub face_image: Vec<u8>,
}

#[derive(Debug)]
pub struct RowFailure {
    pub row: usize,
    pub student_number: String,
    pub error: ServiceError,
}

/// Outcome of a batch import: successes and failures side by side. A bad
/// row never aborts the rest of the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub created: Vec<ProvisionedAccount<student::Model>>,
    pub failures: Vec<RowFailure>,
}

fn require_admin(principal: &Principal) -> Result<(), ServiceError> {
    match principal {
        Principal::Admin(_) => Ok(()),
        _ => Err(ServiceError::Forbidden(
            "only admins can provision accounts".into(),
        )),
    }
}

fn generate_initial_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INITIAL_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Create a student account, enrolling their face embedding in the same
/// operation. Extraction runs first so a capture failure leaves no account
/// behind.
pub async fn create_student(
    db: &DatabaseConnection,
    store: &dyn EmbeddingStore,
    extractor: &dyn EmbeddingExtractor,
    principal: &Principal,
    new: NewStudent,
    face_image: &[u8],
) -> Result<ProvisionedAccount<student::Model>, ServiceError> {
    require_admin(principal)?;

    if student::Model::get_by_student_number(db, &new.student_number)
        .await?
        .is_some()
    {
        return Err(ServiceError::InvalidArgument(format!(
            "student number {} is already registered",
            new.student_number
        )));
    }
    if student::Model::get_by_email(db, &new.email).await?.is_some() {
        return Err(ServiceError::InvalidArgument(format!(
            "email {} is already registered",
            new.email
        )));
    }

    let embedding = extractor.extract(face_image)?;
    let initial_password = generate_initial_password();

    let account = student::Model::create(
        db,
        &new.student_number,
        &new.email,
        &new.name,
        &new.class_name,
        new.department.as_deref(),
        new.major.as_deref(),
        new.grade.as_deref(),
        &initial_password,
    )
    .await?;

    store.put(&account.student_number, &embedding)?;

    log::info!("student {} provisioned and enrolled", account.student_number);
    Ok(ProvisionedAccount {
        account,
        initial_password,
    })
}

pub async fn create_teacher(
    db: &DatabaseConnection,
    principal: &Principal,
    new: NewTeacher,
) -> Result<ProvisionedAccount<teacher::Model>, ServiceError> {
    require_admin(principal)?;

    if teacher::Model::get_by_teacher_number(db, &new.teacher_number)
        .await?
        .is_some()
    {
        return Err(ServiceError::InvalidArgument(format!(
            "teacher number {} is already registered",
            new.teacher_number
        )));
    }
    if teacher::Model::get_by_email(db, &new.email).await?.is_some() {
        return Err(ServiceError::InvalidArgument(format!(
            "email {} is already registered",
            new.email
        )));
    }

    let initial_password = generate_initial_password();
    let account = teacher::Model::create(
        db,
        &new.teacher_number,
        &new.email,
        &new.name,
        new.title.as_deref(),
        new.department.as_deref(),
        &initial_password,
    )
    .await?;

    Ok(ProvisionedAccount {
        account,
        initial_password,
    })
}

pub async fn create_admin(
    db: &DatabaseConnection,
    principal: &Principal,
    username: &str,
    password: &str,
) -> Result<admin::Model, ServiceError> {
    require_admin(principal)?;

    if admin::Model::get_by_username(db, username).await?.is_some() {
        return Err(ServiceError::InvalidArgument(format!(
            "username {username} is already registered"
        )));
    }
    Ok(admin::Model::create(db, username, password).await?)
}

/// Bulk student import. Each row is processed independently; failures are
/// collected into the report instead of aborting the batch.
pub async fn batch_import_students(
    db: &DatabaseConnection,
    store: &dyn EmbeddingStore,
    extractor: &dyn EmbeddingExtractor,
    principal: &Principal,
    rows: Vec<StudentImportRow>,
) -> Result<BatchReport, ServiceError> {
    require_admin(principal)?;

    let mut report = BatchReport::default();
    for (row, item) in rows.into_iter().enumerate() {
        let student_number = item.student.student_number.clone();
        match create_student(db, store, extractor, principal, item.student, &item.face_image).await
        {
            Ok(created) => report.created.push(created),
            Err(error) => {
                log::warn!("batch import row {row} ({student_number}) failed: {error}");
                report.failures.push(RowFailure {
                    row,
                    student_number,
                    error,
                });
            }
        }
    }
    Ok(report)
}

/// Delete a student account. Roster rows, attendance records and leave
/// requests cascade with the row; the embedding file is removed after the
/// delete commits so a failure can never leave an enrolled student without
/// their embedding.
pub async fn delete_student(
    db: &DatabaseConnection,
    store: &dyn EmbeddingStore,
    principal: &Principal,
    student_number: &str,
) -> Result<(), ServiceError> {
    require_admin(principal)?;

    let student = student::Model::get_by_student_number(db, student_number)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("student {student_number} not found"))
        })?;

    student::Model::delete_by_id(db, student.id).await?;
    store.delete(student_number)?;

    log::info!("student {student_number} deleted");
    Ok(())
}
