use sea_orm::DatabaseConnection;

use db::models::{admin, student, teacher};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

/// Authenticated account. One sum type instead of three duck-typed user
/// kinds; every operation takes a `Principal` and checks the role itself.
#[derive(Debug, Clone)]
pub enum Principal {
    Admin(admin::Model),
    Teacher(teacher::Model),
    Student(student::Model),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Admin(_) => Role::Admin,
            Principal::Teacher(_) => Role::Teacher,
            Principal::Student(_) => Role::Student,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Principal::Admin(a) => a.id,
            Principal::Teacher(t) => t.id,
            Principal::Student(s) => s.id,
        }
    }

    pub fn verify_credentials(&self, password: &str) -> bool {
        match self {
            Principal::Admin(a) => a.verify_password(password),
            Principal::Teacher(t) => t.verify_password(password),
            Principal::Student(s) => s.verify_password(password),
        }
    }

    /// True while the presented password still matches the generated
    /// initial one. Not a one-shot flag: a user who changes their password
    /// back to the initial value trips this again. Admins have no initial
    /// password and never trip it.
    pub fn is_initial_password(&self, password: &str) -> bool {
        match self {
            Principal::Admin(_) => false,
            Principal::Teacher(t) => t.is_initial_password(password),
            Principal::Student(s) => s.is_initial_password(password),
        }
    }
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub principal: Principal,
    /// Re-computed on every login from the initial-password hash.
    pub needs_password_change: bool,
}

/// Resolve a login name against the three account kinds in order
/// (admin, teacher, student) and verify the password. The login name is
/// the admin username, teacher number or student number respectively.
pub async fn login(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<LoginOutcome, ServiceError> {
    let principal = find_principal(db, username).await?;

    match principal {
        Some(p) if p.verify_credentials(password) => {
            let needs_password_change = p.is_initial_password(password);
            Ok(LoginOutcome {
                principal: p,
                needs_password_change,
            })
        }
        _ => Err(ServiceError::Forbidden(
            "incorrect username or password".into(),
        )),
    }
}

async fn find_principal(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<Principal>, ServiceError> {
    if let Some(a) = admin::Model::get_by_username(db, username).await? {
        return Ok(Some(Principal::Admin(a)));
    }
    if let Some(t) = teacher::Model::get_by_teacher_number(db, username).await? {
        return Ok(Some(Principal::Teacher(t)));
    }
    if let Some(s) = student::Model::get_by_student_number(db, username).await? {
        return Ok(Some(Principal::Student(s)));
    }
    Ok(None)
}

/// Verify the old password, store a new hash, and (for teachers and
/// students) activate the account. Returns the refreshed principal.
pub async fn change_password(
    db: &DatabaseConnection,
    principal: &Principal,
    old_password: &str,
    new_password: &str,
) -> Result<Principal, ServiceError> {
    if !principal.verify_credentials(old_password) {
        return Err(ServiceError::InvalidArgument("incorrect old password".into()));
    }
    if new_password.is_empty() {
        return Err(ServiceError::InvalidArgument("new password must not be empty".into()));
    }

    let updated = match principal {
        Principal::Admin(a) => Principal::Admin(a.set_password(db, new_password).await?),
        Principal::Teacher(t) => Principal::Teacher(t.set_password(db, new_password).await?),
        Principal::Student(s) => Principal::Student(s.set_password(db, new_password).await?),
    };
    Ok(updated)
}
