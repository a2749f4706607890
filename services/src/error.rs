use sea_orm::DbErr;
use thiserror::Error;

/// Every business-rule failure is a distinct variant; callers never see a
/// generic error without a kind. `Db`, `Io` and `Codec` carry
/// infrastructure faults through unchanged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("task is not open for this operation")]
    TaskNotActive,

    #[error("student is not on the task roster")]
    NotInRoster,

    #[error("check-in window is closed")]
    WindowClosed,

    #[error("attendance already recorded for this task")]
    DuplicateCheckIn,

    #[error("no face embedding enrolled for this student")]
    IdentityNotEnrolled,

    #[error("face does not match enrolled identity (distance {distance:.4}, tolerance {tolerance:.4})")]
    FaceMismatch { distance: f32, tolerance: f32 },

    #[error("face capture failed: {0}")]
    CaptureError(String),

    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}
