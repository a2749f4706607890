pub mod check_in;
pub mod error;
pub mod face;
pub mod principal;
pub mod provision;
pub mod query;
pub mod reconcile;
pub mod roster;
pub mod task;

pub use error::ServiceError;
