pub mod admin;
pub mod attendance_record;
pub mod attendance_task;
pub mod leave_request;
pub mod student;
pub mod task_roster;
pub mod teacher;
