pub mod m202602010001_create_admins;
pub mod m202602010002_create_teachers;
pub mod m202602010003_create_students;
pub mod m202602010004_create_attendance_tasks;
pub mod m202602010005_create_task_roster;
pub mod m202602010006_create_attendance_records;
pub mod m202602010007_create_leave_requests;
