use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202602010001_create_admins::Migration),
            Box::new(migrations::m202602010002_create_teachers::Migration),
            Box::new(migrations::m202602010003_create_students::Migration),
            Box::new(migrations::m202602010004_create_attendance_tasks::Migration),
            Box::new(migrations::m202602010005_create_task_roster::Migration),
            Box::new(migrations::m202602010006_create_attendance_records::Migration),
            Box::new(migrations::m202602010007_create_leave_requests::Migration),
        ]
    }
}
