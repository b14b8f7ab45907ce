pub use sea_orm_migration::prelude::*;

mod m20250114_000000_create_users;
mod m20250114_000001_create_templates;
mod m20250114_000002_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250114_000000_create_users::Migration),
            Box::new(m20250114_000001_create_templates::Migration),
            Box::new(m20250114_000002_create_audit_logs::Migration),
        ]
    }
}
