//! Database migrations for the Adgate governance service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_linked_credentials;
mod m2025_06_01_000002_create_oauth_states;
mod m2025_06_01_000003_create_permission_grants;
mod m2025_06_01_000004_create_grant_history;
mod m2025_06_02_000001_create_campaign_approvals;
mod m2025_06_02_000002_create_approval_steps;
mod m2025_06_02_000003_create_approval_history;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_linked_credentials::Migration),
            Box::new(m2025_06_01_000002_create_oauth_states::Migration),
            Box::new(m2025_06_01_000003_create_permission_grants::Migration),
            Box::new(m2025_06_01_000004_create_grant_history::Migration),
            Box::new(m2025_06_02_000001_create_campaign_approvals::Migration),
            Box::new(m2025_06_02_000002_create_approval_steps::Migration),
            Box::new(m2025_06_02_000003_create_approval_history::Migration),
        ]
    }
}
