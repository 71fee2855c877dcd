//! Database Schema Definitions
//!
//! Schema version bookkeeping and the table lists used by the tenant purge.

/// DDL applied on every open; every statement is idempotent
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Every table holding tenant data. Order matters only for readability;
/// the purge runs in one transaction.
pub const TENANT_TABLES: &[&str] = &[
    "measurements",
    "floors",
    "projects",
    "speed_tests",
    "pending_mutations",
    "sync_metadata",
];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
