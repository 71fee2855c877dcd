//! Integration tests across the local store, sync engine and remotes

pub mod rest_remote;
pub mod sync_scenarios;
pub mod tenant_isolation;
