//! Property-based tests

pub mod queue_proptest;
pub mod retry_proptest;
