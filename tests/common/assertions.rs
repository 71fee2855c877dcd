//! Custom assertion macros and utilities
//!
//! Provides assertion helpers for sync outcomes and remote call logs.

use surveysync::app::sync::RemoteCall;

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Unwrap a completed push, panicking on a skip or an error
#[macro_export]
macro_rules! assert_completed {
    ($outcome:expr) => {
        match $outcome {
            Ok(surveysync::app::sync::SyncOutcome::Completed(report)) => report,
            other => panic!("Expected a completed push, got: {:?}", other),
        }
    };
}

/// Assert that a push was skipped for the given reason
#[macro_export]
macro_rules! assert_skipped {
    ($outcome:expr, $reason:pat) => {
        match $outcome {
            Ok(surveysync::app::sync::SyncOutcome::Skipped($reason)) => {}
            other => panic!("Expected a skipped push, got: {:?}", other),
        }
    };
}

/// Assert that a string contains a substring
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        assert!(
            $haystack.contains($needle),
            "Expected '{}' to contain '{}'",
            $haystack,
            $needle
        );
    };
}

/// Tables touched by upserts and deletes, in call order
pub fn written_tables(calls: &[RemoteCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            RemoteCall::Upsert { table, .. } | RemoteCall::Delete { table, .. } => {
                Some(table.clone())
            }
            _ => None,
        })
        .collect()
}

/// Panic unless every write to `before` precedes every write to `after`
pub fn assert_tables_ordered(calls: &[RemoteCall], before: &str, after: &str) {
    let tables = written_tables(calls);
    let last_before = tables.iter().rposition(|t| t == before);
    let first_after = tables.iter().position(|t| t == after);
    if let (Some(last_before), Some(first_after)) = (last_before, first_after) {
        assert!(
            last_before < first_after,
            "{} written after {}: {:?}",
            before,
            after,
            tables
        );
    }
}

/// Whether any upsert or delete touched `id`
pub fn was_written(calls: &[RemoteCall], id: impl ToString) -> bool {
    let id = id.to_string();
    calls.iter().any(|call| match call {
        RemoteCall::Upsert { id: called, .. } | RemoteCall::Delete { id: called, .. } => {
            *called == id
        }
        _ => false,
    })
}
