//! # Offline Queue
//!
//! Everything the app needs to keep working without a network:
//!
//! - `queue.rs`: the durable pending mutation queue and its push ordering
//! - `retry.rs`: bounded exponential backoff for failed remote applies

pub mod queue;
pub mod retry;

pub use queue::{sort_for_sync, PendingMutationQueue, PendingMutationRecord};
pub use retry::{RetryDecision, RetryPolicy};
