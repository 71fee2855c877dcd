//! Offline-first survey core
//!
//! # Module Structure
//!
//! - **`config`** - environment and file backed configuration
//! - **`local_db`** - SQLite store for survey entities and sync metadata
//! - **`offline`** - pending mutation queue and retry policy
//! - **`media`** - capacity bounded photo store
//! - **`sync`** - push, pull, photo upload and connectivity tracking
//! - **`session`** - tenant isolation on identity changes
//! - **`state`** - the surface the UI layer talks to

pub mod config;
pub mod local_db;
pub mod media;
pub mod offline;
pub mod session;
pub mod state;
pub mod sync;

pub use config::Config;
pub use state::{AppError, AppState, Snapshot};
