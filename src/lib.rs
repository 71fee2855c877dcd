//! SurveySync - Main Library
//!
//! SurveySync is the offline-first data core of a field survey application
//! used to record cellular signal measurements, speed tests and install
//! photos on building floor plans. All writes land in a local SQLite store
//! first and are pushed to a remote authority when connectivity allows.
//!
//! # Module Structure
//!
//! - **`shared`** - platform-agnostic survey types, validation and config
//!   - Project, floor, measurement, speed test and photo records
//!   - Error types
//!   - `surveysync.toml` schema
//!
//! - **`app`** - the device-side runtime
//!   - Local store with a durable pending mutation queue
//!   - Sync engine: ordered push with retry and backoff, wholesale pull
//!   - Bounded photo store with FIFO eviction
//!   - Session guard that purges tenant data on identity change
//!   - `AppState`, the UI-facing surface
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surveysync::app::{AppState, Config};
//! use surveysync::app::sync::MemoryRemote;
//! use surveysync::shared::survey::Project;
//!
//! # async fn example() -> Result<(), surveysync::app::AppError> {
//! let remote = Arc::new(MemoryRemote::new());
//! let state = AppState::init(Config::from_env()?, remote.clone(), remote).await?;
//! state.set_online(true);
//! state.sign_in("user-1").await?;
//! state.add_project(Project::new("Clinic")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Every store handle is a cheap `Clone` over a shared pool. The sync engine
//! is shared as `Arc<SyncEngine>` between the UI surface and the background
//! worker; a second concurrent push is skipped rather than queued.

/// Shared types and data structures
pub mod shared;

/// Device-side runtime
pub mod app;
