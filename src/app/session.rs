//! Session Guard
//!
//! Keeps one user's data from ever being visible to another. Whenever the
//! signed-in identity changes (first sign-in, sign-out, switching users) the
//! local store, its pending mutation queue and the media store are purged
//! before the new identity is admitted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use surveysync::app::session::SessionGuard;
//! # use surveysync::app::{local_db::LocalDatabase, media::MediaStore};
//! # async fn example(db: LocalDatabase, media: MediaStore) -> Result<(), surveysync::app::session::SessionError> {
//! let guard = SessionGuard::new(db, media);
//! let previous = guard.current_identity().await?;
//! guard.on_identity_change(previous.as_deref(), Some("user-2")).await?;
//! guard.admit(Some("user-2")).await?;
//! # Ok(())
//! # }
//! ```

use crate::app::local_db::{LocalDatabase, StoreError};
use crate::app::media::MediaStore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Tenant data could not be removed; the new identity must not be admitted
    #[error("failed to purge local data for identity change: {0}")]
    PurgeFailed(#[source] StoreError),

    #[error("failed to record session identity: {0}")]
    Store(#[from] StoreError),
}

/// Whether an identity change requires a purge
///
/// Only a repeated sign-in of the same, non-null identity keeps local data.
pub fn requires_purge(previous: Option<&str>, new: Option<&str>) -> bool {
    !matches!((previous, new), (Some(p), Some(n)) if p == n)
}

#[derive(Debug, Clone)]
pub struct SessionGuard {
    db: LocalDatabase,
    media: MediaStore,
}

impl SessionGuard {
    pub fn new(db: LocalDatabase, media: MediaStore) -> Self {
        Self { db, media }
    }

    /// Identity whose data the local store currently holds
    pub async fn current_identity(&self) -> Result<Option<String>, SessionError> {
        Ok(self.db.session_user().await?)
    }

    /// Purge tenant data unless `previous` and `new` are the same user
    ///
    /// Returns whether a purge happened.
    pub async fn on_identity_change(
        &self,
        previous: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, SessionError> {
        if !requires_purge(previous, new) {
            return Ok(false);
        }

        tracing::warn!(
            previous = previous.unwrap_or("<none>"),
            new = new.unwrap_or("<none>"),
            "identity changed, purging local data"
        );
        if let Err(e) = self.purge().await {
            tracing::error!(error = %e, "tenant purge failed");
            return Err(SessionError::PurgeFailed(e));
        }
        Ok(true)
    }

    /// Record `identity` as the owner of the local data
    pub async fn admit(&self, identity: Option<&str>) -> Result<(), SessionError> {
        // purge_all already cleared the key for a signed-out session
        if let Some(identity) = identity {
            self.db.set_session_user(identity).await?;
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StoreError> {
        self.db.purge_all().await?;
        self.media.clear().await
    }
}
