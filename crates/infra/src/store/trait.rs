use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agora_auth::LookupError;
use agora_core::AccountId;

/// Store operation error.
///
/// These are **infrastructure errors** (a procedure call failed, timed out, or
/// returned something unusable) as opposed to domain errors. Messages carry the
/// store's own text so operators can diagnose the root cause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Database(String),

    /// The caller stopped waiting; the procedure may still have committed.
    #[error(
        "{operation} timed out after {after:?}; outcome unknown, run integrity validation before trusting state"
    )]
    Timeout { operation: &'static str, after: Duration },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} returned {detail}")]
    InvalidResult { operation: &'static str, detail: String },
}

impl From<StoreError> for LookupError {
    fn from(value: StoreError) -> Self {
        LookupError::new(value.to_string())
    }
}

/// What the community-reset procedure reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub deleted_posts: i64,
    pub deleted_groups: i64,
    pub created_groups: i64,
    pub integrity_check_passed: bool,
    pub performed_by: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
}

/// Store-side destructive procedures.
///
/// ## Atomicity contract
///
/// Each call must execute as a single transaction at the store: a non-error
/// return means "fully applied", an error means "nothing applied". Stores must
/// also serialize concurrent calls (single writer or advisory lock) so two
/// resets can never interleave their delete/recreate phases.
///
/// Counts are `Option` because a procedure can return SQL `NULL`; callers treat
/// a missing or negative count as failure.
#[async_trait::async_trait]
pub trait LifecycleProcedures: Send + Sync {
    /// Delete every post together with its dependent likes and comments.
    async fn cleanup_all_posts(&self) -> Result<Option<i64>, StoreError>;

    /// Delete every group together with its memberships.
    async fn cleanup_all_groups(&self) -> Result<Option<i64>, StoreError>;

    /// Delete all posts and groups, then recreate the canonical seed groups.
    async fn perform_community_reset(&self, admin_id: Option<&AccountId>) -> Result<ResetOutcome, StoreError>;
}

/// Read-only referential-integrity checks.
#[async_trait::async_trait]
pub trait IntegrityProbe: Send + Sync {
    /// The store's own integrity check.
    async fn validate_data_integrity(&self) -> Result<bool, StoreError>;

    /// Likes whose post row no longer exists.
    async fn count_orphaned_post_likes(&self) -> Result<i64, StoreError>;

    /// Memberships whose group row no longer exists.
    async fn count_orphaned_group_memberships(&self) -> Result<i64, StoreError>;
}

#[async_trait::async_trait]
impl<S> LifecycleProcedures for Arc<S>
where
    S: LifecycleProcedures + ?Sized,
{
    async fn cleanup_all_posts(&self) -> Result<Option<i64>, StoreError> {
        (**self).cleanup_all_posts().await
    }

    async fn cleanup_all_groups(&self) -> Result<Option<i64>, StoreError> {
        (**self).cleanup_all_groups().await
    }

    async fn perform_community_reset(&self, admin_id: Option<&AccountId>) -> Result<ResetOutcome, StoreError> {
        (**self).perform_community_reset(admin_id).await
    }
}

#[async_trait::async_trait]
impl<S> IntegrityProbe for Arc<S>
where
    S: IntegrityProbe + ?Sized,
{
    async fn validate_data_integrity(&self) -> Result<bool, StoreError> {
        (**self).validate_data_integrity().await
    }

    async fn count_orphaned_post_likes(&self) -> Result<i64, StoreError> {
        (**self).count_orphaned_post_likes().await
    }

    async fn count_orphaned_group_memberships(&self) -> Result<i64, StoreError> {
        (**self).count_orphaned_group_memberships().await
    }
}
