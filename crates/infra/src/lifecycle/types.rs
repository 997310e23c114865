use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agora_core::AccountId;

use crate::integrity::IntegrityReport;
use crate::store::StoreError;

/// Outcome of one destructive operation.
///
/// There is no partial success: `success == false` means nothing was applied
/// (or, after a timeout, that the outcome is unknown).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub success: bool,
    pub deleted_count: i64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CleanupResult {
    pub(crate) fn succeeded(deleted_count: i64, message: String) -> Self {
        Self {
            success: true,
            deleted_count,
            message,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn failed(message: String) -> Self {
        Self {
            success: false,
            deleted_count: 0,
            message,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteCleanupResult {
    pub overall_success: bool,
    pub posts_cleanup: CleanupResult,
    pub groups_cleanup: CleanupResult,
    pub integrity_validation: IntegrityReport,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityResetResult {
    pub deleted_posts: i64,
    pub deleted_groups: i64,
    pub created_groups: i64,
    pub integrity_check_passed: bool,
    pub performed_by: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
}

/// Who is asking for a community reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetAuthority {
    /// An interactive caller; must pass `can_manage_groups`.
    Admin(AccountId),
    /// Already-authorized maintenance context (scheduled job, operator CLI).
    /// No permission check is made. Never use this for request-driven callers.
    TrustedMaintenance,
}

impl ResetAuthority {
    pub fn admin_id(&self) -> Option<&AccountId> {
        match self {
            ResetAuthority::Admin(id) => Some(id),
            ResetAuthority::TrustedMaintenance => None,
        }
    }
}

/// Raised only by `perform_community_reset`; the other operations return
/// failures as values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}

/// Per-operation state machine:
/// `Requested -> PermissionChecked -> Executing -> Validated -> {Succeeded | Failed}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationPhase {
    Requested,
    PermissionChecked,
    Executing,
    Validated,
    Succeeded,
    Failed,
}

impl OperationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationPhase::Requested => "requested",
            OperationPhase::PermissionChecked => "permission_checked",
            OperationPhase::Executing => "executing",
            OperationPhase::Validated => "validated",
            OperationPhase::Succeeded => "succeeded",
            OperationPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationPhase::Succeeded | OperationPhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Caller-side timeout per store procedure. `None` waits indefinitely.
    pub procedure_timeout: Option<Duration>,
}
