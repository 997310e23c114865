//! Orphan detection.
//!
//! Read-only: the validator counts and reports, it never repairs. Repair is
//! always a separate, explicit cleanup operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::store::IntegrityProbe;

/// Issue text of the synthetic report returned when cleanup was denied.
pub const PERMISSION_DENIED_ISSUE: &str = "Permission denied for cleanup operations";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedRecords {
    pub post_likes: i64,
    pub group_memberships: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    /// `false` when no scan ran; such a report says nothing about the data.
    pub scanned: bool,
    pub issues: Vec<String>,
    pub orphaned_records: OrphanedRecords,
    pub timestamp: DateTime<Utc>,
}

impl IntegrityReport {
    /// Stand-in report for a cleanup whose permission check failed.
    pub fn permission_denied() -> Self {
        Self {
            is_valid: false,
            scanned: false,
            issues: vec![PERMISSION_DENIED_ISSUE.to_string()],
            orphaned_records: OrphanedRecords::default(),
            timestamp: Utc::now(),
        }
    }

    fn store_failure(detail: impl std::fmt::Display) -> Self {
        Self {
            is_valid: false,
            scanned: false,
            issues: vec![format!("Database error: {detail}")],
            orphaned_records: OrphanedRecords::default(),
            timestamp: Utc::now(),
        }
    }
}

/// Produces [`IntegrityReport`]s from an [`IntegrityProbe`].
#[derive(Debug, Clone)]
pub struct IntegrityValidator<S> {
    probe: S,
}

impl<S> IntegrityValidator<S>
where
    S: IntegrityProbe,
{
    pub fn new(probe: S) -> Self {
        Self { probe }
    }

    /// Valid iff the store's own check passed and both orphan counts are zero.
    ///
    /// Never fails: a store error becomes an invalid report carrying the
    /// store's message.
    #[instrument(skip(self))]
    pub async fn validate(&self) -> IntegrityReport {
        let store_check = match self.probe.validate_data_integrity().await {
            Ok(passed) => passed,
            Err(err) => {
                warn!(error = %err, "integrity check could not run");
                return IntegrityReport::store_failure(err);
            }
        };
        let post_likes = match self.probe.count_orphaned_post_likes().await {
            Ok(n) => n,
            Err(err) => return IntegrityReport::store_failure(err),
        };
        let group_memberships = match self.probe.count_orphaned_group_memberships().await {
            Ok(n) => n,
            Err(err) => return IntegrityReport::store_failure(err),
        };

        let mut issues = Vec::new();
        if !store_check {
            issues.push("Database integrity check failed".to_string());
        }
        if post_likes != 0 {
            issues.push(format!("Found {post_likes} orphaned post likes"));
        }
        if group_memberships != 0 {
            issues.push(format!("Found {group_memberships} orphaned group memberships"));
        }

        let report = IntegrityReport {
            is_valid: issues.is_empty(),
            scanned: true,
            issues,
            orphaned_records: OrphanedRecords {
                post_likes,
                group_memberships,
            },
            timestamp: Utc::now(),
        };
        info!(
            is_valid = report.is_valid,
            orphaned_post_likes = post_likes,
            orphaned_group_memberships = group_memberships,
            "integrity validated"
        );
        report
    }
}
