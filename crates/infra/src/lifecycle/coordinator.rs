use std::future::Future;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use agora_auth::{PermissionEvaluator, PostDirectory, RoleSource};
use agora_core::AccountId;

use super::types::{
    CleanupResult, CommunityResetResult, CompleteCleanupResult, CoordinatorConfig, LifecycleError, OperationPhase,
    ResetAuthority,
};
use crate::integrity::{IntegrityReport, IntegrityValidator};
use crate::store::{IntegrityProbe, LifecycleProcedures, ResetOutcome, StoreError};

/// Runs irreversible, cross-table operations gated by `can_manage_groups`.
///
/// ## Error contract
///
/// - `clear_all_posts`, `clear_all_groups`, `perform_complete_cleanup` and
///   `validate_integrity` never fail: denials and store errors come back as
///   result values.
/// - `perform_community_reset` returns `Err` on denial or store failure; it is
///   meant for trusted maintenance tooling that must halt on failure.
///
/// Store procedures are never retried.
#[derive(Debug, Clone)]
pub struct DataLifecycleCoordinator<S> {
    store: S,
    evaluator: PermissionEvaluator<S>,
    validator: IntegrityValidator<S>,
    config: CoordinatorConfig,
}

#[derive(Debug, Copy, Clone)]
enum Sweep {
    Posts,
    Groups,
}

impl Sweep {
    fn procedure(self) -> &'static str {
        match self {
            Sweep::Posts => "cleanup_all_posts",
            Sweep::Groups => "cleanup_all_groups",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Sweep::Posts => "posts",
            Sweep::Groups => "groups",
        }
    }

    fn dependents(self) -> &'static str {
        match self {
            Sweep::Posts => "post likes",
            Sweep::Groups => "group memberships",
        }
    }
}

/// Logs phase transitions of one operation and keeps the path taken.
#[derive(Debug)]
struct PhaseTracker {
    operation: &'static str,
    phase: OperationPhase,
    trail: Vec<OperationPhase>,
}

impl PhaseTracker {
    fn start(operation: &'static str) -> Self {
        debug!(operation, phase = OperationPhase::Requested.as_str(), "lifecycle operation requested");
        Self {
            operation,
            phase: OperationPhase::Requested,
            trail: vec![OperationPhase::Requested],
        }
    }

    /// No-op once a terminal phase was reached.
    fn advance(&mut self, next: OperationPhase) {
        if self.phase.is_terminal() {
            warn!(
                operation = self.operation,
                phase = self.phase.as_str(),
                ignored = next.as_str(),
                "phase change after the operation finished"
            );
            return;
        }
        debug!(
            operation = self.operation,
            from = self.phase.as_str(),
            to = next.as_str(),
            "lifecycle phase"
        );
        self.phase = next;
        self.trail.push(next);
    }

    fn fail(&mut self) {
        self.advance(OperationPhase::Failed);
    }
}

impl<S> DataLifecycleCoordinator<S>
where
    S: RoleSource + PostDirectory + LifecycleProcedures + IntegrityProbe + Clone,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    pub fn with_config(store: S, config: CoordinatorConfig) -> Self {
        Self {
            evaluator: PermissionEvaluator::new(store.clone()),
            validator: IntegrityValidator::new(store.clone()),
            store,
            config,
        }
    }

    pub fn evaluator(&self) -> &PermissionEvaluator<S> {
        &self.evaluator
    }

    /// Delete every post with its likes and comments.
    pub async fn clear_all_posts(&self, admin_id: Option<&AccountId>) -> CleanupResult {
        self.sweep(admin_id, Sweep::Posts).await
    }

    /// Delete every group with its memberships.
    pub async fn clear_all_groups(&self, admin_id: Option<&AccountId>) -> CleanupResult {
        self.sweep(admin_id, Sweep::Groups).await
    }

    pub async fn validate_integrity(&self) -> IntegrityReport {
        self.validator.validate().await
    }

    /// Posts, then groups, then validation, strictly in that order.
    ///
    /// A denied caller gets a synthetic integrity report (`scanned == false`)
    /// and nothing touches the store.
    #[instrument(skip_all, fields(admin_id = admin_id.map(AccountId::as_str)))]
    pub async fn perform_complete_cleanup(&self, admin_id: Option<&AccountId>) -> CompleteCleanupResult {
        self.tracked_complete_cleanup(admin_id).await.0
    }

    async fn tracked_complete_cleanup(&self, admin_id: Option<&AccountId>) -> (CompleteCleanupResult, PhaseTracker) {
        let mut phase = PhaseTracker::start("perform_complete_cleanup");

        let decision = self.evaluator.can_manage_groups(admin_id).await;
        if !decision.allowed {
            phase.fail();
            let message = format!("Permission denied: {}", decision.reason().unwrap_or_default());
            warn!(%message, "complete cleanup refused");
            let result = CompleteCleanupResult {
                overall_success: false,
                posts_cleanup: CleanupResult::failed(message.clone()),
                groups_cleanup: CleanupResult::failed(message),
                integrity_validation: IntegrityReport::permission_denied(),
                timestamp: Utc::now(),
            };
            return (result, phase);
        }
        phase.advance(OperationPhase::PermissionChecked);

        phase.advance(OperationPhase::Executing);
        let posts_cleanup = self.clear_all_posts(admin_id).await;
        let groups_cleanup = self.clear_all_groups(admin_id).await;

        let integrity_validation = self.validate_integrity().await;
        phase.advance(OperationPhase::Validated);

        let overall_success = posts_cleanup.success && groups_cleanup.success && integrity_validation.is_valid;
        if overall_success {
            phase.advance(OperationPhase::Succeeded);
        } else {
            phase.fail();
        }
        info!(overall_success, "complete cleanup finished");

        let result = CompleteCleanupResult {
            overall_success,
            posts_cleanup,
            groups_cleanup,
            integrity_validation,
            timestamp: Utc::now(),
        };
        (result, phase)
    }

    /// Delete all posts and groups, then recreate the seed groups, in one
    /// store transaction.
    ///
    /// `integrity_check_passed` is true only if both the store's own check and
    /// an independent post-reset scan pass.
    #[instrument(skip_all, fields(admin_id = authority.admin_id().map(AccountId::as_str)))]
    pub async fn perform_community_reset(
        &self,
        authority: ResetAuthority,
    ) -> Result<CommunityResetResult, LifecycleError> {
        let mut phase = PhaseTracker::start("perform_community_reset");

        match &authority {
            ResetAuthority::Admin(admin_id) => {
                let decision = self.evaluator.can_manage_groups(Some(admin_id)).await;
                if !decision.allowed {
                    phase.fail();
                    let reason = decision.reason.unwrap_or_default();
                    warn!(admin_id = %admin_id, %reason, "community reset refused");
                    return Err(LifecycleError::PermissionDenied(reason));
                }
            }
            ResetAuthority::TrustedMaintenance => {
                info!("community reset from trusted maintenance context; permission check skipped");
            }
        }
        phase.advance(OperationPhase::PermissionChecked);

        phase.advance(OperationPhase::Executing);
        let outcome = match self
            .guarded(
                "perform_community_reset",
                self.store.perform_community_reset(authority.admin_id()),
            )
            .await
            .and_then(checked_outcome)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                phase.fail();
                error!(error = %err, "community reset failed");
                return Err(err.into());
            }
        };

        let report = self.validator.validate().await;
        phase.advance(OperationPhase::Validated);
        let integrity_check_passed = outcome.integrity_check_passed && report.is_valid;
        if !integrity_check_passed {
            warn!(
                store_check = outcome.integrity_check_passed,
                issues = ?report.issues,
                "community reset left an inconsistent dataset"
            );
        }

        phase.advance(OperationPhase::Succeeded);
        info!(
            deleted_posts = outcome.deleted_posts,
            deleted_groups = outcome.deleted_groups,
            created_groups = outcome.created_groups,
            integrity_check_passed,
            "community reset completed"
        );
        Ok(CommunityResetResult {
            deleted_posts: outcome.deleted_posts,
            deleted_groups: outcome.deleted_groups,
            created_groups: outcome.created_groups,
            integrity_check_passed,
            performed_by: outcome.performed_by,
            timestamp: outcome.timestamp,
        })
    }

    #[instrument(skip_all, fields(procedure = sweep.procedure(), admin_id = admin_id.map(AccountId::as_str)))]
    async fn sweep(&self, admin_id: Option<&AccountId>, sweep: Sweep) -> CleanupResult {
        self.tracked_sweep(admin_id, sweep).await.0
    }

    /// A committed sweep is validated by recounting the orphans it was meant
    /// to remove; any left over fail the operation.
    async fn tracked_sweep(&self, admin_id: Option<&AccountId>, sweep: Sweep) -> (CleanupResult, PhaseTracker) {
        let mut phase = PhaseTracker::start(sweep.procedure());

        let decision = self.evaluator.can_manage_groups(admin_id).await;
        if !decision.allowed {
            phase.fail();
            let message = format!("Permission denied: {}", decision.reason().unwrap_or_default());
            warn!(%message, "cleanup refused");
            return (CleanupResult::failed(message), phase);
        }
        phase.advance(OperationPhase::PermissionChecked);

        phase.advance(OperationPhase::Executing);
        let count = match sweep {
            Sweep::Posts => self.guarded(sweep.procedure(), self.store.cleanup_all_posts()).await,
            Sweep::Groups => self.guarded(sweep.procedure(), self.store.cleanup_all_groups()).await,
        };
        let deleted = match count.and_then(|count| checked_count(sweep.procedure(), count)) {
            Ok(deleted) => deleted,
            Err(err) => {
                phase.fail();
                error!(error = %err, "cleanup failed");
                return (CleanupResult::failed(format!("Database error: {err}")), phase);
            }
        };

        let leftover = match sweep {
            Sweep::Posts => self.guarded("count_orphaned_post_likes", self.store.count_orphaned_post_likes()).await,
            Sweep::Groups => {
                self.guarded("count_orphaned_group_memberships", self.store.count_orphaned_group_memberships())
                    .await
            }
        };
        let result = match leftover {
            Ok(0) => {
                phase.advance(OperationPhase::Validated);
                phase.advance(OperationPhase::Succeeded);
                info!(deleted, "cleanup succeeded");
                CleanupResult::succeeded(
                    deleted,
                    format!("Successfully deleted {deleted} {} and related data", sweep.noun()),
                )
            }
            Ok(orphans) => {
                phase.fail();
                error!(deleted, orphans, "cleanup left orphaned rows");
                CleanupResult::failed(format!(
                    "Database error: {} left {orphans} orphaned {}",
                    sweep.procedure(),
                    sweep.dependents()
                ))
            }
            Err(err) => {
                phase.fail();
                error!(error = %err, "cleanup could not be verified");
                CleanupResult::failed(format!("Database error: {err}"))
            }
        };
        (result, phase)
    }

    /// Apply the configured caller-side timeout.
    ///
    /// A timeout means "outcome unknown", not "did not happen".
    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match self.config.procedure_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| StoreError::Timeout { operation, after })?,
            None => call.await,
        }
    }
}

/// A missing or negative count is a failure, never a partial success.
fn checked_count(operation: &'static str, count: Option<i64>) -> Result<i64, StoreError> {
    match count {
        Some(n) if n >= 0 => Ok(n),
        Some(n) => Err(StoreError::InvalidResult {
            operation,
            detail: format!("negative count {n}"),
        }),
        None => Err(StoreError::InvalidResult {
            operation,
            detail: "no count".to_string(),
        }),
    }
}

fn checked_outcome(outcome: ResetOutcome) -> Result<ResetOutcome, StoreError> {
    for (field, value) in [
        ("deleted_posts", outcome.deleted_posts),
        ("deleted_groups", outcome.deleted_groups),
        ("created_groups", outcome.created_groups),
    ] {
        if value < 0 {
            return Err(StoreError::InvalidResult {
                operation: "perform_community_reset",
                detail: format!("negative {field} {value}"),
            });
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use agora_auth::{Account, Role, RoleAssignment};
    use agora_core::{Group, GroupMembership, Post, PostLike};

    use super::*;
    use crate::store::{InMemoryCommunityStore, Procedure};

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn with_role(store: &InMemoryCommunityStore, raw: &str, role: Role) {
        store.insert_account(Account {
            id: id(raw),
            is_active: true,
            is_verified: true,
        });
        store.grant_role(RoleAssignment {
            account_id: id(raw),
            role,
            granted_by: None,
            granted_at: Utc::now() - chrono::Duration::days(1),
            expires_at: None,
            is_active: true,
        });
    }

    fn community() -> Arc<InMemoryCommunityStore> {
        let store = InMemoryCommunityStore::arc();
        with_role(&store, "A1", Role::Admin);
        with_role(&store, "M1", Role::Member);
        let post = store.insert_post(Post::new(id("M1"), "first", Utc::now()));
        store.insert_post(Post::new(id("M1"), "second", Utc::now()));
        store.insert_like(PostLike::new(post, id("A1")));
        let group = store.insert_group(Group::new("Old", "x", Some(id("A1")), Utc::now()).unwrap());
        store.insert_membership(GroupMembership::new(group, id("M1")));
        store
    }

    #[tokio::test]
    async fn clear_all_groups_reports_count() {
        let store = community();
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let result = coordinator.clear_all_groups(Some(&id("A1"))).await;

        assert!(result.success);
        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.message, "Successfully deleted 1 groups and related data");
        assert_eq!(store.membership_count(), 0);
    }

    #[tokio::test]
    async fn denied_cleanup_carries_reason() {
        let coordinator = DataLifecycleCoordinator::new(community());
        let result = coordinator.clear_all_groups(Some(&id("M1"))).await;
        assert!(!result.success);
        assert_eq!(result.message, "Permission denied: Only administrators can manage groups.");
    }

    #[tokio::test]
    async fn store_error_text_is_surfaced() {
        let store = community();
        store.fail_next(Procedure::CleanupAllPosts, "relation \"posts\" is locked");
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let result = coordinator.clear_all_posts(Some(&id("A1"))).await;

        assert!(!result.success);
        assert_eq!(result.message, "Database error: relation \"posts\" is locked");
        assert_eq!(store.post_count(), 2);
    }

    #[tokio::test]
    async fn missing_count_is_a_failure() {
        let store = community();
        store.report_count_next(Procedure::CleanupAllPosts, None);
        let coordinator = DataLifecycleCoordinator::new(store);

        let result = coordinator.clear_all_posts(Some(&id("A1"))).await;

        assert!(!result.success);
        assert_eq!(result.message, "Database error: cleanup_all_posts returned no count");
    }

    #[tokio::test]
    async fn negative_count_is_a_failure() {
        let store = community();
        store.report_count_next(Procedure::CleanupAllGroups, Some(-1));
        let coordinator = DataLifecycleCoordinator::new(store);

        let result = coordinator.clear_all_groups(Some(&id("A1"))).await;

        assert!(!result.success);
        assert_eq!(result.message, "Database error: cleanup_all_groups returned negative count -1");
    }

    #[tokio::test]
    async fn reset_denial_is_raised() {
        let coordinator = DataLifecycleCoordinator::new(community());
        let err = coordinator
            .perform_community_reset(ResetAuthority::Admin(id("M1")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::PermissionDenied("Only administrators can manage groups.".to_string())
        );
    }

    #[tokio::test]
    async fn trusted_reset_skips_permission_check() {
        let store = community();
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let result = coordinator
            .perform_community_reset(ResetAuthority::TrustedMaintenance)
            .await
            .unwrap();

        assert_eq!(result.performed_by, None);
        assert_eq!(result.deleted_posts, 2);
        assert_eq!(result.created_groups, 5);
        assert!(result.integrity_check_passed);
        assert!(store.group_names().contains(&"General".to_string()));
    }

    #[tokio::test]
    async fn reset_store_failure_is_raised_with_message() {
        let store = community();
        store.fail_next(Procedure::CommunityReset, "could not serialize access");
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let err = coordinator
            .perform_community_reset(ResetAuthority::Admin(id("A1")))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Database error: could not serialize access");
        assert_eq!(store.group_names(), vec!["Old".to_string()]);
    }

    #[test]
    fn counts_are_checked() {
        assert_eq!(checked_count("p", Some(0)), Ok(0));
        assert!(checked_count("p", Some(-3)).is_err());
        assert!(checked_count("p", None).is_err());
    }

    #[test]
    fn finished_operation_ignores_further_phases() {
        let mut phase = PhaseTracker::start("cleanup_all_posts");
        phase.advance(OperationPhase::PermissionChecked);
        phase.fail();
        phase.advance(OperationPhase::Executing);
        phase.advance(OperationPhase::Succeeded);

        assert_eq!(phase.phase, OperationPhase::Failed);
        assert_eq!(
            phase.trail,
            vec![
                OperationPhase::Requested,
                OperationPhase::PermissionChecked,
                OperationPhase::Failed
            ]
        );
    }

    #[tokio::test]
    async fn sweep_validates_before_succeeding() {
        let coordinator = DataLifecycleCoordinator::new(community());

        let (result, phase) = coordinator.tracked_sweep(Some(&id("A1")), Sweep::Posts).await;

        assert!(result.success);
        assert_eq!(
            phase.trail,
            vec![
                OperationPhase::Requested,
                OperationPhase::PermissionChecked,
                OperationPhase::Executing,
                OperationPhase::Validated,
                OperationPhase::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn rejected_count_never_reaches_validated() {
        let store = community();
        store.report_count_next(Procedure::CleanupAllGroups, Some(-1));
        let coordinator = DataLifecycleCoordinator::new(store);

        let (_, phase) = coordinator.tracked_sweep(Some(&id("A1")), Sweep::Groups).await;

        assert_eq!(
            phase.trail,
            vec![
                OperationPhase::Requested,
                OperationPhase::PermissionChecked,
                OperationPhase::Executing,
                OperationPhase::Failed
            ]
        );
    }

    #[tokio::test]
    async fn complete_cleanup_validates_before_succeeding() {
        let coordinator = DataLifecycleCoordinator::new(community());

        let (result, phase) = coordinator.tracked_complete_cleanup(Some(&id("A1"))).await;

        assert!(result.overall_success);
        assert_eq!(
            phase.trail,
            vec![
                OperationPhase::Requested,
                OperationPhase::PermissionChecked,
                OperationPhase::Executing,
                OperationPhase::Validated,
                OperationPhase::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn complete_cleanup_phases_end_failed() {
        let store = community();
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let (_, denied) = coordinator.tracked_complete_cleanup(Some(&id("M1"))).await;
        assert_eq!(denied.trail, vec![OperationPhase::Requested, OperationPhase::Failed]);

        store.fail_next(Procedure::CleanupAllGroups, "lock timeout");
        let (result, failed) = coordinator.tracked_complete_cleanup(Some(&id("A1"))).await;
        assert!(!result.overall_success);
        assert_eq!(failed.trail.last(), Some(&OperationPhase::Failed));
        assert!(failed.trail.contains(&OperationPhase::Validated));
    }

    #[tokio::test]
    async fn negative_reset_count_is_raised() {
        let store = community();
        store.report_count_next(Procedure::CommunityReset, Some(-7));
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let err = coordinator
            .perform_community_reset(ResetAuthority::Admin(id("A1")))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::Store(StoreError::InvalidResult {
                operation: "perform_community_reset",
                detail: "negative deleted_posts -7".to_string(),
            })
        );
        assert_eq!(err.to_string(), "Database error: perform_community_reset returned negative deleted_posts -7");
    }

    #[tokio::test]
    async fn missing_reset_payload_is_raised() {
        let store = community();
        store.report_count_next(Procedure::CommunityReset, None);
        let coordinator = DataLifecycleCoordinator::new(store);

        let err = coordinator
            .perform_community_reset(ResetAuthority::TrustedMaintenance)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::Store(StoreError::InvalidResult {
                operation: "perform_community_reset",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failed_store_integrity_flag_is_reported() {
        let store = community();
        store.report_integrity_next(Procedure::CommunityReset, false);
        let coordinator = DataLifecycleCoordinator::new(store.clone());

        let result = coordinator
            .perform_community_reset(ResetAuthority::Admin(id("A1")))
            .await
            .unwrap();

        assert!(!result.integrity_check_passed);
        assert_eq!(result.created_groups, 5);
        // The independent scan on its own finds nothing wrong.
        assert!(coordinator.validate_integrity().await.is_valid);
    }

    #[tokio::test]
    async fn failed_post_reset_scan_is_reported() {
        let store = community();
        store.report_integrity_next(Procedure::ValidateIntegrity, false);
        let coordinator = DataLifecycleCoordinator::new(store);

        let result = coordinator
            .perform_community_reset(ResetAuthority::TrustedMaintenance)
            .await
            .unwrap();

        assert!(!result.integrity_check_passed);
    }

    #[tokio::test]
    async fn timeout_reports_unknown_outcome() {
        let coordinator = DataLifecycleCoordinator::with_config(
            community(),
            CoordinatorConfig {
                procedure_timeout: Some(Duration::from_millis(10)),
            },
        );
        let err = coordinator
            .guarded::<()>("cleanup_all_posts", std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout { operation: "cleanup_all_posts", .. }));
        assert!(err.to_string().contains("outcome unknown"));
    }
}
