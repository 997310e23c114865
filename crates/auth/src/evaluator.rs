//! Permission decisions: (role, action, ownership) → allow/deny + reason.
//!
//! - Never errors for an unauthorized caller; denials are values.
//! - Fails closed: a role that cannot be resolved is treated as `Guest`.
//! - Every decision resolves the role afresh (no caching across decisions).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agora_core::{AccountId, PostId};

use crate::resolver::{AccountStanding, PostDirectory, ResolvedRole, RoleResolver, RoleSource};
use crate::{Action, Role, UnknownAction};

/// User-facing denial reasons.
pub mod reasons {
    pub const SIGN_IN_TO_CREATE_POSTS: &str = "Please sign in to create posts.";
    pub const SIGN_IN_TO_DELETE_POSTS: &str = "Please sign in to delete posts.";
    pub const SIGN_IN_TO_MANAGE_GROUPS: &str = "Please sign in to manage groups.";
    pub const SIGN_IN_TO_VIEW_MEMBERS: &str = "Please sign in to view group members.";
    pub const ACCOUNT_INACTIVE: &str = "Your account is inactive. Please contact an administrator.";
    pub const MEMBER_ACCESS_REQUIRED: &str = "Your account needs member access to do this.";
    pub const ADMINS_ONLY_MANAGE_GROUPS: &str = "Only administrators can manage groups.";
    pub const OWN_POSTS_ONLY: &str = "You can only delete your own posts.";
    pub const POST_NOT_FOUND: &str = "Post not found.";
    pub const NO_POST_SPECIFIED: &str = "No post specified.";
    pub const VERIFICATION_UNAVAILABLE: &str =
        "Unable to verify your permissions right now. Please try again.";
    pub const UNKNOWN_PERMISSION: &str = "unknown permission";
}

/// Structured permission verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Decides whether an account may perform an [`Action`].
///
/// Stateless and read-only; safe to share across concurrent requests.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator<S> {
    resolver: RoleResolver<S>,
}

impl<S> PermissionEvaluator<S>
where
    S: RoleSource + PostDirectory,
{
    pub fn new(source: S) -> Self {
        Self {
            resolver: RoleResolver::new(source),
        }
    }

    pub fn resolver(&self) -> &RoleResolver<S> {
        &self.resolver
    }

    /// Allowed iff effective role ≥ member.
    pub async fn can_create_post(&self, account_id: Option<&AccountId>) -> Decision {
        let decision = match self.resolve(account_id).await {
            Some(resolved) => require_member(&resolved, reasons::SIGN_IN_TO_CREATE_POSTS),
            None => Decision::deny(reasons::VERIFICATION_UNAVAILABLE),
        };
        log_decision(Action::CreatePost, account_id, &decision);
        decision
    }

    /// Allowed iff role is admin, or role ≥ member and the account is the
    /// persisted author of `post_id`.
    ///
    /// Ownership is read from the store, never taken from the caller.
    pub async fn can_delete_post(&self, account_id: Option<&AccountId>, post_id: PostId) -> Decision {
        let decision = self.decide_delete_post(account_id, post_id).await;
        log_decision(Action::DeletePost, account_id, &decision);
        decision
    }

    /// Allowed iff role is admin.
    pub async fn can_manage_groups(&self, account_id: Option<&AccountId>) -> Decision {
        let decision = match self.resolve(account_id).await {
            Some(resolved) if resolved.role == Role::Admin => Decision::allow(),
            Some(resolved) => match resolved.standing {
                AccountStanding::Unauthenticated | AccountStanding::Unknown => {
                    Decision::deny(reasons::SIGN_IN_TO_MANAGE_GROUPS)
                }
                AccountStanding::Inactive => Decision::deny(reasons::ACCOUNT_INACTIVE),
                AccountStanding::Active => Decision::deny(reasons::ADMINS_ONLY_MANAGE_GROUPS),
            },
            None => Decision::deny(reasons::VERIFICATION_UNAVAILABLE),
        };
        log_decision(Action::ManageGroups, account_id, &decision);
        decision
    }

    /// Allowed iff effective role ≥ member; member lists are never anonymous-readable.
    pub async fn can_view_members(&self, account_id: Option<&AccountId>) -> Decision {
        let decision = match self.resolve(account_id).await {
            Some(resolved) => require_member(&resolved, reasons::SIGN_IN_TO_VIEW_MEMBERS),
            None => Decision::deny(reasons::VERIFICATION_UNAVAILABLE),
        };
        log_decision(Action::ViewMembers, account_id, &decision);
        decision
    }

    /// Dispatch to the single-action check for `action`.
    ///
    /// `target` is only consulted for [`Action::DeletePost`].
    pub async fn evaluate(&self, account_id: Option<&AccountId>, action: Action, target: Option<PostId>) -> Decision {
        match action {
            Action::CreatePost => self.can_create_post(account_id).await,
            Action::DeletePost => match target {
                Some(post_id) => self.can_delete_post(account_id, post_id).await,
                None => Decision::deny(reasons::NO_POST_SPECIFIED),
            },
            Action::ManageGroups => self.can_manage_groups(account_id).await,
            Action::ViewMembers => self.can_view_members(account_id).await,
        }
    }

    /// Name-based variant of [`evaluate`](Self::evaluate).
    ///
    /// An unknown name is a programmer error and is returned as `Err`.
    pub async fn evaluate_named(
        &self,
        account_id: Option<&AccountId>,
        action: &str,
        target: Option<PostId>,
    ) -> Result<Decision, UnknownAction> {
        let action: Action = action.parse()?;
        Ok(self.evaluate(account_id, action, target).await)
    }

    /// Evaluate each named action independently.
    ///
    /// Every entry equals the corresponding single-action call. Unknown names
    /// are denied with `"unknown permission"` instead of aborting the batch.
    pub async fn check_multiple<I, N>(
        &self,
        account_id: Option<&AccountId>,
        actions: I,
        target: Option<PostId>,
    ) -> BTreeMap<String, Decision>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut results = BTreeMap::new();
        for name in actions {
            let name = name.as_ref();
            let decision = match self.evaluate_named(account_id, name, target).await {
                Ok(decision) => decision,
                Err(unknown) => {
                    warn!(permission = %unknown.0, "unknown permission in batch check");
                    Decision::deny(reasons::UNKNOWN_PERMISSION)
                }
            };
            results.insert(name.to_string(), decision);
        }
        results
    }

    async fn decide_delete_post(&self, account_id: Option<&AccountId>, post_id: PostId) -> Decision {
        let Some(resolved) = self.resolve(account_id).await else {
            return Decision::deny(reasons::VERIFICATION_UNAVAILABLE);
        };

        if resolved.role == Role::Admin {
            return Decision::allow();
        }
        let gate = require_member(&resolved, reasons::SIGN_IN_TO_DELETE_POSTS);
        if !gate.allowed {
            return gate;
        }
        let Some(account_id) = resolved.account_id.as_ref() else {
            return Decision::deny(reasons::SIGN_IN_TO_DELETE_POSTS);
        };

        match self.resolver.source().post(post_id).await {
            Ok(Some(post)) if post.is_authored_by(account_id) => Decision::allow(),
            Ok(Some(_)) => Decision::deny(reasons::OWN_POSTS_ONLY),
            Ok(None) => Decision::deny(reasons::POST_NOT_FOUND),
            Err(err) => {
                warn!(post_id = %post_id, error = %err, "post lookup failed; denying");
                Decision::deny(reasons::VERIFICATION_UNAVAILABLE)
            }
        }
    }

    /// `None` when resolution failed; callers deny (fail closed).
    async fn resolve(&self, account_id: Option<&AccountId>) -> Option<ResolvedRole> {
        match self.resolver.resolve(account_id).await {
            Ok(resolved) => Some(resolved),
            Err(err) => {
                warn!(error = %err, "role resolution failed; treating caller as guest");
                None
            }
        }
    }
}

fn require_member(resolved: &ResolvedRole, sign_in_reason: &str) -> Decision {
    if resolved.role.at_least(Role::Member) {
        return Decision::allow();
    }
    match resolved.standing {
        AccountStanding::Unauthenticated | AccountStanding::Unknown => Decision::deny(sign_in_reason),
        AccountStanding::Inactive => Decision::deny(reasons::ACCOUNT_INACTIVE),
        AccountStanding::Active => Decision::deny(reasons::MEMBER_ACCESS_REQUIRED),
    }
}

fn log_decision(action: Action, account_id: Option<&AccountId>, decision: &Decision) {
    debug!(
        action = %action,
        account_id = account_id.map(AccountId::as_str).unwrap_or("<unauthenticated>"),
        allowed = decision.allowed,
        reason = decision.reason().unwrap_or(""),
        "permission evaluated"
    );
}
