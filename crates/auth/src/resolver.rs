//! Role resolution against persisted role assignments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use agora_core::{AccountId, Post, PostId};

use crate::account::{effective_role, Account, RoleAssignment};
use crate::Role;

/// A read against the store failed.
///
/// Carries the store's message verbatim so the root cause survives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LookupError(pub String);

impl LookupError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Source of account records and role assignments.
#[async_trait::async_trait]
pub trait RoleSource: Send + Sync {
    async fn account(&self, account_id: &AccountId) -> Result<Option<Account>, LookupError>;

    /// All assignments ever granted to the account, including inactive and expired ones.
    async fn role_assignments(&self, account_id: &AccountId) -> Result<Vec<RoleAssignment>, LookupError>;
}

/// Lookup of persisted posts (used for the ownership clause of post deletion).
#[async_trait::async_trait]
pub trait PostDirectory: Send + Sync {
    async fn post(&self, post_id: PostId) -> Result<Option<Post>, LookupError>;
}

#[async_trait::async_trait]
impl<S> RoleSource for Arc<S>
where
    S: RoleSource + ?Sized,
{
    async fn account(&self, account_id: &AccountId) -> Result<Option<Account>, LookupError> {
        (**self).account(account_id).await
    }

    async fn role_assignments(&self, account_id: &AccountId) -> Result<Vec<RoleAssignment>, LookupError> {
        (**self).role_assignments(account_id).await
    }
}

#[async_trait::async_trait]
impl<S> PostDirectory for Arc<S>
where
    S: PostDirectory + ?Sized,
{
    async fn post(&self, post_id: PostId) -> Result<Option<Post>, LookupError> {
        (**self).post(post_id).await
    }
}

/// Why an account resolved to the role it did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccountStanding {
    /// No (or an empty) account id was supplied.
    Unauthenticated,
    /// An id was supplied but no account record exists.
    Unknown,
    /// The account record exists but is deactivated.
    Inactive,
    Active,
}

/// Outcome of a role resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub account_id: Option<AccountId>,
    pub role: Role,
    pub standing: AccountStanding,
}

impl ResolvedRole {
    fn guest(account_id: Option<AccountId>, standing: AccountStanding) -> Self {
        Self {
            account_id,
            role: Role::Guest,
            standing,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("role lookup failed for account '{account_id}': {source}")]
    Lookup {
        account_id: AccountId,
        #[source]
        source: LookupError,
    },
}

/// Resolves the effective role of an account.
///
/// Stateless: every call reads the current assignments, nothing is cached.
/// Store failures are surfaced as [`ResolutionError`] (no retries); callers
/// making permission decisions must treat them as `Guest`.
#[derive(Debug, Clone)]
pub struct RoleResolver<S> {
    source: S,
}

impl<S> RoleResolver<S>
where
    S: RoleSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Effective role of `account_id` right now.
    pub async fn resolve_role(&self, account_id: Option<&AccountId>) -> Result<Role, ResolutionError> {
        Ok(self.resolve(account_id).await?.role)
    }

    pub async fn resolve(&self, account_id: Option<&AccountId>) -> Result<ResolvedRole, ResolutionError> {
        self.resolve_at(account_id, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        account_id: Option<&AccountId>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedRole, ResolutionError> {
        let Some(account_id) = account_id else {
            return Ok(ResolvedRole::guest(None, AccountStanding::Unauthenticated));
        };

        let lookup_failed = |source| ResolutionError::Lookup {
            account_id: account_id.clone(),
            source,
        };

        let account = self.source.account(account_id).await.map_err(lookup_failed)?;
        let resolved = match account {
            None => ResolvedRole::guest(Some(account_id.clone()), AccountStanding::Unknown),
            Some(account) if !account.is_active => {
                ResolvedRole::guest(Some(account_id.clone()), AccountStanding::Inactive)
            }
            Some(account) => {
                let assignments = self
                    .source
                    .role_assignments(account_id)
                    .await
                    .map_err(lookup_failed)?;
                ResolvedRole {
                    account_id: Some(account_id.clone()),
                    role: effective_role(Some(&account), &assignments, now),
                    standing: AccountStanding::Active,
                }
            }
        };

        debug!(account_id = %account_id, role = %resolved.role, standing = ?resolved.standing, "role resolved");
        Ok(resolved)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::FixtureSource;
    use super::*;

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_resolves_to_guest_without_lookup() {
        let resolver = RoleResolver::new(FixtureSource::default());
        let resolved = resolver.resolve(None).await.unwrap();
        assert_eq!(resolved.role, Role::Guest);
        assert_eq!(resolved.standing, AccountStanding::Unauthenticated);
        assert!(resolver.source().lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_account_is_guest() {
        let resolver = RoleResolver::new(FixtureSource::default());
        let resolved = resolver.resolve(Some(&id("ghost"))).await.unwrap();
        assert_eq!(resolved.role, Role::Guest);
        assert_eq!(resolved.standing, AccountStanding::Unknown);
    }

    #[tokio::test]
    async fn inactive_admin_is_guest() {
        let source = FixtureSource::default().with_account("A1", false, Some(Role::Admin));
        let resolver = RoleResolver::new(source);
        let resolved = resolver.resolve(Some(&id("A1"))).await.unwrap();
        assert_eq!(resolved.role, Role::Guest);
        assert_eq!(resolved.standing, AccountStanding::Inactive);
    }

    #[tokio::test]
    async fn active_member_resolves_member() {
        let source = FixtureSource::default().with_account("M1", true, Some(Role::Member));
        let resolver = RoleResolver::new(source);
        assert_eq!(resolver.resolve_role(Some(&id("M1"))).await.unwrap(), Role::Member);
    }

    #[tokio::test]
    async fn expired_admin_falls_back_to_member() {
        let now = Utc::now();
        let mut source = FixtureSource::default().with_account("A1", true, Some(Role::Member));
        source.assignments.push(RoleAssignment {
            account_id: id("A1"),
            role: Role::Admin,
            granted_by: None,
            granted_at: now - chrono::Duration::days(10),
            expires_at: Some(now - chrono::Duration::days(1)),
            is_active: true,
        });
        let resolver = RoleResolver::new(source);
        assert_eq!(resolver.resolve_role(Some(&id("A1"))).await.unwrap(), Role::Member);
    }

    #[tokio::test]
    async fn store_failure_is_surfaced_not_defaulted() {
        let source = FixtureSource::default()
            .with_account("A1", true, Some(Role::Admin))
            .failing("connection reset");
        let resolver = RoleResolver::new(source);
        let err = resolver.resolve_role(Some(&id("A1"))).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn every_resolution_reads_the_store() {
        let source = FixtureSource::default().with_account("M1", true, Some(Role::Member));
        let resolver = RoleResolver::new(source);
        resolver.resolve_role(Some(&id("M1"))).await.unwrap();
        resolver.resolve_role(Some(&id("M1"))).await.unwrap();
        assert_eq!(resolver.source().lookups.lock().unwrap().len(), 2);
    }
}
