use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;

use agora_auth::{Account, LookupError, PostDirectory, RoleAssignment, RoleSource};
use agora_core::{AccountId, Entity, Group, GroupId, GroupMembership, Post, PostId, PostLike};

use super::r#trait::{IntegrityProbe, LifecycleProcedures, ResetOutcome, StoreError};
use crate::seed::{canonical_seed_groups, SeedGroup};

/// Store entry points that can be made to misbehave in tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Procedure {
    CleanupAllPosts,
    CleanupAllGroups,
    CommunityReset,
    ValidateIntegrity,
    /// Account, role-assignment and post reads.
    Lookup,
}

#[derive(Debug, Clone)]
enum Fault {
    /// Abort with this message. Destructive procedures abort *after* their
    /// staged deletions, so the rollback path is exercised.
    Fail(String),
    /// Apply normally but report this count instead of the real one. For a
    /// reset it replaces `deleted_posts`; `None` stands for a NULL payload.
    Count(Option<i64>),
    /// Apply normally but report this result of the store's own integrity check.
    Integrity(bool),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    assignments: Vec<RoleAssignment>,
    posts: BTreeMap<PostId, Post>,
    likes: Vec<PostLike>,
    groups: BTreeMap<GroupId, Group>,
    memberships: Vec<GroupMembership>,
}

impl Tables {
    fn orphaned_post_likes(&self) -> i64 {
        self.likes
            .iter()
            .filter(|like| !self.posts.contains_key(&like.post_id))
            .count() as i64
    }

    fn orphaned_group_memberships(&self) -> i64 {
        self.memberships
            .iter()
            .filter(|m| !self.groups.contains_key(&m.group_id))
            .count() as i64
    }

    /// Removes every post and sweeps the whole likes table.
    fn sweep_posts(&mut self) -> i64 {
        let deleted = self.posts.len() as i64;
        self.likes.clear();
        self.posts.clear();
        deleted
    }

    /// Removes every group and sweeps the whole memberships table.
    fn sweep_groups(&mut self) -> i64 {
        let deleted = self.groups.len() as i64;
        self.memberships.clear();
        self.groups.clear();
        deleted
    }
}

/// In-memory community store.
///
/// Intended for tests/dev. All tables live behind a single `RwLock`; every
/// procedure takes the write lock (single writer), works on a staged copy, and
/// swaps it in only when the whole procedure succeeded. An aborted procedure
/// therefore leaves no trace.
#[derive(Debug)]
pub struct InMemoryCommunityStore {
    tables: RwLock<Tables>,
    seed_groups: Vec<SeedGroup>,
    faults: Mutex<HashMap<Procedure, Fault>>,
}

impl InMemoryCommunityStore {
    pub fn new() -> Self {
        Self::with_seed_groups(canonical_seed_groups())
    }

    pub fn with_seed_groups(seed_groups: Vec<SeedGroup>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            seed_groups,
            faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make the next call of `procedure` fail with `message`.
    pub fn fail_next(&self, procedure: Procedure, message: impl Into<String>) {
        self.set_fault(procedure, Fault::Fail(message.into()));
    }

    /// Make the next call of `procedure` report `count` instead of the real count.
    pub fn report_count_next(&self, procedure: Procedure, count: Option<i64>) {
        self.set_fault(procedure, Fault::Count(count));
    }

    /// Make the next call of `procedure` report `passed` as the store's own
    /// integrity check result.
    pub fn report_integrity_next(&self, procedure: Procedure, passed: bool) {
        self.set_fault(procedure, Fault::Integrity(passed));
    }

    fn set_fault(&self, procedure: Procedure, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(procedure, fault);
    }

    fn take_fault(&self, procedure: Procedure) -> Option<Fault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&procedure)
    }

    /// Run `f` against a staged copy and commit it only on `Ok`.
    fn transact<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        *tables = staged;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn lookup<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, LookupError> {
        if let Some(Fault::Fail(msg)) = self.take_fault(Procedure::Lookup) {
            return Err(LookupError::new(msg));
        }
        Ok(self.read(f)?)
    }

    fn sweep(&self, procedure: Procedure, sweep: fn(&mut Tables) -> i64) -> Result<Option<i64>, StoreError> {
        let fault = self.take_fault(procedure);
        self.transact(|tables| {
            let deleted = sweep(tables);
            match fault {
                Some(Fault::Fail(msg)) => Err(StoreError::Database(msg)),
                Some(Fault::Count(count)) => Ok(count),
                Some(Fault::Integrity(_)) | None => Ok(Some(deleted)),
            }
        })
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }

    // ── Fixture helpers (raw table access, no checks) ────────────────────────

    pub fn insert_account(&self, account: Account) {
        self.with_tables(|t| {
            t.accounts.insert(account.id.clone(), account);
        });
    }

    pub fn grant_role(&self, assignment: RoleAssignment) {
        self.with_tables(|t| t.assignments.push(assignment));
    }

    pub fn insert_post(&self, post: Post) -> PostId {
        self.with_tables(|t| upsert(&mut t.posts, post))
    }

    pub fn insert_like(&self, like: PostLike) {
        self.with_tables(|t| t.likes.push(like));
    }

    pub fn insert_group(&self, group: Group) -> GroupId {
        self.with_tables(|t| upsert(&mut t.groups, group))
    }

    pub fn insert_membership(&self, membership: GroupMembership) {
        self.with_tables(|t| t.memberships.push(membership));
    }

    /// Physically remove a post *without* cascading to its likes.
    pub fn hard_delete_post(&self, post_id: PostId) -> bool {
        self.with_tables(|t| t.posts.remove(&post_id).is_some())
    }

    /// Physically remove a group *without* cascading to its memberships.
    pub fn hard_delete_group(&self, group_id: GroupId) -> bool {
        self.with_tables(|t| t.groups.remove(&group_id).is_some())
    }

    pub fn post_count(&self) -> usize {
        self.with_tables(|t| t.posts.len())
    }

    pub fn like_count(&self) -> usize {
        self.with_tables(|t| t.likes.len())
    }

    pub fn group_count(&self) -> usize {
        self.with_tables(|t| t.groups.len())
    }

    pub fn membership_count(&self) -> usize {
        self.with_tables(|t| t.memberships.len())
    }

    /// Group names, sorted.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.with_tables(|t| t.groups.values().map(|g| g.name.clone()).collect());
        names.sort();
        names
    }
}

fn upsert<E>(table: &mut BTreeMap<E::Id, E>, row: E) -> E::Id
where
    E: Entity,
    E::Id: Ord,
{
    let id = row.id().clone();
    table.insert(id.clone(), row);
    id
}

impl Default for InMemoryCommunityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RoleSource for InMemoryCommunityStore {
    async fn account(&self, account_id: &AccountId) -> Result<Option<Account>, LookupError> {
        self.lookup(|t| t.accounts.get(account_id).cloned())
    }

    async fn role_assignments(&self, account_id: &AccountId) -> Result<Vec<RoleAssignment>, LookupError> {
        self.lookup(|t| {
            t.assignments
                .iter()
                .filter(|a| &a.account_id == account_id)
                .cloned()
                .collect()
        })
    }
}

#[async_trait::async_trait]
impl PostDirectory for InMemoryCommunityStore {
    async fn post(&self, post_id: PostId) -> Result<Option<Post>, LookupError> {
        self.lookup(|t| t.posts.get(&post_id).cloned())
    }
}

#[async_trait::async_trait]
impl LifecycleProcedures for InMemoryCommunityStore {
    async fn cleanup_all_posts(&self) -> Result<Option<i64>, StoreError> {
        let out = self.sweep(Procedure::CleanupAllPosts, Tables::sweep_posts);
        debug!(result = ?out, "in-memory cleanup_all_posts");
        out
    }

    async fn cleanup_all_groups(&self) -> Result<Option<i64>, StoreError> {
        let out = self.sweep(Procedure::CleanupAllGroups, Tables::sweep_groups);
        debug!(result = ?out, "in-memory cleanup_all_groups");
        out
    }

    async fn perform_community_reset(&self, admin_id: Option<&AccountId>) -> Result<ResetOutcome, StoreError> {
        let fault = self.take_fault(Procedure::CommunityReset);
        let null_payload = matches!(fault, Some(Fault::Count(None)));
        let outcome = self.transact(|tables| {
            let deleted_posts = tables.sweep_posts();
            let deleted_groups = tables.sweep_groups();

            if let Some(Fault::Fail(msg)) = &fault {
                return Err(StoreError::Database(msg.clone()));
            }

            let now = Utc::now();
            for seed in &self.seed_groups {
                let group = Group::new(seed.name.clone(), seed.external_link.clone(), admin_id.cloned(), now)
                    .map_err(|e| StoreError::Database(format!("perform_community_reset: {e}")))?;
                upsert(&mut tables.groups, group);
            }

            let mut outcome = ResetOutcome {
                deleted_posts,
                deleted_groups,
                created_groups: self.seed_groups.len() as i64,
                integrity_check_passed: tables.orphaned_post_likes() == 0 && tables.orphaned_group_memberships() == 0,
                performed_by: admin_id.cloned(),
                timestamp: now,
            };
            match fault {
                Some(Fault::Count(Some(count))) => outcome.deleted_posts = count,
                Some(Fault::Integrity(passed)) => outcome.integrity_check_passed = passed,
                _ => {}
            }
            Ok(outcome)
        })?;

        // The reset committed; only the reported payload is lost.
        if null_payload {
            return Err(StoreError::InvalidResult {
                operation: "perform_community_reset",
                detail: "NULL".to_string(),
            });
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl IntegrityProbe for InMemoryCommunityStore {
    async fn validate_data_integrity(&self) -> Result<bool, StoreError> {
        match self.take_fault(Procedure::ValidateIntegrity) {
            Some(Fault::Fail(msg)) => Err(StoreError::Database(msg)),
            Some(Fault::Integrity(passed)) => Ok(passed),
            _ => self.read(|t| t.orphaned_post_likes() == 0 && t.orphaned_group_memberships() == 0),
        }
    }

    async fn count_orphaned_post_likes(&self) -> Result<i64, StoreError> {
        self.read(Tables::orphaned_post_likes)
    }

    async fn count_orphaned_group_memberships(&self) -> Result<i64, StoreError> {
        self.read(Tables::orphaned_group_memberships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn populated() -> InMemoryCommunityStore {
        let store = InMemoryCommunityStore::new();
        let post = store.insert_post(Post::new(id("M1"), "hello", Utc::now()));
        store.insert_post(Post::new(id("M2"), "world", Utc::now()));
        store.insert_like(PostLike::new(post, id("M2")));
        let group = store.insert_group(Group::new("Rustaceans", "https://x", Some(id("A1")), Utc::now()).unwrap());
        store.insert_membership(GroupMembership::new(group, id("M1")));
        store
    }

    #[tokio::test]
    async fn cleanup_posts_sweeps_posts_and_likes() {
        let store = populated();
        assert_eq!(store.cleanup_all_posts().await.unwrap(), Some(2));
        assert_eq!(store.post_count(), 0);
        assert_eq!(store.like_count(), 0);
        assert_eq!(store.group_count(), 1);
    }

    #[tokio::test]
    async fn failed_cleanup_rolls_back() {
        let store = populated();
        store.fail_next(Procedure::CleanupAllGroups, "deadlock detected");

        let err = store.cleanup_all_groups().await.unwrap_err();
        assert_eq!(err, StoreError::Database("deadlock detected".to_string()));
        assert_eq!(store.group_count(), 1);
        assert_eq!(store.membership_count(), 1);

        // Fault is one-shot.
        assert_eq!(store.cleanup_all_groups().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn failed_reset_leaves_everything_in_place() {
        let store = populated();
        store.fail_next(Procedure::CommunityReset, "disk full");

        assert!(store.perform_community_reset(None).await.is_err());
        assert_eq!(store.post_count(), 2);
        assert_eq!(store.group_names(), vec!["Rustaceans".to_string()]);
    }

    #[tokio::test]
    async fn reset_replaces_groups_with_seed_set() {
        let store = populated();
        let outcome = store.perform_community_reset(Some(&id("A1"))).await.unwrap();
        assert_eq!(outcome.deleted_posts, 2);
        assert_eq!(outcome.deleted_groups, 1);
        assert_eq!(outcome.created_groups, 5);
        assert!(outcome.integrity_check_passed);
        assert_eq!(outcome.performed_by, Some(id("A1")));
        assert_eq!(store.group_count(), 5);
        assert_eq!(store.post_count(), 0);
    }

    #[tokio::test]
    async fn reset_reports_injected_results_but_still_commits() {
        let store = populated();
        store.report_count_next(Procedure::CommunityReset, Some(-7));
        let outcome = store.perform_community_reset(None).await.unwrap();
        assert_eq!(outcome.deleted_posts, -7);
        assert_eq!(store.group_count(), 5);

        store.report_integrity_next(Procedure::CommunityReset, false);
        assert!(!store.perform_community_reset(None).await.unwrap().integrity_check_passed);

        store.report_count_next(Procedure::CommunityReset, None);
        let err = store.perform_community_reset(None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidResult { .. }));
        assert_eq!(store.group_count(), 5);
    }

    #[tokio::test]
    async fn orphans_are_counted() {
        let store = populated();
        let lonely = store.insert_post(Post::new(id("M3"), "bye", Utc::now()));
        store.insert_like(PostLike::new(lonely, id("M1")));
        store.insert_like(PostLike::new(lonely, id("M2")));
        store.hard_delete_post(lonely);

        assert_eq!(store.count_orphaned_post_likes().await.unwrap(), 2);
        assert_eq!(store.count_orphaned_group_memberships().await.unwrap(), 0);
        assert!(!store.validate_data_integrity().await.unwrap());
    }

    #[tokio::test]
    async fn inactive_post_is_not_an_orphan_parent() {
        let store = InMemoryCommunityStore::new();
        let mut post = Post::new(id("M1"), "hidden", Utc::now());
        post.is_active = false;
        let post_id = store.insert_post(post);
        store.insert_like(PostLike::new(post_id, id("M2")));

        assert_eq!(store.count_orphaned_post_likes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lookup_fault_surfaces_as_lookup_error() {
        let store = populated();
        store.fail_next(Procedure::Lookup, "replica lag");
        let err = store.account(&id("A1")).await.unwrap_err();
        assert_eq!(err, LookupError::new("replica lag"));
    }
}
