//! Postgres-backed community store.
//!
//! The destructive work lives in stored procedures (see `schema.sql`); this
//! module only calls them and decodes their results. Each procedure runs as a
//! single statement, so Postgres gives us the all-or-nothing guarantee, and
//! the shared advisory lock inside the procedures serializes concurrent calls.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database | `Database` (carries the server message) |
//! | PoolTimedOut / PoolClosed / Io | `Unavailable` |
//! | Decode / ColumnDecode | `InvalidResult` |
//! | Other | `Database` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, instrument, warn};

use agora_auth::{Account, LookupError, PostDirectory, Role, RoleAssignment, RoleSource};
use agora_core::{AccountId, Post, PostId};

use super::r#trait::{IntegrityProbe, LifecycleProcedures, ResetOutcome, StoreError};
use crate::config::DatabaseConfig;
use crate::seed::{canonical_seed_groups, SeedGroup};

const SCHEMA: &str = include_str!("schema.sql");

/// Postgres-backed community store.
///
/// `Clone` is cheap (shared pool); every clone talks to the same database.
#[derive(Debug, Clone)]
pub struct PostgresCommunityStore {
    pool: Arc<PgPool>,
}

impl PostgresCommunityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool using `config`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.url.expose_secret())
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and (re)define the lifecycle procedures. Idempotent.
    ///
    /// An empty `community_seed_groups` table receives the canonical groups,
    /// so a reset never recreates zero groups. An existing list is left alone;
    /// use [`sync_seed_groups`](Self::sync_seed_groups) to replace it.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Two concurrent callers must not both see an empty table.
        sqlx::query("LOCK TABLE community_seed_groups IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;

        let already_seeded: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM community_seed_groups)")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;

        let defaults = initial_seed_groups(already_seeded);
        insert_seed_groups(&mut tx, &defaults).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        if !defaults.is_empty() {
            info!(count = defaults.len(), "seeded canonical community groups");
        }
        Ok(())
    }

    /// Replace the stored seed-group list that a reset recreates.
    #[instrument(skip(self, groups), fields(count = groups.len()), err)]
    pub async fn sync_seed_groups(&self, groups: &[SeedGroup]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM community_seed_groups")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("sync_seed_groups", e))?;
        insert_seed_groups(&mut tx, groups).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn call_count(&self, operation: &'static str, sql: &str) -> Result<Option<i64>, StoreError> {
        let count: Option<i32> = sqlx::query_scalar(sql)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(count.map(i64::from))
    }
}

#[async_trait::async_trait]
impl RoleSource for PostgresCommunityStore {
    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn account(&self, account_id: &AccountId) -> Result<Option<Account>, LookupError> {
        let row = sqlx::query("SELECT is_active, is_verified FROM accounts WHERE id = $1")
            .bind(account_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_account", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Account {
            id: account_id.clone(),
            is_active: row.try_get("is_active").map_err(|e| map_sqlx_error("load_account", e))?,
            is_verified: row.try_get("is_verified").map_err(|e| map_sqlx_error("load_account", e))?,
        }))
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn role_assignments(&self, account_id: &AccountId) -> Result<Vec<RoleAssignment>, LookupError> {
        let rows = sqlx::query(
            r#"
            SELECT role, granted_by, granted_at, expires_at, is_active
            FROM role_assignments
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_role_assignments", e))?;

        let mut assignments = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |e| map_sqlx_error("load_role_assignments", e);
            let role_name: String = row.try_get("role").map_err(decode)?;
            // Unknown role names grant nothing.
            let Ok(role) = role_name.parse::<Role>() else {
                warn!(account_id = %account_id, role = %role_name, "skipping assignment with unknown role");
                continue;
            };
            let granted_by: Option<String> = row.try_get("granted_by").map_err(decode)?;
            let granted_at: DateTime<Utc> = row.try_get("granted_at").map_err(decode)?;
            let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").map_err(decode)?;
            let is_active: bool = row.try_get("is_active").map_err(decode)?;

            assignments.push(RoleAssignment {
                account_id: account_id.clone(),
                role,
                granted_by: AccountId::from_raw(granted_by.as_deref()),
                granted_at,
                expires_at,
                is_active,
            });
        }
        Ok(assignments)
    }
}

#[async_trait::async_trait]
impl PostDirectory for PostgresCommunityStore {
    #[instrument(skip(self), fields(post_id = %post_id), err)]
    async fn post(&self, post_id: PostId) -> Result<Option<Post>, LookupError> {
        let row = sqlx::query("SELECT author_id, content, is_active, created_at FROM posts WHERE id = $1")
            .bind(post_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_post", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e| map_sqlx_error("load_post", e);
        let author: String = row.try_get("author_id").map_err(decode)?;
        let author_id = AccountId::parse(&author).map_err(|e| StoreError::InvalidResult {
            operation: "load_post",
            detail: format!("an invalid author id: {e}"),
        })?;

        Ok(Some(Post {
            id: post_id,
            author_id,
            content: row.try_get("content").map_err(decode)?,
            is_active: row.try_get("is_active").map_err(decode)?,
            created_at: row.try_get("created_at").map_err(decode)?,
        }))
    }
}

#[async_trait::async_trait]
impl LifecycleProcedures for PostgresCommunityStore {
    #[instrument(skip(self), err)]
    async fn cleanup_all_posts(&self) -> Result<Option<i64>, StoreError> {
        self.call_count("cleanup_all_posts", "SELECT cleanup_all_posts()").await
    }

    #[instrument(skip(self), err)]
    async fn cleanup_all_groups(&self) -> Result<Option<i64>, StoreError> {
        self.call_count("cleanup_all_groups", "SELECT cleanup_all_groups()").await
    }

    #[instrument(skip(self), fields(admin_id = admin_id.map(AccountId::as_str)), err)]
    async fn perform_community_reset(&self, admin_id: Option<&AccountId>) -> Result<ResetOutcome, StoreError> {
        let payload: Option<serde_json::Value> = sqlx::query_scalar("SELECT perform_community_reset($1)")
            .bind(admin_id.map(AccountId::as_str))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("perform_community_reset", e))?;

        let payload = payload.ok_or(StoreError::InvalidResult {
            operation: "perform_community_reset",
            detail: "NULL".to_string(),
        })?;
        serde_json::from_value(payload).map_err(|e| StoreError::InvalidResult {
            operation: "perform_community_reset",
            detail: format!("an undecodable payload: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl IntegrityProbe for PostgresCommunityStore {
    #[instrument(skip(self), err)]
    async fn validate_data_integrity(&self) -> Result<bool, StoreError> {
        let passed: Option<bool> = sqlx::query_scalar("SELECT validate_data_integrity()")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("validate_data_integrity", e))?;
        Ok(passed.unwrap_or(false))
    }

    #[instrument(skip(self), err)]
    async fn count_orphaned_post_likes(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM post_likes l
            LEFT JOIN posts p ON p.id = l.post_id
            WHERE p.id IS NULL
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_orphaned_post_likes", e))
    }

    #[instrument(skip(self), err)]
    async fn count_orphaned_group_memberships(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM group_memberships m
            LEFT JOIN groups g ON g.id = m.group_id
            WHERE g.id IS NULL
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_orphaned_group_memberships", e))
    }
}

/// Map SQLx errors to `StoreError`. The server message is kept verbatim.
/// Seed groups `apply_schema` writes: the canonical set, and only into an
/// empty table.
fn initial_seed_groups(already_seeded: bool) -> Vec<SeedGroup> {
    if already_seeded {
        Vec::new()
    } else {
        canonical_seed_groups()
    }
}

async fn insert_seed_groups(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    groups: &[SeedGroup],
) -> Result<(), StoreError> {
    for (position, group) in groups.iter().enumerate() {
        sqlx::query("INSERT INTO community_seed_groups (position, name, external_link) VALUES ($1, $2, $3)")
            .bind(position as i32)
            .bind(&group.name)
            .bind(&group.external_link)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("sync_seed_groups", e))?;
    }
    Ok(())
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Database(db_err.message().to_string()),
        sqlx::Error::PoolTimedOut => StoreError::Unavailable(format!("{operation}: connection pool timed out")),
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("{operation}: connection pool closed")),
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("{operation}: {e}")),
        sqlx::Error::ColumnDecode { index, source } => StoreError::InvalidResult {
            operation,
            detail: format!("an undecodable column {index}: {source}"),
        },
        sqlx::Error::Decode(e) => StoreError::InvalidResult {
            operation,
            detail: format!("an undecodable value: {e}"),
        },
        other => StoreError::Database(format!("{operation}: {other}")),
    }
}
