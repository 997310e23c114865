//! `agora-maint`: operator CLI for the lifecycle coordinator.
//!
//! This binary is the trusted maintenance context: `reset` without an admin
//! id runs unchecked.

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use agora_auth::{PostDirectory, RoleSource};
use agora_core::{AccountId, DomainError};
use agora_infra::lifecycle::{DataLifecycleCoordinator, ResetAuthority};
use agora_infra::store::{IntegrityProbe, LifecycleProcedures};

#[derive(Parser, Debug)]
#[command(name = "agora-maint", about = "Maintenance tasks for community data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan for orphaned likes and memberships.
    Validate,
    /// Delete every post with its likes and comments.
    ClearPosts {
        #[arg(value_parser = parse_admin)]
        admin: AccountId,
    },
    /// Delete every group with its memberships.
    ClearGroups {
        #[arg(value_parser = parse_admin)]
        admin: AccountId,
    },
    /// Clear posts, then groups, then validate.
    Cleanup {
        #[arg(value_parser = parse_admin)]
        admin: AccountId,
    },
    /// Replace all posts and groups with the seed groups.
    ///
    /// Without ADMIN the reset runs as trusted maintenance and skips the
    /// permission check.
    Reset {
        #[arg(value_parser = parse_admin)]
        admin: Option<AccountId>,
    },
}

/// A blank id is rejected so it cannot fall through to the unchecked reset.
fn parse_admin(raw: &str) -> Result<AccountId, DomainError> {
    AccountId::parse(raw)
}

/// What to print and how to exit.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub body: Value,
}

impl Outcome {
    fn from_result<T: serde::Serialize>(success: bool, result: &T) -> anyhow::Result<Self> {
        Ok(Self {
            success,
            body: serde_json::to_value(result)?,
        })
    }
}

/// Run one command. Only `reset` returns `Err` for an operational failure;
/// the others report it through `Outcome::success`.
pub async fn run<S>(coordinator: &DataLifecycleCoordinator<S>, command: Command) -> anyhow::Result<Outcome>
where
    S: RoleSource + PostDirectory + LifecycleProcedures + IntegrityProbe + Clone,
{
    info!(command = ?command, "running maintenance command");
    match command {
        Command::Validate => {
            let report = coordinator.validate_integrity().await;
            Outcome::from_result(report.is_valid, &report)
        }
        Command::ClearPosts { admin } => {
            let result = coordinator.clear_all_posts(Some(&admin)).await;
            Outcome::from_result(result.success, &result)
        }
        Command::ClearGroups { admin } => {
            let result = coordinator.clear_all_groups(Some(&admin)).await;
            Outcome::from_result(result.success, &result)
        }
        Command::Cleanup { admin } => {
            let result = coordinator.perform_complete_cleanup(Some(&admin)).await;
            Outcome::from_result(result.overall_success, &result)
        }
        Command::Reset { admin } => {
            let authority = admin.map_or(ResetAuthority::TrustedMaintenance, ResetAuthority::Admin);
            let result = coordinator.perform_community_reset(authority).await?;
            Outcome::from_result(true, &result)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use agora_auth::{Account, Role, RoleAssignment};
    use agora_infra::store::InMemoryCommunityStore;

    use super::*;

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("agora-maint").chain(args.iter().copied())).map(|cli| cli.command)
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(parse(&["validate"]).unwrap(), Command::Validate);
        assert_eq!(parse(&["clear-posts", "A1"]).unwrap(), Command::ClearPosts { admin: id("A1") });
        assert_eq!(parse(&["clear-groups", "A1"]).unwrap(), Command::ClearGroups { admin: id("A1") });
        assert_eq!(parse(&["cleanup", " A1 "]).unwrap(), Command::Cleanup { admin: id("A1") });
        assert_eq!(parse(&["reset"]).unwrap(), Command::Reset { admin: None });
        assert_eq!(parse(&["reset", "A1"]).unwrap(), Command::Reset { admin: Some(id("A1")) });
    }

    #[test]
    fn blank_admin_never_means_trusted() {
        let err = parse(&["reset", "  "]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("account id cannot be empty"));

        assert_eq!(
            parse(&["cleanup", ""]).unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert_eq!(
            parse(&["drop-all"]).unwrap_err().kind(),
            clap::error::ErrorKind::InvalidSubcommand
        );
        assert_eq!(
            parse(&["clear-posts"]).unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
        assert!(parse(&["reset", "A1", "now"]).is_err());
        assert!(parse(&["validate", "A1"]).is_err());
    }

    #[tokio::test]
    async fn denied_clear_reports_failure_without_erroring() {
        let store = InMemoryCommunityStore::arc();
        store.insert_account(Account {
            id: id("M1"),
            is_active: true,
            is_verified: true,
        });
        store.grant_role(RoleAssignment {
            account_id: id("M1"),
            role: Role::Member,
            granted_by: None,
            granted_at: Utc::now() - chrono::Duration::minutes(5),
            expires_at: None,
            is_active: true,
        });
        let coordinator = DataLifecycleCoordinator::new(store);

        let outcome = run(&coordinator, Command::ClearPosts { admin: id("M1") }).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.body["message"], "Permission denied: Only administrators can manage groups.");
    }

    #[tokio::test]
    async fn trusted_reset_seeds_groups() {
        let coordinator = DataLifecycleCoordinator::new(InMemoryCommunityStore::arc());

        let outcome = run(&coordinator, Command::Reset { admin: None }).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.body["created_groups"], 5);
        assert_eq!(outcome.body["performed_by"], Value::Null);
    }

    #[tokio::test]
    async fn reset_for_unknown_admin_is_an_error() {
        let coordinator = DataLifecycleCoordinator::new(InMemoryCommunityStore::arc());
        let err = run(&coordinator, Command::Reset { admin: Some(id("ghost")) })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Permission denied: "));
    }
}
