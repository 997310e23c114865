//! `agora-auth`: role resolution and permission decisions.
//!
//! This crate is intentionally decoupled from transport and storage: the store
//! is reached only through the [`RoleSource`] and [`PostDirectory`] ports.

pub mod account;
pub mod evaluator;
pub mod permissions;
pub mod resolver;
pub mod roles;

pub use account::{effective_role, Account, RoleAssignment};
pub use evaluator::{reasons, Decision, PermissionEvaluator};
pub use permissions::{Action, UnknownAction};
pub use resolver::{
    AccountStanding, LookupError, PostDirectory, ResolutionError, ResolvedRole, RoleResolver, RoleSource,
};
pub use roles::{Role, UnknownRole};
