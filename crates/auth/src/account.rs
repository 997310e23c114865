//! Accounts and their role assignments.
//!
//! The effective role of an account is a pure function of its assignments and
//! the current time; see [`effective_role`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_core::AccountId;

use crate::Role;

/// Identity record owned by the authentication subsystem (read-only here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub is_active: bool,
    pub is_verified: bool,
}

/// A grant of `role` to an account.
///
/// Assignments are never mutated: they expire at `expires_at`, or are
/// superseded by new assignments or deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub account_id: AccountId,
    pub role: Role,
    pub granted_by: Option<AccountId>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl RoleAssignment {
    /// An assignment counts at `now` iff it is active, already granted, and not expired.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.granted_at > now {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Compute the effective role from an account record and its assignments.
///
/// - no account record, or an inactive account ⇒ `Guest`
/// - otherwise the highest role among assignments effective at `now`, else `Guest`
///
/// Assignments belonging to other accounts are ignored.
pub fn effective_role(account: Option<&Account>, assignments: &[RoleAssignment], now: DateTime<Utc>) -> Role {
    let Some(account) = account else {
        return Role::Guest;
    };
    if !account.is_active {
        return Role::Guest;
    }

    assignments
        .iter()
        .filter(|a| a.account_id == account.id && a.is_effective_at(now))
        .map(|a| a.role)
        .max()
        .unwrap_or(Role::Guest)
}
