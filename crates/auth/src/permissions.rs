use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Actions gated by the permission evaluator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreatePost,
    /// The only action with an ownership clause; needs a target post.
    DeletePost,
    /// Gates every destructive/creative group and cleanup operation.
    ManageGroups,
    ViewMembers,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::CreatePost,
        Action::DeletePost,
        Action::ManageGroups,
        Action::ViewMembers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreatePost => "create_post",
            Action::DeletePost => "delete_post",
            Action::ManageGroups => "manage_groups",
            Action::ViewMembers => "view_members",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permission name that does not map to any [`Action`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    /// Accepts snake_case names and the legacy `canXxx` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "create_post" | "canCreatePost" => Ok(Action::CreatePost),
            "delete_post" | "canDeletePost" => Ok(Action::DeletePost),
            "manage_groups" | "canManageGroups" => Ok(Action::ManageGroups),
            "view_members" | "canViewMembers" => Ok(Action::ViewMembers),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn legacy_names_are_accepted() {
        assert_eq!("canManageGroups".parse::<Action>(), Ok(Action::ManageGroups));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "drop_database".parse::<Action>().unwrap_err();
        assert_eq!(err.to_string(), "unknown permission 'drop_database'");
    }
}
