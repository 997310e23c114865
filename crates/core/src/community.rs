//! Community rows: posts, groups, and the rows that reference them.
//!
//! Dependent rows (`PostLike`, `GroupMembership`) must always point at a parent
//! row that exists. A parent may be inactive (soft-deleted) but it must still be
//! present; a dependent row whose parent is gone is an orphan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, DomainError, DomainResult, Entity, GroupId, MembershipId, PostId, PostLikeId};

/// A post authored by an account.
///
/// Ordinary user actions only soft-delete posts (`is_active = false`); rows are
/// physically removed by the bulk cleanup operations alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: AccountId,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author_id: AccountId, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: PostId::new(),
            author_id,
            content: content.into(),
            is_active: true,
            created_at,
        }
    }

    pub fn is_authored_by(&self, account_id: &AccountId) -> bool {
        &self.author_id == account_id
    }
}

impl Entity for Post {
    type Id = PostId;

    fn id(&self) -> &PostId {
        &self.id
    }
}

/// A community group with an external link (chat room, forum, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub external_link: String,
    /// `None` for groups created by the seeding procedure.
    pub created_by: Option<AccountId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        external_link: impl Into<String>,
        created_by: Option<AccountId>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("group name cannot be empty"));
        }

        Ok(Self {
            id: GroupId::new(),
            name: name.trim().to_string(),
            external_link: external_link.into(),
            created_by,
            is_active: true,
            created_at,
        })
    }
}

impl Entity for Group {
    type Id = GroupId;

    fn id(&self) -> &GroupId {
        &self.id
    }
}

/// A like left on a post by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLike {
    pub id: PostLikeId,
    pub post_id: PostId,
    pub account_id: AccountId,
}

impl PostLike {
    pub fn new(post_id: PostId, account_id: AccountId) -> Self {
        Self {
            id: PostLikeId::new(),
            post_id,
            account_id,
        }
    }
}

impl Entity for PostLike {
    type Id = PostLikeId;

    fn id(&self) -> &PostLikeId {
        &self.id
    }
}

/// Membership of an account in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub account_id: AccountId,
}

impl GroupMembership {
    pub fn new(group_id: GroupId, account_id: AccountId) -> Self {
        Self {
            id: MembershipId::new(),
            group_id,
            account_id,
        }
    }
}

impl Entity for GroupMembership {
    type Id = MembershipId;

    fn id(&self) -> &MembershipId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    #[test]
    fn new_post_is_active_and_owned_by_author() {
        let post = Post::new(account("M1"), "hello", Utc::now());
        assert!(post.is_active);
        assert!(post.is_authored_by(&account("M1")));
        assert!(!post.is_authored_by(&account("M2")));
    }

    #[test]
    fn group_name_is_required() {
        let err = Group::new("   ", "https://chat.example/x", None, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("group name"));
    }

    #[test]
    fn group_name_is_trimmed() {
        let group = Group::new("  General ", "https://chat.example/general", None, Utc::now()).unwrap();
        assert_eq!(group.name, "General");
        assert!(group.is_active);
    }
}
