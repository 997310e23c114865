//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a post.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(Uuid);

/// Identifier of a group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

/// Identifier of a like on a post.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostLikeId(Uuid);

/// Identifier of a group membership row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(PostId, "PostId");
impl_uuid_newtype!(GroupId, "GroupId");
impl_uuid_newtype!(PostLikeId, "PostLikeId");
impl_uuid_newtype!(MembershipId, "MembershipId");

/// Opaque identifier of an account, issued by the authentication subsystem.
///
/// An `AccountId` is never empty. Callers holding a raw, possibly missing
/// identifier go through [`AccountId::from_raw`], which maps `None`, `""` and
/// whitespace-only input to "unauthenticated" so it never reaches the store as
/// a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parse a non-empty account identifier.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("account id cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Normalize a raw caller identity; `None` means unauthenticated.
    pub fn from_raw(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|r| Self::parse(r).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_ids_are_unauthenticated() {
        assert_eq!(AccountId::from_raw(None), None);
        assert_eq!(AccountId::from_raw(Some("")), None);
        assert_eq!(AccountId::from_raw(Some("   \t")), None);
    }

    #[test]
    fn raw_ids_are_trimmed() {
        let id = AccountId::from_raw(Some("  A1 ")).unwrap();
        assert_eq!(id.as_str(), "A1");
    }

    #[test]
    fn parse_rejects_empty_with_validation_error() {
        let err = AccountId::parse("").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deserializing_empty_account_id_fails() {
        let res: Result<AccountId, _> = serde_json::from_str("\"\"");
        assert!(res.is_err());

        let ok: AccountId = serde_json::from_str("\"M1\"").unwrap();
        assert_eq!(ok.as_str(), "M1");
    }

    #[test]
    fn uuid_ids_round_trip_through_display() {
        let id = PostId::new();
        let parsed: PostId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);

        let bad = "not-a-uuid".parse::<GroupId>();
        assert!(matches!(bad, Err(DomainError::InvalidId(_))));
    }
}
