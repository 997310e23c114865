//! `agora-core`: community domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod community;
pub mod entity;
pub mod error;
pub mod id;

pub use community::{Group, GroupMembership, Post, PostLike};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, GroupId, MembershipId, PostId, PostLikeId};
