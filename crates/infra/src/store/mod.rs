//! Store boundary: the procedural interface the lifecycle layer consumes,
//! plus the in-memory and Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryCommunityStore, Procedure};
pub use postgres::PostgresCommunityStore;
pub use r#trait::{IntegrityProbe, LifecycleProcedures, ResetOutcome, StoreError};
