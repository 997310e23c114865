//! Irreversible, permission-gated bulk operations.

pub mod coordinator;
pub mod types;

pub use coordinator::DataLifecycleCoordinator;
pub use types::{
    CleanupResult, CommunityResetResult, CompleteCleanupResult, CoordinatorConfig, LifecycleError, OperationPhase,
    ResetAuthority,
};
