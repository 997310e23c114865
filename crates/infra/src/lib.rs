//! Infrastructure layer: store adapters, lifecycle coordination, config.

pub mod config;
pub mod integrity;
pub mod lifecycle;
pub mod seed;
pub mod store;

pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use integrity::{IntegrityReport, IntegrityValidator, OrphanedRecords};
pub use lifecycle::{
    CleanupResult, CommunityResetResult, CompleteCleanupResult, CoordinatorConfig, DataLifecycleCoordinator,
    LifecycleError, ResetAuthority,
};
pub use seed::SeedGroup;
pub use store::{
    InMemoryCommunityStore, IntegrityProbe, LifecycleProcedures, PostgresCommunityStore, ResetOutcome, StoreError,
};
