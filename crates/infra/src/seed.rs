//! Canonical seed groups recreated by a community reset.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use agora_core::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedGroup {
    pub name: String,
    pub external_link: String,
}

impl SeedGroup {
    pub fn new(name: impl Into<String>, external_link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_link: external_link.into(),
        }
    }
}

/// The built-in canonical group list.
pub fn canonical_seed_groups() -> Vec<SeedGroup> {
    vec![
        SeedGroup::new("General", "https://chat.agora.community/general"),
        SeedGroup::new("Announcements", "https://chat.agora.community/announcements"),
        SeedGroup::new("Help & Support", "https://chat.agora.community/help"),
        SeedGroup::new("Introductions", "https://chat.agora.community/introductions"),
        SeedGroup::new("Off Topic", "https://chat.agora.community/off-topic"),
    ]
}

/// Names must be non-empty and unique (case-insensitive).
pub fn validate_seed_groups(groups: &[SeedGroup]) -> DomainResult<()> {
    let mut seen = HashSet::new();
    for group in groups {
        let name = group.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("seed group name cannot be empty"));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(DomainError::validation(format!("duplicate seed group '{name}'")));
        }
    }
    Ok(())
}
