//! Built-in rule table for the remittance application.
//!
//! Mirrors `config/rules.toml`.

use super::{OwnershipRequirement, PolicyRule, RoleRequirement};
use crate::types::{Operation, Role};

pub(super) fn remittance_rules() -> Vec<PolicyRule> {
    use Operation::*;
    use RoleRequirement::{AtLeast, Exactly};

    vec![
        // Profiles: self-service reads, administrative writes
        PolicyRule::new("profiles.read", "profiles", Read, AtLeast(Role::User))
            .with_ownership(OwnershipRequirement::owner_or(Role::Admin)),
        PolicyRule::new("profiles.update", "profiles", Update, AtLeast(Role::Admin)),
        // Remittance types are a shared catalog with no owner
        PolicyRule::new("remittance_types.read", "remittance_types", Read, AtLeast(Role::User)),
        PolicyRule::new("remittance_types.create", "remittance_types", Create, AtLeast(Role::Admin)),
        PolicyRule::new("remittance_types.update", "remittance_types", Update, AtLeast(Role::Admin)),
        PolicyRule::new("remittance_types.delete", "remittance_types", Delete, AtLeast(Role::Admin)),
        // Remittances
        PolicyRule::new("remittances.read", "remittances", Read, AtLeast(Role::User))
            .with_ownership(OwnershipRequirement::owner_or(Role::Manager)),
        PolicyRule::new("remittances.create", "remittances", Create, AtLeast(Role::User))
            .with_ownership(OwnershipRequirement::owner_only()),
        PolicyRule::new("remittances.update.owner", "remittances", Update, AtLeast(Role::User))
            .with_ownership(OwnershipRequirement::owner_only())
            .with_states(["pending"]),
        PolicyRule::new("remittances.update.staff", "remittances", Update, AtLeast(Role::Manager)),
        PolicyRule::new("remittances.delete", "remittances", Delete, Exactly(Role::SuperAdmin)),
        // Status history
        PolicyRule::new(
            "remittance_status_history.read",
            "remittance_status_history",
            Read,
            AtLeast(Role::User),
        )
        .with_ownership(OwnershipRequirement::owner_or(Role::Manager)),
        PolicyRule::new(
            "remittance_status_history.create",
            "remittance_status_history",
            Create,
            AtLeast(Role::Manager),
        ),
    ]
}
