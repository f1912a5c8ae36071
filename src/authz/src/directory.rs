//! Guarded profile access
//!
//! Every read and write of profile rows outside the role resolver goes through
//! here, and every call is decided by the policy evaluator on the `profiles`
//! table first. The evaluator in turn reads the caller's role through the
//! resolver's unchecked path, so reading a profile never re-enters this module.

use std::sync::Arc;
use tracing::info;

use crate::engine::{AuthzDecision, AuthzRequest, Decision, PolicyEvaluator};
use crate::error::{AuthzError, Result};
use crate::store::{ProfileStore, ProfileUpdate};
use crate::types::{ActorId, Operation, Profile, Role};

/// Table name the profile rules are declared under
pub const PROFILES_TABLE: &str = "profiles";

/// Evaluator-gated profile reads and administrative updates
#[derive(Clone)]
pub struct ProfileDirectory {
    evaluator: PolicyEvaluator,
    store: Arc<dyn ProfileStore>,
}

impl ProfileDirectory {
    pub fn new(evaluator: PolicyEvaluator, store: Arc<dyn ProfileStore>) -> Self {
        Self { evaluator, store }
    }

    async fn gate(&self, caller: &ActorId, operation: Operation, target: &ActorId) -> Result<AuthzDecision> {
        let request = AuthzRequest::new(caller.clone(), operation, PROFILES_TABLE).owned_by(target.clone());
        let decision = self.evaluator.authorize(&request).await;

        match decision.decision {
            Decision::Allow => Ok(decision),
            Decision::Deny(reason) => Err(AuthzError::Forbidden(format!(
                "{} {} on {}: {}",
                operation, PROFILES_TABLE, target, reason
            ))),
        }
    }

    /// Read `target`'s profile as `caller`
    pub async fn get(&self, caller: &ActorId, target: &ActorId) -> Result<Profile> {
        self.gate(caller, Operation::Read, target).await?;
        self.store
            .get(target)
            .await?
            .ok_or_else(|| AuthzError::ProfileNotFound(target.to_string()))
    }

    /// Change `target`'s role.
    ///
    /// Callers cannot change their own role, cannot grant a role above their
    /// own, and cannot modify a profile that outranks them.
    pub async fn set_role(&self, caller: &ActorId, target: &ActorId, role: Role) -> Result<Profile> {
        let decision = self.gate(caller, Operation::Update, target).await?;
        let caller_role = Self::decided_role(&decision)?;

        if caller == target {
            return Err(AuthzError::Forbidden("cannot change own role".to_string()));
        }
        if role > caller_role {
            return Err(AuthzError::Forbidden(format!(
                "{} cannot grant {}",
                caller_role, role
            )));
        }

        let profile = self
            .store
            .update_if_at_most(target, caller_role, ProfileUpdate::Role(role))
            .await?;
        info!(caller = %caller, target = %target, role = %role, "Profile role changed");
        Ok(profile)
    }

    /// Enable or disable `target`'s profile
    pub async fn set_enabled(&self, caller: &ActorId, target: &ActorId, enabled: bool) -> Result<Profile> {
        let decision = self.gate(caller, Operation::Update, target).await?;
        let caller_role = Self::decided_role(&decision)?;

        if caller == target && !enabled {
            return Err(AuthzError::Forbidden("cannot disable own profile".to_string()));
        }

        let profile = self
            .store
            .update_if_at_most(target, caller_role, ProfileUpdate::Enabled(enabled))
            .await?;
        info!(caller = %caller, target = %target, enabled, "Profile enablement changed");
        Ok(profile)
    }

    fn decided_role(decision: &AuthzDecision) -> Result<Role> {
        decision
            .role
            .ok_or_else(|| AuthzError::Internal("allowed decision without a resolved role".to_string()))
    }
}
