//! Authorization request and decision types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{ActorId, Operation, Role};

/// One authorization question.
///
/// Owner and state describe the target row and are supplied by the data-access
/// layer; the evaluator never fetches resources itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthzRequest {
    /// Verified actor making the request
    pub actor: ActorId,

    pub operation: Operation,

    /// Protected table
    pub table: String,

    /// Owner of the target row, if the row has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_owner: Option<ActorId>,

    /// Lifecycle state of the target row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_state: Option<String>,
}

impl AuthzRequest {
    pub fn new(actor: ActorId, operation: Operation, table: impl Into<String>) -> Self {
        Self {
            actor,
            operation,
            table: table.into(),
            resource_owner: None,
            resource_state: None,
        }
    }

    pub fn owned_by(mut self, owner: ActorId) -> Self {
        self.resource_owner = Some(owner);
        self
    }

    pub fn in_state(mut self, state: impl Into<String>) -> Self {
        self.resource_state = Some(state.into());
        self
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The actor has no profile
    NoProfile,
    /// The profile store could not be reached
    Unavailable,
    /// The profile is deactivated
    Disabled,
    /// No rule covers (table, operation)
    NoMatchingRule,
    /// Rules exist but none admits the actor's role
    InsufficientRole,
    /// An ownership rule was evaluated without an owner id
    MissingOwnership,
    /// The actor does not own the resource and has no bypass role
    NotOwner,
    /// The resource is not in a state the rule allows
    InvalidState,
}

impl DenyReason {
    pub const ALL: [DenyReason; 8] = [
        DenyReason::NoProfile,
        DenyReason::Unavailable,
        DenyReason::Disabled,
        DenyReason::NoMatchingRule,
        DenyReason::InsufficientRole,
        DenyReason::MissingOwnership,
        DenyReason::NotOwner,
        DenyReason::InvalidState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoProfile => "no_profile",
            DenyReason::Unavailable => "unavailable",
            DenyReason::Disabled => "disabled",
            DenyReason::NoMatchingRule => "no_matching_rule",
            DenyReason::InsufficientRole => "insufficient_role",
            DenyReason::MissingOwnership => "missing_ownership",
            DenyReason::NotOwner => "not_owner",
            DenyReason::InvalidState => "invalid_state",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow or deny, with the deny reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }
}

/// Authorization decision with audit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthzDecision {
    /// Unique decision ID
    pub id: String,

    pub decision: Decision,

    /// Role resolved for this decision, if a profile was found
    pub role: Option<Role>,

    /// Rule that governed the outcome, if one was selected
    pub rule_id: Option<String>,

    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: u64,
}

impl AuthzDecision {
    pub fn new(decision: Decision, role: Option<Role>, rule_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            decision,
            role,
            rule_id,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    pub fn allowed(&self) -> bool {
        self.decision.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let allow = serde_json::to_value(Decision::Allow).unwrap();
        assert_eq!(allow, serde_json::json!({ "effect": "allow" }));

        let deny = serde_json::to_value(Decision::Deny(DenyReason::NotOwner)).unwrap();
        assert_eq!(deny, serde_json::json!({ "effect": "deny", "reason": "not_owner" }));
    }

    #[test]
    fn test_decision_metadata() {
        let decision = AuthzDecision::new(
            Decision::Deny(DenyReason::Disabled),
            Some(Role::Admin),
            None,
        );

        assert!(!decision.allowed());
        assert_eq!(decision.decision.deny_reason(), Some(DenyReason::Disabled));
        assert!(!decision.id.is_empty());
        assert!(decision.timestamp > 0);
    }

    #[test]
    fn test_request_builder() {
        let owner = ActorId::new("owner-1").unwrap();
        let request = AuthzRequest::new(ActorId::new("a").unwrap(), Operation::Update, "remittances")
            .owned_by(owner.clone())
            .in_state("pending");

        assert_eq!(request.resource_owner, Some(owner));
        assert_eq!(request.resource_state.as_deref(), Some("pending"));
    }
}
