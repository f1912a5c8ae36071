//! Declarative policy rules
//!
//! A [`RuleSet`] is a finite table of [`PolicyRule`]s keyed by (table, operation).
//! It is plain data: it can be loaded from TOML or JSON, listed for audit, and
//! swapped without touching the evaluator.
//!
//! ```toml
//! [[rule]]
//! id = "remittances.update.owner"
//! table = "remittances"
//! operation = "update"
//! role = { at_least = "user" }
//! ownership = { bypass = "admin" }
//! states = ["pending"]
//! ```

mod defaults;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::engine::decision::DenyReason;
use crate::error::{AuthzError, Result};
use crate::types::{ActorId, Operation, Role};

/// Role predicate of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRequirement {
    /// Role must be at or above the threshold
    AtLeast(Role),
    /// Role must equal the given role
    Exactly(Role),
}

impl RoleRequirement {
    pub fn matches(&self, role: Role) -> bool {
        match *self {
            RoleRequirement::AtLeast(threshold) => role >= threshold,
            RoleRequirement::Exactly(required) => role == required,
        }
    }

    /// Ordering key: larger is narrower
    fn specificity(&self) -> (u8, Role) {
        match *self {
            RoleRequirement::AtLeast(role) => (0, role),
            RoleRequirement::Exactly(role) => (1, role),
        }
    }
}

/// Ownership predicate of a rule.
///
/// The resource owner must be the acting actor, unless the actor's role is at or
/// above `bypass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnershipRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass: Option<Role>,
}

impl OwnershipRequirement {
    pub fn owner_only() -> Self {
        Self { bypass: None }
    }

    pub fn owner_or(role: Role) -> Self {
        Self { bypass: Some(role) }
    }
}

/// One row of the rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier reported on decisions
    pub id: String,

    /// Protected table name
    pub table: String,

    pub operation: Operation,

    pub role: RoleRequirement,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipRequirement>,

    /// Lifecycle states in which the operation is allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<String>>,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        table: impl Into<String>,
        operation: Operation,
        role: RoleRequirement,
    ) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            operation,
            role,
            ownership: None,
            states: None,
        }
    }

    pub fn with_ownership(mut self, ownership: OwnershipRequirement) -> Self {
        self.ownership = Some(ownership);
        self
    }

    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = Some(states.into_iter().map(Into::into).collect());
        self
    }

    /// Check the ownership predicate, if any
    pub fn check_ownership(
        &self,
        actor: &ActorId,
        role: Role,
        owner: Option<&ActorId>,
    ) -> std::result::Result<(), DenyReason> {
        let Some(ownership) = &self.ownership else {
            return Ok(());
        };

        let owner = owner.ok_or(DenyReason::MissingOwnership)?;
        if owner == actor {
            return Ok(());
        }

        match ownership.bypass {
            Some(bypass) if role >= bypass => Ok(()),
            _ => Err(DenyReason::NotOwner),
        }
    }

    /// Check the lifecycle-state restriction, if any
    pub fn check_state(&self, state: Option<&str>) -> std::result::Result<(), DenyReason> {
        let Some(allowed) = &self.states else {
            return Ok(());
        };

        match state {
            Some(state) if allowed.iter().any(|s| s == state) => Ok(()),
            _ => Err(DenyReason::InvalidState),
        }
    }
}

/// Result of looking up the governing rule for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSelection<'a> {
    /// Nothing is declared for (table, operation)
    NoRules,
    /// Rules exist but none admits the role
    NoRoleMatch,
    /// The most specific rule admitting the role
    Matched(&'a PolicyRule),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<PolicyRule>,
}

/// Validated, enumerable rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<PolicyRule>,
}

impl RuleSet {
    /// Build a rule set, rejecting malformed or ambiguous tables
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut keys = HashSet::new();

        for rule in &rules {
            if rule.id.trim().is_empty() {
                return Err(AuthzError::InvalidRuleSet("rule id must not be empty".to_string()));
            }
            if rule.table.trim().is_empty() {
                return Err(AuthzError::InvalidRuleSet(format!("rule '{}' has an empty table", rule.id)));
            }
            if matches!(&rule.states, Some(states) if states.is_empty()) {
                return Err(AuthzError::InvalidRuleSet(format!(
                    "rule '{}' restricts states to an empty set",
                    rule.id
                )));
            }
            if !ids.insert(rule.id.as_str()) {
                return Err(AuthzError::InvalidRuleSet(format!("duplicate rule id '{}'", rule.id)));
            }
            if !keys.insert((rule.table.as_str(), rule.operation, rule.role)) {
                return Err(AuthzError::InvalidRuleSet(format!(
                    "rule '{}' repeats the role requirement of another {}.{} rule",
                    rule.id, rule.table, rule.operation
                )));
            }
        }

        Ok(Self { rules })
    }

    /// Built-in rule table for the remittance application
    pub fn remittance_defaults() -> Self {
        Self {
            rules: defaults::remittance_rules(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(source)
            .map_err(|e| AuthzError::InvalidRuleSet(format!("failed to parse TOML rules: {}", e)))?;
        Self::new(file.rules)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(source)
            .map_err(|e| AuthzError::InvalidRuleSet(format!("failed to parse JSON rules: {}", e)))?;
        Self::new(file.rules)
    }

    /// Load rules from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let file = RuleFile {
            rules: self.rules.clone(),
        };
        toml::to_string_pretty(&file)
            .map_err(|e| AuthzError::Internal(format!("failed to serialize rules: {}", e)))
    }

    /// Every rule, in declaration order
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules declared for (table, operation), in declaration order
    pub fn rules_for<'a, 'b>(
        &'a self,
        table: &'b str,
        operation: Operation,
    ) -> impl Iterator<Item = &'a PolicyRule> + 'b
    where
        'a: 'b,
    {
        self.rules
            .iter()
            .filter(move |rule| rule.table == table && rule.operation == operation)
    }

    /// Pick the governing rule for `role` on (table, operation).
    ///
    /// Only rules whose role requirement admits `role` are candidates; the
    /// narrowest one wins. `Exactly` beats every `AtLeast`, and a higher
    /// `AtLeast` threshold beats a lower one.
    pub fn select(&self, table: &str, operation: Operation, role: Role) -> RuleSelection<'_> {
        let mut declared = false;
        let mut best: Option<&PolicyRule> = None;

        let declared_rules = self
            .rules
            .iter()
            .filter(|rule| rule.table == table && rule.operation == operation);
        for rule in declared_rules {
            declared = true;
            if !rule.role.matches(role) {
                continue;
            }
            if best.map_or(true, |current| rule.role.specificity() > current.role.specificity()) {
                best = Some(rule);
            }
        }

        match (declared, best) {
            (false, _) => RuleSelection::NoRules,
            (true, None) => RuleSelection::NoRoleMatch,
            (true, Some(rule)) => RuleSelection::Matched(rule),
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::remittance_defaults()
    }
}
