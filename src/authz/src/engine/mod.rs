//! Policy evaluator
//!
//! Answers one authorization question per call:
//!
//! ```text
//! request → RoleResolver (unchecked read) → enabled? → RuleSet::select → ownership → state → Decision
//!                                                                                            ↓
//!                                                                           [audit sink]  [metrics]
//! ```
//!
//! There is no decision cache. Each call resolves the actor's role once and
//! evaluates the rule table from scratch.

pub mod audit;
pub mod decision;
pub mod metrics;

pub use audit::{AuditBackend, AuditEntry, AuditLogger, AuditSink, MemoryAuditBackend, TracingAuditBackend};
#[cfg(feature = "postgres")]
pub use audit::PostgresAuditBackend;
pub use decision::{AuthzDecision, AuthzRequest, Decision, DenyReason};
pub use metrics::{EngineMetrics, MetricsCollector};

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ResolveError;
use crate::policy::{RuleSelection, RuleSet};
use crate::resolver::RoleResolver;

/// Evaluates requests against the rule table
#[derive(Clone)]
pub struct PolicyEvaluator {
    resolver: RoleResolver,
    rules: Arc<RuleSet>,
    audit: Option<Arc<dyn AuditSink>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl PolicyEvaluator {
    pub fn new(resolver: RoleResolver, rules: Arc<RuleSet>) -> Self {
        Self {
            resolver,
            rules,
            audit: None,
            metrics: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    /// Decide whether `request` is allowed.
    ///
    /// # Pipeline
    ///
    /// 1. Resolve the actor's role (no profile or store failure denies)
    /// 2. Deny disabled profiles
    /// 3. Select the narrowest rule for (table, operation) admitting the role
    /// 4. Check the rule's ownership predicate
    /// 5. Check the rule's state restriction
    pub async fn authorize(&self, request: &AuthzRequest) -> AuthzDecision {
        let start = Instant::now();

        debug!(
            actor = %request.actor, table = %request.table, operation = %request.operation,
            "Authorization request"
        );

        let decision = self.evaluate(request).await;

        debug!(
            actor = %request.actor,
            table = %request.table,
            operation = %request.operation,
            rule = decision.rule_id.as_deref().unwrap_or("-"),
            "Decision: {}",
            match decision.decision {
                Decision::Allow => "ALLOW".to_string(),
                Decision::Deny(reason) => format!("DENY ({})", reason),
            }
        );

        let latency = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&decision.decision, latency);
        }
        if let Some(audit) = &self.audit {
            audit.record(AuditEntry::from_decision(request, &decision, latency));
        }

        decision
    }

    async fn evaluate(&self, request: &AuthzRequest) -> AuthzDecision {
        let grant = match self.resolver.resolve(&request.actor).await {
            Ok(grant) => grant,
            Err(ResolveError::NotFound) => {
                return AuthzDecision::new(Decision::Deny(DenyReason::NoProfile), None, None)
            }
            Err(ResolveError::Unavailable(_)) => {
                return AuthzDecision::new(Decision::Deny(DenyReason::Unavailable), None, None)
            }
        };

        let role = Some(grant.role);
        if !grant.enabled {
            return AuthzDecision::new(Decision::Deny(DenyReason::Disabled), role, None);
        }

        let rule = match self.rules.select(&request.table, request.operation, grant.role) {
            RuleSelection::NoRules => {
                return AuthzDecision::new(Decision::Deny(DenyReason::NoMatchingRule), role, None)
            }
            RuleSelection::NoRoleMatch => {
                return AuthzDecision::new(Decision::Deny(DenyReason::InsufficientRole), role, None)
            }
            RuleSelection::Matched(rule) => rule,
        };

        debug!(rule = %rule.id, "Selected rule");

        let checks = rule
            .check_ownership(&request.actor, grant.role, request.resource_owner.as_ref())
            .and_then(|_| rule.check_state(request.resource_state.as_deref()));

        let outcome = match checks {
            Ok(()) => Decision::Allow,
            Err(reason) => Decision::Deny(reason),
        };

        AuthzDecision::new(outcome, role, Some(rule.id.clone()))
    }
}
