//! Role resolver
//!
//! The resolver is the only component allowed to read profile rows without going
//! through the policy evaluator. That permission is the [`TrustBoundary`] token:
//! it has no public constructor, so the unchecked read path can only be entered
//! from [`RoleResolver::resolve`].
//!
//! # Example
//!
//! ```rust
//! use remitgate_authz::resolver::RoleResolver;
//! use remitgate_authz::store::InMemoryProfileStore;
//! use remitgate_authz::types::{ActorId, Profile, Role};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let actor = ActorId::new("8c1f0e1a")?;
//! let store = InMemoryProfileStore::with_profiles([
//!     Profile::provisioned(actor.clone(), "ana@example.com", "Ana").with_role(Role::Manager),
//! ]);
//!
//! let resolver = RoleResolver::new(Arc::new(store));
//! let grant = resolver.resolve(&actor).await?;
//! assert_eq!(grant.role, Role::Manager);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::engine::metrics::MetricsCollector;
use crate::error::ResolveError;
use crate::store::UncheckedProfileReader;
use crate::types::{ActorId, RoleGrant};

/// Default upper bound on one profile lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Capability to read profile rows without row-level enforcement.
///
/// Only this module can create one.
#[derive(Debug)]
pub struct TrustBoundary {
    _sealed: (),
}

impl TrustBoundary {
    fn enter() -> Self {
        Self { _sealed: () }
    }
}

/// Resolves an actor's role and enablement from its profile row
#[derive(Clone)]
pub struct RoleResolver {
    reader: Arc<dyn UncheckedProfileReader>,
    lookup_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RoleResolver {
    pub fn new(reader: Arc<dyn UncheckedProfileReader>) -> Self {
        Self {
            reader,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    /// Look up the current role and enablement for `actor`.
    ///
    /// Performs exactly one unchecked read. A missing profile is
    /// [`ResolveError::NotFound`]; a store failure or a lookup slower than the
    /// configured timeout is [`ResolveError::Unavailable`].
    pub async fn resolve(&self, actor: &ActorId) -> Result<RoleGrant, ResolveError> {
        let start = Instant::now();
        let boundary = TrustBoundary::enter();

        let lookup = self.reader.read_grant_unchecked(&boundary, actor);
        let outcome = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(grant))) => Ok(grant),
            Ok(Ok(None)) => Err(ResolveError::NotFound),
            Ok(Err(e)) => Err(ResolveError::Unavailable(e.to_string())),
            Err(_) => Err(ResolveError::Unavailable(format!(
                "lookup exceeded {}ms",
                self.lookup_timeout.as_millis()
            ))),
        };

        match &outcome {
            Ok(grant) => debug!(
                actor = %actor, role = %grant.role, enabled = grant.enabled,
                "Resolved profile"
            ),
            Err(ResolveError::NotFound) => debug!(actor = %actor, "No profile for actor"),
            Err(ResolveError::Unavailable(reason)) => {
                warn!(actor = %actor, "Profile store unavailable: {}", reason)
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_resolution(&outcome, start.elapsed());
        }

        outcome
    }
}
