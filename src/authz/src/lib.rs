//! # Remitgate Authorization
//!
//! Role-based, ownership-aware authorization for the remittance application.
//!
//! ## Components
//!
//! - **Role resolver**: reads an actor's role and enablement from its profile row
//!   through the one declared trust-boundary path
//! - **Policy evaluator**: checks a request against a declarative rule table keyed
//!   by (table, operation); fail-closed on every missing input
//! - **Profile directory**: evaluator-gated profile reads and administrative updates
//! - **Audit and metrics**: non-blocking audit sink and atomic decision counters
//!
//! ## Example
//!
//! ```rust
//! use remitgate_authz::{
//!     ActorId, AuthzRequest, Decision, Operation, PolicyEvaluator, Profile, Role,
//!     RoleResolver, RuleSet,
//! };
//! use remitgate_authz::store::InMemoryProfileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ActorId::new("b1d2")?;
//!     let store = InMemoryProfileStore::with_profiles([
//!         Profile::provisioned(manager.clone(), "m@example.com", "M").with_role(Role::Manager),
//!     ]);
//!
//!     let evaluator = PolicyEvaluator::new(
//!         RoleResolver::new(Arc::new(store)),
//!         Arc::new(RuleSet::remittance_defaults()),
//!     );
//!
//!     let request = AuthzRequest::new(manager, Operation::Create, "remittance_types");
//!     let decision = evaluator.authorize(&request).await;
//!
//!     assert!(!decision.allowed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod http;
pub mod policy;
pub mod resolver;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use directory::ProfileDirectory;
pub use engine::{AuthzDecision, AuthzRequest, Decision, DenyReason, PolicyEvaluator};
pub use error::{AuthzError, ResolveError, Result};
pub use policy::{OwnershipRequirement, PolicyRule, RoleRequirement, RuleSet};
pub use resolver::RoleResolver;
pub use types::{ActorId, Operation, Profile, Role, RoleGrant};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
