//! # Remitgate Session Gate
//!
//! Client-side cache of the authenticated actor and its resolved role, used to
//! gate route rendering without ever blocking on the network.
//!
//! - [`SessionGate`]: the four-state machine (`Unauthenticated`, `Resolving`,
//!   `Ready`, `Degraded`) with sequence-numbered resolution tickets
//! - [`SessionController`]: drives resolutions through a [`RoleSource`] under a
//!   bounded timeout and publishes state on a watch channel
//!
//! ## Example
//!
//! ```rust
//! use remitgate_authz::{store::InMemoryProfileStore, ActorId, Profile, Role, RoleResolver};
//! use remitgate_session::{GateConfig, SessionController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let actor = ActorId::new("c0ffee")?;
//!     let store = InMemoryProfileStore::with_profiles([
//!         Profile::provisioned(actor.clone(), "c@example.com", "C").with_role(Role::Manager),
//!     ]);
//!
//!     let session = SessionController::new(
//!         Arc::new(RoleResolver::new(Arc::new(store))),
//!         &GateConfig::default(),
//!     )?;
//!
//!     session.login(actor).await;
//!     assert!(session.may_access(Role::Manager));
//!     assert!(!session.may_access(Role::Admin));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod source;

pub use config::GateConfig;
pub use controller::{SessionController, SessionWatcher};
pub use error::{GateError, Result};
pub use gate::{Completion, GateState, ResolutionTicket, SessionGate, SessionSnapshot};
pub use source::RoleSource;

#[cfg(feature = "http")]
pub use source::HttpRoleSource;
