//! Profile storage
//!
//! Two access paths reach profile rows:
//!
//! - [`ProfileStore`]: the general path. In a real deployment every read on it is
//!   subject to the store's row-level enforcement, and inside this crate it is only
//!   reached through [`ProfileDirectory`](crate::directory::ProfileDirectory), which
//!   asks the policy evaluator first.
//! - [`UncheckedProfileReader`]: the trust-boundary path. Its single method takes a
//!   [`TrustBoundary`] token, which only the role resolver can mint.

use async_trait::async_trait;

use crate::error::Result;
use crate::resolver::TrustBoundary;
use crate::types::{ActorId, Profile, Role, RoleGrant};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryProfileStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProfileStore;

/// Administrative change to a single profile column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdate {
    Role(Role),
    Enabled(bool),
}

/// General-purpose profile access
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile row
    async fn get(&self, actor: &ActorId) -> Result<Option<Profile>>;

    /// Insert a profile if the actor has none yet.
    ///
    /// Returns `true` when a row was created.
    async fn provision(&self, profile: Profile) -> Result<bool>;

    /// Change an existing profile's role
    async fn set_role(&self, actor: &ActorId, role: Role) -> Result<Profile>;

    /// Enable or disable an existing profile
    async fn set_enabled(&self, actor: &ActorId, enabled: bool) -> Result<Profile>;

    /// Apply `update` only while the row's current role is at most `ceiling`.
    ///
    /// The rank check and the write are one atomic step, so a concurrent
    /// promotion cannot slip in between them. An outranking row yields
    /// `Forbidden` and is left untouched.
    async fn update_if_at_most(&self, actor: &ActorId, ceiling: Role, update: ProfileUpdate) -> Result<Profile>;
}

/// Profile lookup that bypasses row-level enforcement.
///
/// Implementations must read exactly one row keyed by `actor` and must not call
/// back into the policy evaluator. An `Err` means the store could not be reached.
#[async_trait]
pub trait UncheckedProfileReader: Send + Sync {
    async fn read_grant_unchecked(
        &self,
        boundary: &TrustBoundary,
        actor: &ActorId,
    ) -> Result<Option<RoleGrant>>;
}
