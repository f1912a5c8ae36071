//! Session gate state machine
//!
//! ```text
//!                    login
//!  Unauthenticated ─────────▶ Resolving ──success/not found──▶ Ready
//!        ▲                      │   ▲                           │
//!        │                      │   └──token refresh/recheck────┤
//!        │                      └──timeout/unavailable──▶ Degraded
//!        └──────────────────logout (from any state)─────────────┘
//! ```
//!
//! The gate itself never awaits. Every resolution it starts is identified by a
//! [`ResolutionTicket`] carrying a sequence number; a result is applied only if
//! its ticket is the latest one issued and the gate is still resolving.

use remitgate_authz::{ActorId, ResolveError, Role, RoleGrant};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Observable gate state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Unauthenticated,
    Resolving,
    /// `role` is `None` when the actor has no profile
    Ready { role: Option<Role>, enabled: bool },
    Degraded,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Unauthenticated => "unauthenticated",
            GateState::Resolving => "resolving",
            GateState::Ready { .. } => "ready",
            GateState::Degraded => "degraded",
        }
    }
}

/// Handle for one in-flight role resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTicket {
    pub seq: u64,
    pub actor: ActorId,
}

/// What happened to a resolution result handed to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer ticket was issued, or the session ended, before the result arrived
    Stale,
}

/// Point-in-time view of the gate, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub actor: Option<ActorId>,
    pub state: GateState,
    /// Sequence number of the latest ticket issued
    pub seq: u64,
    /// When the current role was resolved
    pub resolved_at: Option<Instant>,
}

/// Client-side cache of the authenticated actor and its resolved role
#[derive(Debug)]
pub struct SessionGate {
    state: GateState,
    actor: Option<ActorId>,
    latest_seq: u64,
    pending: Option<u64>,
    resolved_at: Option<Instant>,
    max_role_age: Duration,
}

impl SessionGate {
    pub fn new(max_role_age: Duration) -> Self {
        Self {
            state: GateState::Unauthenticated,
            actor: None,
            latest_seq: 0,
            pending: None,
            resolved_at: None,
            max_role_age,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn actor(&self) -> Option<&ActorId> {
        self.actor.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            actor: self.actor.clone(),
            state: self.state.clone(),
            seq: self.latest_seq,
            resolved_at: self.resolved_at,
        }
    }

    /// Successful authentication. Starts a fresh session for `actor`, replacing
    /// any previous one.
    pub fn login(&mut self, actor: ActorId) -> ResolutionTicket {
        info!(actor = %actor, "Session login");
        self.actor = Some(actor.clone());
        self.resolved_at = None;
        self.begin_resolution(actor)
    }

    /// Token refresh from the authentication provider
    pub fn token_refresh(&mut self) -> Option<ResolutionTicket> {
        self.reresolve("token_refresh")
    }

    /// Re-derive the role on demand, e.g. before a sensitive navigation
    pub fn recheck(&mut self) -> Option<ResolutionTicket> {
        self.reresolve("recheck")
    }

    fn reresolve(&mut self, trigger: &'static str) -> Option<ResolutionTicket> {
        let Some(actor) = self.actor.clone() else {
            debug!(trigger, "Ignoring re-resolution without a session");
            return None;
        };
        debug!(trigger, from = self.state.as_str(), "Re-resolving role");
        Some(self.begin_resolution(actor))
    }

    fn begin_resolution(&mut self, actor: ActorId) -> ResolutionTicket {
        self.latest_seq += 1;
        self.pending = Some(self.latest_seq);
        self.state = GateState::Resolving;

        ResolutionTicket {
            seq: self.latest_seq,
            actor,
        }
    }

    /// Apply the result of the resolution identified by `seq`
    pub fn complete(
        &mut self,
        seq: u64,
        outcome: Result<RoleGrant, ResolveError>,
        now: Instant,
    ) -> Completion {
        if !self.is_current(seq) {
            warn!(seq, latest = self.latest_seq, "Discarding stale role resolution");
            return Completion::Stale;
        }
        self.pending = None;

        self.state = match outcome {
            Ok(grant) => {
                self.resolved_at = Some(now);
                GateState::Ready {
                    role: Some(grant.role),
                    enabled: grant.enabled,
                }
            }
            Err(ResolveError::NotFound) => {
                self.resolved_at = Some(now);
                GateState::Ready {
                    role: None,
                    enabled: false,
                }
            }
            Err(ResolveError::Unavailable(reason)) => {
                warn!(seq, reason = %reason, "Role resolution unavailable, session degraded");
                self.resolved_at = None;
                GateState::Degraded
            }
        };

        info!(seq, state = self.state.as_str(), "Session state updated");
        Completion::Applied
    }

    /// The resolution identified by `seq` exceeded its time budget
    pub fn time_out(&mut self, seq: u64) -> Completion {
        if !self.is_current(seq) {
            debug!(seq, "Ignoring timeout of superseded resolution");
            return Completion::Stale;
        }
        warn!(seq, "Role resolution timed out, session degraded");
        self.pending = None;
        self.resolved_at = None;
        self.state = GateState::Degraded;
        Completion::Applied
    }

    /// Explicit logout or detected session invalidation. Any in-flight
    /// resolution is discarded when it arrives.
    pub fn logout(&mut self) {
        if let Some(seq) = self.pending.take() {
            debug!(seq, "Cancelling in-flight role resolution");
        }
        if let Some(actor) = self.actor.take() {
            info!(actor = %actor, "Session logout");
        }
        self.resolved_at = None;
        self.state = GateState::Unauthenticated;
    }

    /// Whether the cached role should be re-derived before it is trusted again.
    ///
    /// True for a `Ready` role older than the configured maximum age, and for a
    /// `Degraded` session.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        match (&self.state, self.resolved_at) {
            (GateState::Ready { .. }, Some(at)) => now.saturating_duration_since(at) >= self.max_role_age,
            (GateState::Degraded, _) => true,
            _ => false,
        }
    }

    /// Synchronous route check against the cached state only.
    ///
    /// A degraded session keeps access to routes requiring only `user`.
    pub fn may_access(&self, threshold: Role) -> bool {
        match &self.state {
            GateState::Ready {
                role: Some(role),
                enabled: true,
            } => *role >= threshold,
            GateState::Degraded => threshold == Role::User,
            _ => false,
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        self.pending == Some(seq) && self.state == GateState::Resolving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str) -> ActorId {
        ActorId::new(id).unwrap()
    }

    fn grant(role: Role) -> Result<RoleGrant, ResolveError> {
        Ok(RoleGrant { role, enabled: true })
    }

    fn gate() -> SessionGate {
        SessionGate::new(Duration::from_secs(60))
    }

    #[test]
    fn test_starts_unauthenticated_and_denies() {
        let gate = gate();
        assert_eq!(gate.state(), &GateState::Unauthenticated);
        for role in Role::ALL {
            assert!(!gate.may_access(role));
        }
    }

    #[test]
    fn test_login_then_ready() {
        let mut gate = gate();
        let ticket = gate.login(actor("a"));
        assert_eq!(ticket.seq, 1);
        assert_eq!(gate.state(), &GateState::Resolving);
        assert!(!gate.may_access(Role::User));

        assert_eq!(gate.complete(ticket.seq, grant(Role::Manager), Instant::now()), Completion::Applied);
        assert!(gate.may_access(Role::User));
        assert!(gate.may_access(Role::Manager));
        assert!(!gate.may_access(Role::Admin));
    }

    #[test]
    fn test_disabled_profile_grants_nothing() {
        let mut gate = gate();
        let ticket = gate.login(actor("a"));
        let disabled = Ok(RoleGrant {
            role: Role::SuperAdmin,
            enabled: false,
        });
        gate.complete(ticket.seq, disabled, Instant::now());

        for role in Role::ALL {
            assert!(!gate.may_access(role));
        }
    }

    #[test]
    fn test_missing_profile_is_ready_without_role() {
        let mut gate = gate();
        let ticket = gate.login(actor("a"));
        gate.complete(ticket.seq, Err(ResolveError::NotFound), Instant::now());

        assert_eq!(
            gate.state(),
            &GateState::Ready {
                role: None,
                enabled: false
            }
        );
        assert!(!gate.may_access(Role::User));
    }

    #[test]
    fn test_unavailable_and_timeout_degrade() {
        let mut gate = gate();
        let ticket = gate.login(actor("a"));
        gate.complete(ticket.seq, Err(ResolveError::Unavailable("down".into())), Instant::now());
        assert_eq!(gate.state(), &GateState::Degraded);
        assert!(gate.may_access(Role::User));
        assert!(!gate.may_access(Role::Manager));

        let ticket = gate.recheck().unwrap();
        assert_eq!(gate.time_out(ticket.seq), Completion::Applied);
        assert_eq!(gate.state(), &GateState::Degraded);

        let ticket = gate.recheck().unwrap();
        gate.complete(ticket.seq, grant(Role::Admin), Instant::now());
        assert!(gate.may_access(Role::Admin));
    }

    #[test]
    fn test_newer_ticket_wins() {
        let mut gate = gate();
        let first = gate.login(actor("a"));
        let second = gate.token_refresh().unwrap();
        assert!(second.seq > first.seq);

        assert_eq!(gate.complete(second.seq, grant(Role::User), Instant::now()), Completion::Applied);
        assert_eq!(gate.complete(first.seq, grant(Role::Admin), Instant::now()), Completion::Stale);
        assert_eq!(gate.time_out(first.seq), Completion::Stale);

        assert!(!gate.may_access(Role::Admin));
    }

    #[test]
    fn test_logout_discards_in_flight_result() {
        let mut gate = gate();
        let ticket = gate.login(actor("a"));
        gate.logout();

        assert_eq!(gate.complete(ticket.seq, grant(Role::Admin), Instant::now()), Completion::Stale);
        assert_eq!(gate.state(), &GateState::Unauthenticated);
        assert!(gate.actor().is_none());
        assert!(gate.token_refresh().is_none());
    }

    #[test]
    fn test_relogin_switches_actor() {
        let mut gate = gate();
        let first = gate.login(actor("a"));
        gate.complete(first.seq, grant(Role::Admin), Instant::now());

        let second = gate.login(actor("b"));
        assert_eq!(second.actor, actor("b"));
        assert!(!gate.may_access(Role::User));

        gate.complete(second.seq, grant(Role::User), Instant::now());
        assert_eq!(gate.actor(), Some(&actor("b")));
        assert!(!gate.may_access(Role::Manager));
    }

    #[test]
    fn test_needs_refresh_after_max_age() {
        let mut gate = gate();
        let start = Instant::now();
        let ticket = gate.login(actor("a"));
        gate.complete(ticket.seq, grant(Role::User), start);

        assert!(!gate.needs_refresh(start + Duration::from_secs(59)));
        assert!(gate.needs_refresh(start + Duration::from_secs(60)));

        gate.logout();
        assert!(!gate.needs_refresh(start + Duration::from_secs(600)));
    }

    #[test]
    fn test_snapshot_tracks_sequence() {
        let mut gate = gate();
        gate.login(actor("a"));
        gate.recheck();

        let snapshot = gate.snapshot();
        assert_eq!(snapshot.seq, 2);
        assert_eq!(snapshot.state, GateState::Resolving);
        assert_eq!(snapshot.actor, Some(actor("a")));
    }
}
