//! Async driver for the session gate
//!
//! Owns a [`SessionGate`], runs each resolution through a [`RoleSource`] under
//! the configured timeout, and publishes every state change on a watch channel.
//! The gate lock is never held across an await. Resolutions run on their own
//! task, so a caller dropping its future never leaves the gate resolving.

use parking_lot::Mutex;
use remitgate_authz::{ActorId, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::gate::{Completion, GateState, ResolutionTicket, SessionGate, SessionSnapshot};
use crate::source::RoleSource;

/// Receiver side of the gate's status channel
pub type SessionWatcher = watch::Receiver<SessionSnapshot>;

/// Shared handle to one client session
#[derive(Clone)]
pub struct SessionController {
    gate: Arc<Mutex<SessionGate>>,
    source: Arc<dyn RoleSource>,
    resolve_timeout: Duration,
    status: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionController {
    pub fn new(source: Arc<dyn RoleSource>, config: &GateConfig) -> Result<Self> {
        config.validate()?;

        let gate = SessionGate::new(config.max_role_age());
        let (status, _) = watch::channel(gate.snapshot());

        Ok(Self {
            gate: Arc::new(Mutex::new(gate)),
            source,
            resolve_timeout: config.resolve_timeout(),
            status: Arc::new(status),
        })
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> SessionWatcher {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.gate.lock().snapshot()
    }

    pub fn state(&self) -> GateState {
        self.gate.lock().state().clone()
    }

    /// Synchronous route check. Never waits on a resolution.
    pub fn may_access(&self, threshold: Role) -> bool {
        self.gate.lock().may_access(threshold)
    }

    pub fn needs_refresh(&self) -> bool {
        self.gate.lock().needs_refresh(Instant::now())
    }

    /// Login success: start a session for `actor` and resolve its role
    pub async fn login(&self, actor: ActorId) -> GateState {
        let ticket = self.transition(|gate| gate.login(actor));
        self.resolve(ticket).await
    }

    /// Start a login whose resolution runs on its own task
    pub fn login_in_background(&self, actor: ActorId) -> JoinHandle<GateState> {
        let ticket = self.transition(|gate| gate.login(actor));
        self.spawn_drive(ticket)
    }

    /// Token refresh notification from the authentication provider
    pub async fn token_refresh(&self) -> Result<GateState> {
        let ticket = self
            .transition(|gate| gate.token_refresh())
            .ok_or(GateError::NotAuthenticated)?;
        Ok(self.resolve(ticket).await)
    }

    /// Re-resolve on demand, e.g. before a sensitive navigation
    pub async fn recheck(&self) -> Result<GateState> {
        let ticket = self
            .transition(|gate| gate.recheck())
            .ok_or(GateError::NotAuthenticated)?;
        Ok(self.resolve(ticket).await)
    }

    /// Re-resolve only when the cached role is too old or the session is degraded
    pub async fn ensure_fresh(&self) -> Result<GateState> {
        if self.needs_refresh() {
            self.recheck().await
        } else {
            Ok(self.state())
        }
    }

    /// Logout or session invalidation. Takes effect immediately; a resolution
    /// still in flight is discarded when it completes.
    pub fn logout(&self) {
        self.transition(|gate| gate.logout());
    }

    fn transition<T>(&self, event: impl FnOnce(&mut SessionGate) -> T) -> T {
        let mut gate = self.gate.lock();
        let out = event(&mut gate);
        self.status.send_replace(gate.snapshot());
        out
    }

    fn spawn_drive(&self, ticket: ResolutionTicket) -> JoinHandle<GateState> {
        let controller = self.clone();
        tokio::spawn(async move { controller.drive(ticket).await })
    }

    async fn resolve(&self, ticket: ResolutionTicket) -> GateState {
        let seq = ticket.seq;
        match self.spawn_drive(ticket).await {
            Ok(state) => state,
            Err(e) => {
                error!(seq, error = %e, "Role resolution task failed");
                self.transition(|gate| {
                    gate.time_out(seq);
                    gate.state().clone()
                })
            }
        }
    }

    async fn drive(&self, ticket: ResolutionTicket) -> GateState {
        let outcome = tokio::time::timeout(self.resolve_timeout, self.source.resolve_role(&ticket.actor)).await;

        let mut gate = self.gate.lock();
        let completion = match outcome {
            Ok(result) => gate.complete(ticket.seq, result, Instant::now()),
            Err(_) => gate.time_out(ticket.seq),
        };
        if completion == Completion::Applied {
            self.status.send_replace(gate.snapshot());
        }
        gate.state().clone()
    }
}
