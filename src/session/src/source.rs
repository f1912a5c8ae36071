//! Where the gate gets its roles from

use async_trait::async_trait;
use remitgate_authz::{ActorId, ResolveError, RoleGrant, RoleResolver};

/// Resolves the role of the session's actor
#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn resolve_role(&self, actor: &ActorId) -> Result<RoleGrant, ResolveError>;
}

/// In-process resolution through the server-side resolver
#[async_trait]
impl RoleSource for RoleResolver {
    async fn resolve_role(&self, actor: &ActorId) -> Result<RoleGrant, ResolveError> {
        self.resolve(actor).await
    }
}

#[cfg(feature = "http")]
pub use remote::HttpRoleSource;

#[cfg(feature = "http")]
mod remote {
    use super::*;
    use remitgate_authz::http::{SessionResponse, ACTOR_HEADER};
    use std::time::Duration;
    use tracing::{debug, warn};

    /// Resolution through the authorization server's `GET /v1/session`
    #[derive(Clone)]
    pub struct HttpRoleSource {
        client: reqwest::Client,
        session_url: String,
    }

    impl HttpRoleSource {
        /// `base_url` is the server root, e.g. `http://localhost:8080`.
        /// `request_timeout` bounds each HTTP call independently of the gate's
        /// own resolution timeout.
        pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ResolveError> {
            let client = reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .map_err(|e| ResolveError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

            Ok(Self {
                client,
                session_url: format!("{}/v1/session", base_url.trim_end_matches('/')),
            })
        }
    }

    #[async_trait]
    impl RoleSource for HttpRoleSource {
        async fn resolve_role(&self, actor: &ActorId) -> Result<RoleGrant, ResolveError> {
            let response = self
                .client
                .get(&self.session_url)
                .header(ACTOR_HEADER, actor.as_str())
                .send()
                .await
                .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                warn!(actor = %actor, status = %status, "Session endpoint rejected resolution");
                return Err(ResolveError::Unavailable(format!("session endpoint returned {}", status)));
            }

            let body: SessionResponse = response
                .json()
                .await
                .map_err(|e| ResolveError::Unavailable(format!("invalid session response: {}", e)))?;

            debug!(actor = %actor, status = %body.status, "Session endpoint answered");
            match (body.status.as_str(), body.role) {
                ("ready", Some(role)) => Ok(RoleGrant {
                    role,
                    enabled: body.enabled,
                }),
                ("no_profile", _) => Err(ResolveError::NotFound),
                (other, _) => Err(ResolveError::Unavailable(format!(
                    "unexpected session status {}",
                    other
                ))),
            }
        }
    }
}
