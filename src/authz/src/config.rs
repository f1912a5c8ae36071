//! Server configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{ActorId, Profile, Role};

/// Complete server configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthzConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub resolver: ResolverSection,

    #[serde(default)]
    pub audit: AuditSection,

    #[serde(default)]
    pub rules: RulesSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Profiles loaded into the memory backend at startup
    #[serde(default)]
    pub seed: Vec<SeedProfile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedProfile {
    pub actor_id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_seed_role")]
    pub role: Role,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SeedProfile {
    pub fn to_profile(&self) -> crate::error::Result<Profile> {
        let actor = ActorId::new(self.actor_id.clone())?;
        Ok(Profile::provisioned(actor, self.email.clone(), self.display_name.clone())
            .with_role(self.role)
            .with_enabled(self.enabled))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverSection {
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackendKind {
    Tracing,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_backend")]
    pub backend: AuditBackendKind,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesSection {
    /// TOML or JSON rule table; built-in defaults when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool { true }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_store_backend() -> StoreBackend { StoreBackend::Memory }
fn default_max_connections() -> u32 { 10 }
fn default_seed_role() -> Role { Role::User }
fn default_lookup_timeout() -> u64 { 2000 }
fn default_audit_backend() -> AuditBackendKind { AuditBackendKind::Tracing }
fn default_queue_capacity() -> usize { 1024 }

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database_url: None,
            max_connections: default_max_connections(),
            seed: Vec::new(),
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_audit_backend(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ServerSection {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ResolverSection {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl AuthzConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {}", path.as_ref().display()))?;

        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration file")
    }

    /// Apply `PORT`, `DATABASE_URL` and `REMITGATE_RULES` overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", port))?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = Some(url);
            self.store.backend = StoreBackend::Postgres;
        }
        if let Some(path) = lookup("REMITGATE_RULES") {
            self.rules.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.resolver.lookup_timeout_ms == 0 || self.resolver.lookup_timeout_ms > 10_000 {
            anyhow::bail!("resolver.lookup_timeout_ms must be between 1 and 10000");
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            anyhow::bail!("store.database_url is required for the postgres backend");
        }

        if self.store.backend == StoreBackend::Postgres && !self.store.seed.is_empty() {
            anyhow::bail!("store.seed is only supported by the memory backend");
        }

        if self.audit.backend == AuditBackendKind::Postgres && self.store.backend != StoreBackend::Postgres {
            anyhow::bail!("audit.backend = \"postgres\" requires the postgres store");
        }

        if self.audit.queue_capacity == 0 {
            anyhow::bail!("audit.queue_capacity must be positive");
        }

        for seed in &self.store.seed {
            seed.to_profile()
                .with_context(|| format!("invalid seed profile {:?}", seed.actor_id))?;
        }

        Ok(())
    }
}
