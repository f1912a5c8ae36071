//! # Remitgate Authorization Server
//!
//! Serves authorization decisions, session role resolution and guarded profile
//! administration over HTTP. See [`remitgate_authz::http`] for the endpoints.
//!
//! ## Configuration
//!
//! A TOML file (`--config` / `REMITGATE_CONFIG`), then environment overrides:
//! - `PORT` - HTTP server port (default: 8080)
//! - `DATABASE_URL` - switches the profile store to PostgreSQL
//! - `REMITGATE_RULES` - rule table file (default: built-in table)
//! - `RUST_LOG` - Log level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use remitgate_authz::{
    config::{AuditBackendKind, AuthzConfig, StoreBackend},
    engine::{AuditLogger, AuditSink, MetricsCollector, PolicyEvaluator, TracingAuditBackend},
    http::{create_router, AppState},
    store::{InMemoryProfileStore, ProfileStore, UncheckedProfileReader},
    ProfileDirectory, RoleResolver, RuleSet,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Remitgate authorization server
#[derive(Parser)]
#[command(name = "remitgate-server")]
#[command(about = "Role and ownership based authorization for the remittance application")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "REMITGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

struct Stores {
    profiles: Arc<dyn ProfileStore>,
    reader: Arc<dyn UncheckedProfileReader>,
    #[cfg(feature = "postgres")]
    pool: Option<sqlx::PgPool>,
}

async fn open_stores(config: &AuthzConfig) -> Result<Stores> {
    match config.store.backend {
        StoreBackend::Memory => {
            let seeds = config
                .store
                .seed
                .iter()
                .map(|seed| seed.to_profile())
                .collect::<remitgate_authz::Result<Vec<_>>>()?;
            info!("Using in-memory profile store with {} seeded profiles", seeds.len());

            let store = Arc::new(InMemoryProfileStore::with_profiles(seeds));
            Ok(Stores {
                profiles: store.clone(),
                reader: store,
                #[cfg(feature = "postgres")]
                pool: None,
            })
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required for the postgres backend")?;
            let store = Arc::new(
                remitgate_authz::store::PostgresProfileStore::connect(url, config.store.max_connections)
                    .await?,
            );
            info!("Using PostgreSQL profile store");

            let pool = store.pool().clone();
            Ok(Stores {
                profiles: store.clone(),
                reader: store,
                pool: Some(pool),
            })
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("this build does not include the postgres feature")
        }
    }
}

/// How long shutdown waits for queued audit entries to be written
const AUDIT_DRAIN_GRACE: Duration = Duration::from_secs(5);

type AuditPipeline = (Arc<dyn AuditSink>, JoinHandle<()>);

fn open_audit(config: &AuthzConfig, stores: &Stores) -> Result<Option<AuditPipeline>> {
    if !config.audit.enabled {
        warn!("Audit logging disabled");
        return Ok(None);
    }

    let backend: Arc<dyn remitgate_authz::engine::AuditBackend> = match config.audit.backend {
        AuditBackendKind::Tracing => Arc::new(TracingAuditBackend),
        #[cfg(feature = "postgres")]
        AuditBackendKind::Postgres => {
            let pool = stores
                .pool
                .clone()
                .context("postgres audit backend requires the postgres store")?;
            Arc::new(remitgate_authz::engine::PostgresAuditBackend::new(pool))
        }
        #[cfg(not(feature = "postgres"))]
        AuditBackendKind::Postgres => {
            let _ = stores;
            anyhow::bail!("this build does not include the postgres feature")
        }
    };

    let (logger, writer) = AuditLogger::spawn(backend, config.audit.queue_capacity);
    Ok(Some((Arc::new(logger), writer)))
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Remitgate Authorization Server v{}", remitgate_authz::VERSION);

    let mut config = match &cli.config {
        Some(path) => AuthzConfig::load(path)?,
        None => AuthzConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    let rules = match &config.rules.path {
        Some(path) => RuleSet::load(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?,
        None => RuleSet::remittance_defaults(),
    };
    info!("Loaded {} policy rules", rules.len());

    let stores = open_stores(&config).await?;
    let metrics = Arc::new(MetricsCollector::new());

    let resolver = RoleResolver::new(stores.reader.clone())
        .with_lookup_timeout(config.resolver.lookup_timeout())
        .with_metrics(metrics.clone());

    let mut evaluator = PolicyEvaluator::new(resolver, Arc::new(rules)).with_metrics(metrics.clone());
    let mut audit_writer = None;
    if let Some((audit, writer)) = open_audit(&config, &stores)? {
        evaluator = evaluator.with_audit(audit);
        audit_writer = Some(writer);
    }

    let directory = ProfileDirectory::new(evaluator.clone(), stores.profiles.clone());

    let state = AppState {
        evaluator,
        directory,
        metrics,
        start_time: Instant::now(),
    };

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", addr))?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // The router owned the last evaluator, so the audit queue is closed now.
    if let Some(writer) = audit_writer {
        AuditLogger::drain(writer, AUDIT_DRAIN_GRACE).await;
    }

    info!("Server shut down gracefully");
    Ok(())
}
