//! Audit logging for authorization decisions
//!
//! Decisions are handed to an [`AuditSink`] without waiting. [`AuditLogger`]
//! queues entries on a bounded channel and a background task writes them to an
//! [`AuditBackend`]. A full queue drops the entry and counts it; it never delays
//! or fails the decision.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::decision::{AuthzDecision, AuthzRequest};
use crate::error::Result;

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Decision ID
    pub decision_id: String,

    pub actor_id: String,

    pub table: String,

    pub operation: String,

    pub allowed: bool,

    /// Deny reason, if denied
    pub reason: Option<String>,

    pub role: Option<String>,

    pub rule_id: Option<String>,

    /// Request latency in microseconds
    pub latency_us: u64,

    /// Timestamp (milliseconds since epoch)
    pub timestamp: u64,
}

impl AuditEntry {
    pub fn from_decision(request: &AuthzRequest, decision: &AuthzDecision, latency: Duration) -> Self {
        Self {
            decision_id: decision.id.clone(),
            actor_id: request.actor.to_string(),
            table: request.table.clone(),
            operation: request.operation.to_string(),
            allowed: decision.allowed(),
            reason: decision.decision.deny_reason().map(|r| r.to_string()),
            role: decision.role.map(|r| r.to_string()),
            rule_id: decision.rule_id.clone(),
            latency_us: u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            timestamp: decision.timestamp,
        }
    }
}

/// Non-blocking receiver of audit entries
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Durable destination for audit entries
#[async_trait]
pub trait AuditBackend: Send + Sync {
    async fn write(&self, entry: AuditEntry) -> Result<()>;
}

/// Queue-backed audit logger
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEntry>,
    dropped: AtomicU64,
}

impl AuditLogger {
    /// Start the background writer for `backend`
    pub fn spawn(backend: Arc<dyn AuditBackend>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let decision_id = entry.decision_id.clone();
                if let Err(e) = backend.write(entry).await {
                    warn!(decision_id = %decision_id, "Failed to write audit entry: {}", e);
                }
            }
        });

        let logger = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        (logger, handle)
    }

    /// Wait up to `grace` for the writer to flush what is still queued.
    ///
    /// The writer only finishes once every logger handle is dropped. Returns
    /// `false` if it was still running when the grace period ran out.
    pub async fn drain(writer: JoinHandle<()>, grace: Duration) -> bool {
        match tokio::time::timeout(grace, writer).await {
            Ok(Ok(())) => {
                info!("Audit writer drained");
                true
            }
            Ok(Err(e)) => {
                warn!("Audit writer failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Audit writer did not drain within {:?}", grace);
                false
            }
        }
    }

    /// Entries discarded because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.tx.try_send(entry) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!("Audit entry dropped: {}", reason);
        }
    }
}

/// Writes audit entries as structured log events
#[derive(Debug, Default)]
pub struct TracingAuditBackend;

#[async_trait]
impl AuditBackend for TracingAuditBackend {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        info!(
            target: "remitgate::audit",
            decision_id = %entry.decision_id,
            actor = %entry.actor_id,
            table = %entry.table,
            operation = %entry.operation,
            allowed = entry.allowed,
            reason = entry.reason.as_deref().unwrap_or("-"),
            rule = entry.rule_id.as_deref().unwrap_or("-"),
            latency_us = entry.latency_us,
            "authorization decision"
        );
        Ok(())
    }
}

/// Bounded in-memory audit buffer
#[derive(Debug)]
pub struct MemoryAuditBackend {
    entries: Mutex<Vec<AuditEntry>>,
    max_entries: usize,
}

impl MemoryAuditBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Most recent entries for one actor, newest first
    pub fn query_by_actor(&self, actor_id: &str, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| e.actor_id == actor_id)
            .take(limit)
            .cloned()
            .collect()
    }

    fn push(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(0..excess);
        }
    }
}

impl Default for MemoryAuditBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditBackend for MemoryAuditBackend {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        self.push(entry);
        Ok(())
    }
}

impl AuditSink for MemoryAuditBackend {
    fn record(&self, entry: AuditEntry) {
        self.push(entry);
    }
}

/// PostgreSQL audit backend
///
/// # Schema
///
/// ```sql
/// CREATE TABLE authz_audit_log (
///     decision_id UUID PRIMARY KEY,
///     actor_id TEXT NOT NULL,
///     table_name TEXT NOT NULL,
///     operation TEXT NOT NULL,
///     allowed BOOLEAN NOT NULL,
///     reason TEXT,
///     role TEXT,
///     rule_id TEXT,
///     latency_us BIGINT,
///     timestamp BIGINT NOT NULL
/// );
/// ```
#[cfg(feature = "postgres")]
pub struct PostgresAuditBackend {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresAuditBackend {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl AuditBackend for PostgresAuditBackend {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        let decision_id = uuid::Uuid::parse_str(&entry.decision_id)
            .map_err(|e| crate::error::AuthzError::InvalidInput(format!("bad decision id: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO authz_audit_log (
                decision_id, actor_id, table_name, operation, allowed,
                reason, role, rule_id, latency_us, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(decision_id)
        .bind(&entry.actor_id)
        .bind(&entry.table)
        .bind(&entry.operation)
        .bind(entry.allowed)
        .bind(&entry.reason)
        .bind(&entry.role)
        .bind(&entry.rule_id)
        .bind(i64::try_from(entry.latency_us).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.timestamp).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(|e| crate::error::AuthzError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decision::{Decision, DenyReason};
    use crate::error::AuthzError;
    use crate::types::{ActorId, Operation, Role};

    fn sample_entry(actor: &str) -> AuditEntry {
        let request = AuthzRequest::new(ActorId::new(actor).unwrap(), Operation::Read, "remittances");
        let decision = AuthzDecision::new(
            Decision::Deny(DenyReason::NotOwner),
            Some(Role::User),
            Some("remittances.read".to_string()),
        );
        AuditEntry::from_decision(&request, &decision, Duration::from_micros(42))
    }

    struct StuckBackend;

    #[async_trait]
    impl AuditBackend for StuckBackend {
        async fn write(&self, _entry: AuditEntry) -> Result<()> {
            std::future::pending().await
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl AuditBackend for BrokenBackend {
        async fn write(&self, _entry: AuditEntry) -> Result<()> {
            Err(AuthzError::DatabaseError("disk full".to_string()))
        }
    }

    #[test]
    fn test_entry_from_decision() {
        let entry = sample_entry("alice");
        assert_eq!(entry.actor_id, "alice");
        assert_eq!(entry.operation, "read");
        assert!(!entry.allowed);
        assert_eq!(entry.reason.as_deref(), Some("not_owner"));
        assert_eq!(entry.role.as_deref(), Some("user"));
        assert_eq!(entry.latency_us, 42);
    }

    #[tokio::test]
    async fn test_logger_delivers_to_backend() {
        let backend = Arc::new(MemoryAuditBackend::new(100));
        let (logger, handle) = AuditLogger::spawn(backend.clone(), 16);

        logger.record(sample_entry("alice"));
        logger.record(sample_entry("bob"));
        drop(logger);
        handle.await.unwrap();

        assert_eq!(backend.entries().len(), 2);
        assert_eq!(backend.query_by_actor("bob", 10).len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (logger, _handle) = AuditLogger::spawn(Arc::new(StuckBackend), 1);

        for _ in 0..5 {
            logger.record(sample_entry("alice"));
        }

        // One entry is held by the stuck writer, one sits in the queue.
        assert!(logger.dropped() >= 3);
    }

    #[tokio::test]
    async fn test_backend_errors_do_not_stop_writer() {
        let (logger, handle) = AuditLogger::spawn(Arc::new(BrokenBackend), 4);
        logger.record(sample_entry("alice"));
        logger.record(sample_entry("alice"));
        drop(logger);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_flushes_queue_after_last_handle_drops() {
        let backend = Arc::new(MemoryAuditBackend::new(100));
        let (logger, writer) = AuditLogger::spawn(backend.clone(), 16);
        let sink: Arc<dyn AuditSink> = Arc::new(logger);

        for i in 0..10 {
            sink.record(sample_entry(&format!("actor-{}", i)));
        }
        drop(sink);

        assert!(AuditLogger::drain(writer, Duration::from_secs(5)).await);
        assert_eq!(backend.entries().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_on_stuck_writer() {
        let (logger, writer) = AuditLogger::spawn(Arc::new(StuckBackend), 4);
        logger.record(sample_entry("alice"));
        drop(logger);

        assert!(!AuditLogger::drain(writer, Duration::from_secs(5)).await);
    }

    #[test]
    fn test_memory_backend_is_bounded() {
        let backend = MemoryAuditBackend::new(3);
        for i in 0..5 {
            backend.record(sample_entry(&format!("actor-{}", i)));
        }

        let entries = backend.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].actor_id, "actor-2");
    }
}
