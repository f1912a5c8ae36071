//! Prometheus-style counters for decisions and profile lookups

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::decision::{Decision, DenyReason};
use crate::error::ResolveError;
use crate::types::RoleGrant;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of authorization decisions
    pub total_decisions: u64,

    pub allowed_decisions: u64,

    pub denied_decisions: u64,

    /// Denials broken down by reason, in `DenyReason::ALL` order
    pub denied_by_reason: Vec<(DenyReason, u64)>,

    pub resolutions_found: u64,

    pub resolutions_not_found: u64,

    pub resolutions_unavailable: u64,

    /// Average profile lookup latency, over every outcome
    pub avg_resolution_latency_ms: f64,

    /// Average decision latency
    pub avg_decision_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / self.total_decisions as f64
        }
    }

    pub fn denied_for(&self, reason: DenyReason) -> u64 {
        self.denied_by_reason
            .iter()
            .find(|(r, _)| *r == reason)
            .map_or(0, |(_, count)| *count)
    }
}

/// Lock-free metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    allowed: AtomicU64,
    denied: [AtomicU64; DenyReason::ALL.len()],
    resolutions_found: AtomicU64,
    resolutions_not_found: AtomicU64,
    resolutions_unavailable: AtomicU64,
    latency_micros_total: AtomicU64,
    resolution_latency_micros_total: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn reason_index(reason: DenyReason) -> usize {
        DenyReason::ALL
            .iter()
            .position(|r| *r == reason)
            .unwrap_or_default()
    }

    /// Record an authorization decision and its latency
    pub fn record_decision(&self, decision: &Decision, latency: Duration) {
        match decision {
            Decision::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            Decision::Deny(reason) => {
                self.denied[Self::reason_index(*reason)].fetch_add(1, Ordering::Relaxed)
            }
        };

        self.latency_micros_total.fetch_add(Self::micros(latency), Ordering::Relaxed);
    }

    fn micros(latency: Duration) -> u64 {
        u64::try_from(latency.as_micros()).unwrap_or(u64::MAX)
    }

    /// Record a profile lookup outcome
    pub fn record_resolution(&self, outcome: &Result<RoleGrant, ResolveError>, latency: Duration) {
        let counter = match outcome {
            Ok(_) => &self.resolutions_found,
            Err(ResolveError::NotFound) => &self.resolutions_not_found,
            Err(ResolveError::Unavailable(_)) => &self.resolutions_unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.resolution_latency_micros_total
            .fetch_add(Self::micros(latency), Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> EngineMetrics {
        let allowed = self.allowed.load(Ordering::Relaxed);
        let denied_by_reason: Vec<(DenyReason, u64)> = DenyReason::ALL
            .iter()
            .zip(self.denied.iter())
            .map(|(reason, count)| (*reason, count.load(Ordering::Relaxed)))
            .collect();
        let denied: u64 = denied_by_reason.iter().map(|(_, count)| count).sum();
        let total = allowed + denied;

        let avg_decision_latency_ms = if total == 0 {
            0.0
        } else {
            self.latency_micros_total.load(Ordering::Relaxed) as f64 / total as f64 / 1000.0
        };

        let resolutions_found = self.resolutions_found.load(Ordering::Relaxed);
        let resolutions_not_found = self.resolutions_not_found.load(Ordering::Relaxed);
        let resolutions_unavailable = self.resolutions_unavailable.load(Ordering::Relaxed);
        let resolutions = resolutions_found + resolutions_not_found + resolutions_unavailable;
        let avg_resolution_latency_ms = if resolutions == 0 {
            0.0
        } else {
            self.resolution_latency_micros_total.load(Ordering::Relaxed) as f64 / resolutions as f64 / 1000.0
        };

        EngineMetrics {
            total_decisions: total,
            allowed_decisions: allowed,
            denied_decisions: denied,
            denied_by_reason,
            resolutions_found,
            resolutions_not_found,
            resolutions_unavailable,
            avg_resolution_latency_ms,
            avg_decision_latency_ms,
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP authz_decisions_total Authorization decisions by effect");
        let _ = writeln!(out, "# TYPE authz_decisions_total counter");
        let _ = writeln!(out, "authz_decisions_total{{effect=\"allow\"}} {}", metrics.allowed_decisions);
        let _ = writeln!(out, "authz_decisions_total{{effect=\"deny\"}} {}", metrics.denied_decisions);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_denials_total Denials by reason");
        let _ = writeln!(out, "# TYPE authz_denials_total counter");
        for (reason, count) in &metrics.denied_by_reason {
            let _ = writeln!(out, "authz_denials_total{{reason=\"{}\"}} {}", reason, count);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_profile_lookups_total Profile lookups by outcome");
        let _ = writeln!(out, "# TYPE authz_profile_lookups_total counter");
        let _ = writeln!(out, "authz_profile_lookups_total{{outcome=\"found\"}} {}", metrics.resolutions_found);
        let _ = writeln!(out, "authz_profile_lookups_total{{outcome=\"not_found\"}} {}", metrics.resolutions_not_found);
        let _ = writeln!(out, "authz_profile_lookups_total{{outcome=\"unavailable\"}} {}", metrics.resolutions_unavailable);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_profile_lookup_latency_avg_seconds Average profile lookup latency");
        let _ = writeln!(out, "# TYPE authz_profile_lookup_latency_avg_seconds gauge");
        let _ = writeln!(
            out,
            "authz_profile_lookup_latency_avg_seconds {}",
            metrics.avg_resolution_latency_ms / 1000.0
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_decision_latency_avg_seconds Average decision latency");
        let _ = writeln!(out, "# TYPE authz_decision_latency_avg_seconds gauge");
        let _ = writeln!(out, "authz_decision_latency_avg_seconds {}", metrics.avg_decision_latency_ms / 1000.0);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_counts_decisions_by_reason() {
        let metrics = MetricsCollector::new();
        metrics.record_decision(&Decision::Allow, Duration::from_micros(200));
        metrics.record_decision(&Decision::Deny(DenyReason::Disabled), Duration::from_micros(100));
        metrics.record_decision(&Decision::Deny(DenyReason::Disabled), Duration::from_micros(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_decisions, 3);
        assert_eq!(snapshot.allowed_decisions, 1);
        assert_eq!(snapshot.denied_for(DenyReason::Disabled), 2);
        assert_eq!(snapshot.denied_for(DenyReason::NotOwner), 0);
        assert!((snapshot.avg_decision_latency_ms - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_counts_resolutions() {
        let metrics = MetricsCollector::new();
        let grant = RoleGrant { role: Role::User, enabled: true };
        metrics.record_resolution(&Ok(grant), Duration::from_micros(500));
        metrics.record_resolution(&Err(ResolveError::NotFound), Duration::from_micros(1_500));
        metrics.record_resolution(&Err(ResolveError::Unavailable("down".into())), Duration::from_micros(4_000));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.resolutions_found, 1);
        assert_eq!(snapshot.resolutions_not_found, 1);
        assert_eq!(snapshot.resolutions_unavailable, 1);
        assert!((snapshot.avg_resolution_latency_ms - 2.0).abs() < 1e-9);

        let text = metrics.export_prometheus();
        assert!(text.contains("authz_profile_lookup_latency_avg_seconds 0.002\n"));
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsCollector::new();
        metrics.record_decision(&Decision::Deny(DenyReason::NoMatchingRule), Duration::ZERO);

        let text = metrics.export_prometheus();
        assert!(text.contains("authz_decisions_total{effect=\"deny\"} 1"));
        assert!(text.contains("authz_denials_total{reason=\"no_matching_rule\"} 1"));
    }
}
