use std::collections::BTreeMap;
use std::time::Duration;

use log::info;
use serde::Serialize;

/// Statistics for one query label (`vote_totals`, `voting_power`, …).
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    pub total_queries: u64,
    /// Queries that needed more than the first strategy.
    pub fallbacks: u64,
    /// Queries where every strategy failed or the deadline hit.
    pub degraded: u64,
    /// Wins per strategy name.
    pub wins: BTreeMap<String, u64>,
    pub avg_latency: Duration,
}

impl QueryStats {
    fn record_latency(&mut self, elapsed: Duration) {
        self.total_queries += 1;
        let total_nanos = self
            .avg_latency
            .as_nanos()
            .saturating_mul((self.total_queries - 1) as u128)
            .saturating_add(elapsed.as_nanos());
        self.avg_latency = Duration::from_nanos((total_nanos / self.total_queries as u128) as u64);
    }
}

/// Per-session record of how queries were answered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryMetrics {
    pub queries: BTreeMap<&'static str, QueryStats>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_resolved(&mut self, label: &'static str, strategy: &str, failed_before: usize, elapsed: Duration) {
        let stats = self.queries.entry(label).or_default();
        stats.record_latency(elapsed);
        if failed_before > 0 {
            stats.fallbacks += 1;
        }
        *stats.wins.entry(strategy.to_string()).or_insert(0) += 1;
    }

    pub fn record_degraded(&mut self, label: &'static str, elapsed: Duration) {
        let stats = self.queries.entry(label).or_default();
        stats.record_latency(elapsed);
        stats.degraded += 1;
    }

    pub fn get(&self, label: &str) -> Option<&QueryStats> {
        self.queries.get(label)
    }

    pub fn print_stats(&self) {
        info!("=== Query metrics ===");
        for (label, stats) in &self.queries {
            info!(
                "{}: {} queries, {} fallbacks, {} degraded, avg {:?}",
                label, stats.total_queries, stats.fallbacks, stats.degraded, stats.avg_latency
            );
            for (strategy, wins) in &stats.wins {
                info!("  {} answered {} time(s)", strategy, wins);
            }
        }
    }
}
