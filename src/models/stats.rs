use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
struct StatsRecord {
    total: u64,
    successes: u64,
    latency_sum: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatistics {
    pub provider: String,
    pub total_attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub average_latency_ms: Option<u64>,
}

/// Additive per-provider attempt counters.
#[derive(Debug, Default)]
pub struct StatisticsAggregator {
    records: DashMap<String, StatsRecord>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, provider: &str, success: bool, latency: Duration) {
        let mut record = self.records.entry(provider.to_string()).or_default();
        record.total += 1;
        if success {
            record.successes += 1;
        }
        record.latency_sum += latency;
    }

    /// Percentage of successful attempts; 100 when nothing has been recorded yet.
    pub fn success_rate(&self, provider: &str) -> f64 {
        self.records
            .get(provider)
            .map(|record| rate(&record))
            .unwrap_or(100.0)
    }

    pub fn total_attempts(&self, provider: &str) -> u64 {
        self.records.get(provider).map(|r| r.total).unwrap_or(0)
    }

    pub fn average_latency(&self, provider: &str) -> Option<Duration> {
        self.records.get(provider).and_then(|record| average(&record))
    }

    /// Read-only view, busiest providers first.
    pub fn snapshot(&self) -> Vec<ProviderStatistics> {
        let mut stats: Vec<ProviderStatistics> = self
            .records
            .iter()
            .map(|item| {
                let record = item.value();
                ProviderStatistics {
                    provider: item.key().clone(),
                    total_attempts: record.total,
                    successes: record.successes,
                    success_rate: rate(record),
                    average_latency_ms: average(record).map(|d| d.as_millis() as u64),
                }
            })
            .collect();

        stats.sort_by(|a, b| {
            b.total_attempts
                .cmp(&a.total_attempts)
                .then_with(|| a.provider.cmp(&b.provider))
        });
        stats
    }
}

fn rate(record: &StatsRecord) -> f64 {
    if record.total == 0 {
        100.0
    } else {
        record.successes as f64 / record.total as f64 * 100.0
    }
}

fn average(record: &StatsRecord) -> Option<Duration> {
    if record.total == 0 {
        return None;
    }
    u32::try_from(record.total)
        .ok()
        .map(|total| record.latency_sum / total)
}
