//! Generation counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters shared by the pipeline and the engine
#[derive(Debug, Default)]
pub struct GenerationMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    rule_based: AtomicU64,
    generative: AtomicU64,
    failures: AtomicU64,
    backend_calls: AtomicU64,
    estimated_tokens: AtomicU64,
}

impl GenerationMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rule_based(&self) {
        self.rule_based.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generative(&self) {
        self.generative.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one backend call and its estimated prompt size
    ///
    /// Token estimate is words x 1.3 of the user request.
    pub(crate) fn record_backend_call(&self, request_words: usize) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
        let tokens = (request_words as u64 * 13).div_ceil(10);
        self.estimated_tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Point-in-time copy
    #[must_use]
    pub fn snapshot(&self, cost_per_1k_tokens: f64) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let rule_based = self.rule_based.load(Ordering::Relaxed);
        let estimated_tokens = self.estimated_tokens.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let ratio = |n: u64| {
            if requests == 0 {
                0.0
            } else {
                n as f64 / requests as f64
            }
        };
        #[allow(clippy::cast_precision_loss)]
        let estimated_cost = estimated_tokens as f64 / 1000.0 * cost_per_1k_tokens;

        MetricsSnapshot {
            requests,
            cache_hits,
            rule_based,
            generative: self.generative.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            estimated_tokens,
            estimated_cost,
            cache_hit_rate: ratio(cache_hits),
            rule_based_rate: ratio(rule_based),
        }
    }
}

/// Serializable metrics view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub rule_based: u64,
    pub generative: u64,
    pub failures: u64,
    pub backend_calls: u64,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    pub cache_hit_rate: f64,
    pub rule_based_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_and_cost() {
        let m = GenerationMetrics::new();
        for _ in 0..4 {
            m.record_request();
        }
        m.record_cache_hit();
        m.record_rule_based();
        m.record_rule_based();
        m.record_backend_call(10);

        let s = m.snapshot(0.0001);
        assert_eq!(s.requests, 4);
        assert!((s.cache_hit_rate - 0.25).abs() < 1e-9);
        assert!((s.rule_based_rate - 0.5).abs() < 1e-9);
        assert_eq!(s.estimated_tokens, 13);
        assert!((s.estimated_cost - 0.0000013).abs() < 1e-12);
    }

    #[test]
    fn empty_snapshot_has_zero_rates() {
        let s = GenerationMetrics::new().snapshot(0.0001);
        assert_eq!(s.cache_hit_rate, 0.0);
        assert_eq!(s.backend_calls, 0);
    }
}
