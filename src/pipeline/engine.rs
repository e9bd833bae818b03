//! Compliance Engine - per-shard orchestration of the compliance core
//!
//! One engine owns every piece of per-key state for the keys routed to its shard:
//!
//! ```text
//! DetectionEvent
//!     ↓
//! ComplianceEngine::process_event()  → PPE / people-count windows → join buffers
//!     ↓
//! ComplianceEngine::advance(now)     → closed join windows → dedup → rules
//!     ↓
//! EngineOutput { joined, alerts }
//! ```
//!
//! Time is always passed in, so tests drive the engine with deterministic clocks.

use super::config::PipelineConfig;
use crate::compliance_core::{
    Alert, AlertRuleEvaluator, CameraRole, CountWindowAggregator, DetectionEvent,
    DuplicateSuppressor, JoinedRecord, PeopleMatchPredicate, PpePredicate, SlidingWindowJoin,
};
use chrono::{TimeZone, Utc};

/// Running counters for one shard
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EngineStats {
    pub events: u64,
    pub ppe_emitted: u64,
    pub people_emitted: u64,
    pub joined_pairs: u64,
    pub suppressed: u64,
    pub admitted: u64,
    pub alerts: u64,
    pub evicted_keys: u64,
    pub expired_ids: u64,
}

/// Deduplicated joined records and the alerts raised from them
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub joined: Vec<JoinedRecord>,
    pub alerts: Vec<Alert>,
}

pub struct ComplianceEngine {
    ppe: CountWindowAggregator<PpePredicate>,
    people: CountWindowAggregator<PeopleMatchPredicate>,
    join: SlidingWindowJoin,
    dedup: DuplicateSuppressor,
    rules: AlertRuleEvaluator,
    key_idle_ttl_ms: i64,
    stats: EngineStats,
}

impl ComplianceEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            ppe: CountWindowAggregator::new(
                config.window_size,
                PpePredicate {
                    min_confidence: config.min_confidence,
                },
            ),
            people: CountWindowAggregator::new(config.window_size, PeopleMatchPredicate),
            join: SlidingWindowJoin::new(config.join_window_ms, config.join_slide_ms),
            dedup: DuplicateSuppressor::new(config.dedup_horizon_ms),
            rules: AlertRuleEvaluator::new(config.compliance_threshold),
            key_idle_ttl_ms: config.key_idle_ttl_ms(),
            stats: EngineStats::default(),
        }
    }

    /// Feed one classified event to the aggregator of its role and buffer the
    /// resulting percentage in the open join windows.
    pub fn process_event(&mut self, event: &DetectionEvent, now_ms: i64) {
        self.stats.events += 1;

        match event.role {
            CameraRole::Front => {
                if let Some(record) = self.ppe.add_event(event, now_ms) {
                    self.stats.ppe_emitted += 1;
                    self.join.insert_ppe(record);
                }
            }
            CameraRole::Up => {
                if let Some(record) = self.people.add_event(event, now_ms) {
                    self.stats.people_emitted += 1;
                    self.join.insert_people(record);
                }
            }
        }
    }

    /// Close join windows that ended by `now_ms`, drop repeated pairings and
    /// evaluate the alert rule on what remains.
    pub fn advance(&mut self, now_ms: i64) -> EngineOutput {
        let pairs = self.join.advance(now_ms);
        self.stats.joined_pairs += pairs.len() as u64;

        let now = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .unwrap_or_else(Utc::now);

        let mut output = EngineOutput::default();
        for pair in pairs {
            let Some(record) = self.dedup.admit(pair, now_ms) else {
                self.stats.suppressed += 1;
                continue;
            };
            self.stats.admitted += 1;

            if let Some(alert) = self.rules.evaluate(&record, now) {
                self.stats.alerts += 1;
                output.alerts.push(alert);
            }
            output.joined.push(record);
        }

        output
    }

    /// Evict aggregator windows of idle keys and expired dedup entries
    pub fn evict_idle(&mut self, now_ms: i64) {
        let cutoff = now_ms.saturating_sub(self.key_idle_ttl_ms);
        let evicted = self.ppe.evict_idle(cutoff) + self.people.evict_idle(cutoff);
        let expired = self.dedup.evict_expired(now_ms);

        self.stats.evicted_keys += evicted as u64;
        self.stats.expired_ids += expired as u64;

        if evicted > 0 {
            log::debug!("🧹 Evicted {} idle key windows, {} expired request ids", evicted, expired);
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn active_keys(&self) -> usize {
        self.ppe.key_count() + self.people.key_count()
    }

    pub fn open_join_windows(&self) -> usize {
        self.join.open_window_count()
    }
}
