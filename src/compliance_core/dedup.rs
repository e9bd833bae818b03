//! Duplicate suppression for the sliding join's repeated pairings
//!
//! Remembers, per correlation key, which request ids were already emitted.
//! Entries expire after a fixed horizon so memory stays bounded no matter how
//! bursty the traffic is.

use super::detection::CorrelationKey;
use super::records::JoinedRecord;
use std::collections::HashMap;

pub struct DuplicateSuppressor {
    horizon_ms: i64,
    /// key -> request id -> expiry time
    seen: HashMap<CorrelationKey, HashMap<String, i64>>,
}

impl DuplicateSuppressor {
    pub fn new(horizon_ms: i64) -> Self {
        Self {
            horizon_ms,
            seen: HashMap::new(),
        }
    }

    /// Pass the record through the first time its request id shows up for its key
    /// within the horizon, `None` afterwards.
    pub fn admit(&mut self, record: JoinedRecord, now_ms: i64) -> Option<JoinedRecord> {
        let ids = self.seen.entry(record.correlation_key()).or_default();

        match ids.get(&record.request_id) {
            Some(&expires_at) if expires_at > now_ms => None,
            _ => {
                ids.insert(record.request_id.clone(), now_ms + self.horizon_ms);
                Some(record)
            }
        }
    }

    /// Forget expired ids and keys left with none. Returns how many ids were dropped.
    pub fn evict_expired(&mut self, now_ms: i64) -> usize {
        let mut evicted = 0;
        for ids in self.seen.values_mut() {
            let before = ids.len();
            ids.retain(|_, expires_at| *expires_at > now_ms);
            evicted += before - ids.len();
        }
        self.seen.retain(|_, ids| !ids.is_empty());
        evicted
    }

    pub fn tracked_ids(&self) -> usize {
        self.seen.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(request_id: &str, pair: &str) -> JoinedRecord {
        JoinedRecord {
            request_id: request_id.to_string(),
            factory_id: "f1".to_string(),
            gateway_id: "gw1".to_string(),
            cam_id: "cam".to_string(),
            coupled_camera: pair.to_string(),
            machine_active: true,
            ppe_percentage: 0.5,
            people_count_percentage: 1.0,
        }
    }

    #[test]
    fn test_repeats_within_horizon_are_dropped() {
        let mut dedup = DuplicateSuppressor::new(2000);

        assert!(dedup.admit(joined("r1", "p"), 100).is_some());
        assert!(dedup.admit(joined("r1", "p"), 200).is_none());
        assert!(dedup.admit(joined("r1", "p"), 2099).is_none());
        assert!(dedup.admit(joined("r2", "p"), 300).is_some());
    }

    #[test]
    fn test_same_request_on_other_key_is_distinct() {
        let mut dedup = DuplicateSuppressor::new(2000);

        assert!(dedup.admit(joined("r1", "pair-a"), 100).is_some());
        assert!(dedup.admit(joined("r1", "pair-b"), 100).is_some());
        assert_eq!(dedup.tracked_ids(), 2);
    }

    #[test]
    fn test_expired_id_is_admitted_again() {
        let mut dedup = DuplicateSuppressor::new(2000);

        assert!(dedup.admit(joined("r1", "p"), 100).is_some());
        assert!(dedup.admit(joined("r1", "p"), 2100).is_some());
    }

    #[test]
    fn test_evict_expired_bounds_memory() {
        let mut dedup = DuplicateSuppressor::new(1000);
        for i in 0..50 {
            dedup.admit(joined(&format!("r{}", i), "p"), i);
        }
        dedup.admit(joined("late", "other"), 5000);

        assert_eq!(dedup.evict_expired(2000), 50);
        assert_eq!(dedup.tracked_ids(), 1);
    }
}
