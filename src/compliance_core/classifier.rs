//! Event classification and routing
//!
//! Raw lines are filtered on the model marker, decoded, and assigned to a shard by
//! correlation key so that every key is owned by exactly one worker.

use super::detection::{CorrelationKey, DetectionEvent, DropReason};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Result of classifying one raw record
#[derive(Debug)]
pub enum ClassifyOutcome {
    Accepted(DetectionEvent),
    Dropped(DropReason),
}

pub struct EventClassifier {
    marker: String,
}

impl EventClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn classify(&self, line: &str, received_at_ms: i64) -> ClassifyOutcome {
        if !line.contains(&self.marker) {
            return ClassifyOutcome::Dropped(DropReason::MissingMarker);
        }

        match DetectionEvent::from_json(line, received_at_ms) {
            Ok(event) => ClassifyOutcome::Accepted(event),
            Err(reason) => ClassifyOutcome::Dropped(reason),
        }
    }

    /// Classify a raw input line; bytes that are not UTF-8 are dropped, not fatal
    pub fn classify_bytes(&self, line: &[u8], received_at_ms: i64) -> ClassifyOutcome {
        match std::str::from_utf8(line) {
            Ok(line) => self.classify(line, received_at_ms),
            Err(e) => ClassifyOutcome::Dropped(DropReason::InvalidUtf8(e)),
        }
    }
}

/// Stable key -> shard assignment
#[derive(Debug, Clone)]
pub struct KeyRouter {
    shards: usize,
}

impl KeyRouter {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    pub fn shard_for(&self, key: &CorrelationKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance_core::detection::CameraRole;

    const MARKER: &str = "ProtectiveEquipmentModelVersion";

    #[test]
    fn test_accepts_marked_record() {
        let classifier = EventClassifier::new(MARKER);
        let line = r#"{"ProtectiveEquipmentModelVersion":"1.0","Persons":[],"SourceInfo":{"RequestId":"r1","FactoryId":"f","GatewayId":"g","CoupleCamera":"c","Camera":{"Type":"UP"}}}"#;

        match classifier.classify(line, 10) {
            ClassifyOutcome::Accepted(event) => {
                assert_eq!(event.role, CameraRole::Up);
                assert_eq!(event.request_id, "r1");
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_drops_record_without_marker() {
        let classifier = EventClassifier::new(MARKER);
        let line = r#"{"Persons":[],"SourceInfo":{"RequestId":"r1","Camera":{"Type":"UP"}}}"#;

        assert!(matches!(
            classifier.classify(line, 0),
            ClassifyOutcome::Dropped(DropReason::MissingMarker)
        ));
    }

    #[test]
    fn test_drops_undecodable_record() {
        let classifier = EventClassifier::new(MARKER);
        let line = r#"{"ProtectiveEquipmentModelVersion": "1.0", "Persons": "#;

        assert!(matches!(
            classifier.classify(line, 0),
            ClassifyOutcome::Dropped(DropReason::Malformed(_))
        ));
    }

    #[test]
    fn test_drops_non_utf8_bytes() {
        let classifier = EventClassifier::new(MARKER);
        let line = b"\xff\xfe ProtectiveEquipmentModelVersion";

        let outcome = classifier.classify_bytes(line, 0);
        assert!(matches!(outcome, ClassifyOutcome::Dropped(DropReason::InvalidUtf8(_))));
        if let ClassifyOutcome::Dropped(reason) = outcome {
            assert_eq!(reason.label(), "invalid_utf8");
        }
    }

    #[test]
    fn test_router_is_stable_and_in_range() {
        let router = KeyRouter::new(4);
        let key = CorrelationKey::new("f1", "gw1", "pair-1");

        let shard = router.shard_for(&key);
        assert!(shard < 4);
        for _ in 0..10 {
            assert_eq!(router.shard_for(&key.clone()), shard);
        }
    }

    #[test]
    fn test_router_never_has_zero_shards() {
        let router = KeyRouter::new(0);
        assert_eq!(router.shard_count(), 1);
        assert_eq!(router.shard_for(&CorrelationKey::new("a", "b", "c")), 0);
    }
}
