//! Count-based rolling compliance windows, one per correlation key

use super::detection::{CameraRole, CorrelationKey, DetectionEvent};
use super::records::{PeopleCountPercentage, PercentageRecord, PpePercentage};
use std::collections::{HashMap, VecDeque};

/// Role-specific compliance test plus the typed output it produces
pub trait CompliancePredicate {
    type Output;

    fn role(&self) -> CameraRole;

    fn is_compliant(&self, event: &DetectionEvent) -> bool;

    fn wrap(&self, record: PercentageRecord) -> Self::Output;
}

/// FRONT: every person in view wears a head cover with confidence >= `min_confidence`
#[derive(Debug, Clone)]
pub struct PpePredicate {
    pub min_confidence: f64,
}

impl CompliancePredicate for PpePredicate {
    type Output = PpePercentage;

    fn role(&self) -> CameraRole {
        CameraRole::Front
    }

    fn is_compliant(&self, event: &DetectionEvent) -> bool {
        // An empty frame exposes nobody
        event
            .ppe_confidence
            .map_or(true, |confidence| confidence >= self.min_confidence)
    }

    fn wrap(&self, record: PercentageRecord) -> PpePercentage {
        PpePercentage(record)
    }
}

/// UP: number of worn tags equals number of people seen from above
#[derive(Debug, Clone, Default)]
pub struct PeopleMatchPredicate;

impl CompliancePredicate for PeopleMatchPredicate {
    type Output = PeopleCountPercentage;

    fn role(&self) -> CameraRole {
        CameraRole::Up
    }

    fn is_compliant(&self, event: &DetectionEvent) -> bool {
        event.tag_count == event.person_count
    }

    fn wrap(&self, record: PercentageRecord) -> PeopleCountPercentage {
        PeopleCountPercentage(record)
    }
}

/// Last `capacity` outcomes for one key, oldest first
#[derive(Debug, Clone)]
pub struct ComplianceWindow {
    capacity: usize,
    outcomes: VecDeque<bool>,
    compliant: usize,
    last_seen_ms: i64,
}

impl ComplianceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
            compliant: 0,
            last_seen_ms: 0,
        }
    }

    pub fn push(&mut self, outcome: bool, now_ms: i64) {
        self.outcomes.push_back(outcome);
        if outcome {
            self.compliant += 1;
        }

        while self.outcomes.len() > self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.compliant -= 1;
            }
        }

        self.last_seen_ms = now_ms;
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn compliant(&self) -> usize {
        self.compliant
    }

    pub fn percentage(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.compliant as f64 / self.outcomes.len() as f64
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms
    }
}

pub struct CountWindowAggregator<P: CompliancePredicate> {
    capacity: usize,
    predicate: P,
    windows: HashMap<CorrelationKey, ComplianceWindow>,
}

impl<P: CompliancePredicate> CountWindowAggregator<P> {
    pub fn new(capacity: usize, predicate: P) -> Self {
        Self {
            capacity,
            predicate,
            windows: HashMap::new(),
        }
    }

    /// Push one event into its key's window and emit the updated percentage.
    ///
    /// Returns `None` only when the event belongs to the other camera role.
    pub fn add_event(&mut self, event: &DetectionEvent, now_ms: i64) -> Option<P::Output> {
        if event.role != self.predicate.role() {
            log::debug!(
                "{} event routed to {} aggregator, ignoring",
                event.role.as_str(),
                self.predicate.role().as_str()
            );
            return None;
        }

        let outcome = self.predicate.is_compliant(event);
        let capacity = self.capacity;
        let window = self
            .windows
            .entry(event.correlation_key())
            .or_insert_with(|| ComplianceWindow::new(capacity));
        window.push(outcome, now_ms);

        let record = PercentageRecord {
            request_id: event.request_id.clone(),
            factory_id: event.factory_id.clone(),
            gateway_id: event.gateway_id.clone(),
            cam_id: event.cam_id.clone(),
            coupled_camera: event.coupled_camera.clone(),
            machine_active: event.machine_active,
            percentage: window.percentage(),
            compliant: window.compliant(),
            window_len: window.len(),
            emitted_at_ms: now_ms,
        };

        Some(self.predicate.wrap(record))
    }

    /// Drop windows of keys not seen since `cutoff_ms`. Returns how many were dropped.
    pub fn evict_idle(&mut self, cutoff_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.last_seen_ms() >= cutoff_ms);
        before - self.windows.len()
    }

    pub fn get_window(&self, key: &CorrelationKey) -> Option<&ComplianceWindow> {
        self.windows.get(key)
    }

    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front_event(confidence: f64) -> DetectionEvent {
        DetectionEvent {
            role: CameraRole::Front,
            request_id: "req".to_string(),
            factory_id: "f1".to_string(),
            gateway_id: "gw1".to_string(),
            cam_id: "cam-front".to_string(),
            coupled_camera: "pair-1".to_string(),
            machine_active: true,
            timestamp_ms: 0,
            ppe_confidence: Some(confidence),
            person_count: 1,
            tag_count: 1,
        }
    }

    fn up_event(persons: u32, tags: u32) -> DetectionEvent {
        DetectionEvent {
            role: CameraRole::Up,
            cam_id: "cam-up".to_string(),
            ppe_confidence: None,
            person_count: persons,
            tag_count: tags,
            ..front_event(0.0)
        }
    }

    #[test]
    fn test_percentage_is_exact_ratio_before_full() {
        let mut agg = CountWindowAggregator::new(10, PpePredicate { min_confidence: 70.0 });

        let confidences = [90.0, 50.0, 80.0, 69.9, 70.0, 99.0, 10.0];
        let mut compliant = 0;
        for (n, c) in confidences.iter().enumerate() {
            if *c >= 70.0 {
                compliant += 1;
            }
            let out = agg.add_event(&front_event(*c), n as i64).unwrap();
            assert_eq!(out.0.window_len, n + 1);
            assert_eq!(out.0.compliant, compliant);
            assert_eq!(out.0.percentage, compliant as f64 / (n + 1) as f64);
        }
    }

    #[test]
    fn test_oldest_outcome_evicted_after_capacity() {
        let mut agg = CountWindowAggregator::new(3, PpePredicate { min_confidence: 70.0 });

        agg.add_event(&front_event(10.0), 1);
        agg.add_event(&front_event(90.0), 2);
        let out = agg.add_event(&front_event(90.0), 3).unwrap();
        assert_eq!(out.0.percentage, 2.0 / 3.0);

        // 4th event pushes out the non-compliant first one
        let out = agg.add_event(&front_event(90.0), 4).unwrap();
        assert_eq!(out.0.window_len, 3);
        assert_eq!(out.0.compliant, 3);
        assert_eq!(out.0.percentage, 1.0);
    }

    #[test]
    fn test_people_match_predicate() {
        let mut agg = CountWindowAggregator::new(4, PeopleMatchPredicate);

        agg.add_event(&up_event(2, 2), 1);
        agg.add_event(&up_event(2, 1), 2);
        agg.add_event(&up_event(0, 0), 3);
        let out = agg.add_event(&up_event(3, 3), 4).unwrap();

        assert_eq!(out.0.percentage, 0.75);
        assert_eq!(out.0.cam_id, "cam-up");
    }

    #[test]
    fn test_wrong_role_is_ignored() {
        let mut agg = CountWindowAggregator::new(4, PeopleMatchPredicate);
        assert!(agg.add_event(&front_event(90.0), 1).is_none());
        assert_eq!(agg.key_count(), 0);
    }

    #[test]
    fn test_empty_frame_is_compliant() {
        let mut agg = CountWindowAggregator::new(4, PpePredicate { min_confidence: 70.0 });
        let mut event = front_event(0.0);
        event.ppe_confidence = None;
        event.person_count = 0;

        let out = agg.add_event(&event, 1).unwrap();
        assert_eq!(out.0.percentage, 1.0);
    }

    #[test]
    fn test_keys_are_independent_and_idle_keys_evicted() {
        let mut agg = CountWindowAggregator::new(4, PpePredicate { min_confidence: 70.0 });

        let mut other = front_event(10.0);
        other.coupled_camera = "pair-2".to_string();

        agg.add_event(&front_event(90.0), 1_000);
        agg.add_event(&other, 5_000);
        assert_eq!(agg.key_count(), 2);

        let key = front_event(0.0).correlation_key();
        assert_eq!(agg.get_window(&key).unwrap().percentage(), 1.0);

        assert_eq!(agg.evict_idle(2_000), 1);
        assert!(agg.get_window(&key).is_none());
        assert_eq!(agg.key_count(), 1);
    }
}
