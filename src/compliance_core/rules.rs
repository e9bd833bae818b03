//! Alert rule over deduplicated joined records

use super::records::{Alert, JoinedRecord};
use chrono::{DateTime, SecondsFormat, Utc};

pub struct AlertRuleEvaluator {
    threshold: f64,
}

impl AlertRuleEvaluator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Raise an alert when the machine runs while either compliance share is below threshold
    ///
    /// # Conditions
    /// - machine active
    /// - PPE percentage < threshold, **or** people-count percentage < threshold
    pub fn evaluate(&self, record: &JoinedRecord, now: DateTime<Utc>) -> Option<Alert> {
        if !record.machine_active {
            return None;
        }

        if record.ppe_percentage < self.threshold || record.people_count_percentage < self.threshold {
            return Some(Alert {
                request_id: record.request_id.clone(),
                timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            });
        }

        None
    }
}
