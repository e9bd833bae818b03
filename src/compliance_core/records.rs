//! Records flowing between the aggregation, join and alerting stages

use super::detection::CorrelationKey;
use serde::Serialize;

/// Rolling compliance statistic for one correlation key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageRecord {
    pub request_id: String,
    pub factory_id: String,
    pub gateway_id: String,
    pub cam_id: String,
    pub coupled_camera: String,
    pub machine_active: bool,
    /// Always `compliant / window_len`, within [0.0, 1.0]
    pub percentage: f64,
    pub compliant: usize,
    pub window_len: usize,
    pub emitted_at_ms: i64,
}

impl PercentageRecord {
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(&self.factory_id, &self.gateway_id, &self.coupled_camera)
    }
}

/// Share of recent frontal frames with head cover above the minimum confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PpePercentage(pub PercentageRecord);

/// Share of recent overhead frames where tag count matched person count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeopleCountPercentage(pub PercentageRecord);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRecord {
    pub request_id: String,
    pub factory_id: String,
    pub gateway_id: String,
    pub cam_id: String,
    pub coupled_camera: String,
    pub machine_active: bool,
    pub ppe_percentage: f64,
    pub people_count_percentage: f64,
}

impl JoinedRecord {
    /// Identity fields are taken from the PPE side.
    pub fn from_pair(ppe: &PpePercentage, people: &PeopleCountPercentage) -> Self {
        let p = &ppe.0;
        Self {
            request_id: p.request_id.clone(),
            factory_id: p.factory_id.clone(),
            gateway_id: p.gateway_id.clone(),
            cam_id: p.cam_id.clone(),
            coupled_camera: p.coupled_camera.clone(),
            machine_active: p.machine_active,
            ppe_percentage: p.percentage,
            people_count_percentage: people.0.percentage,
        }
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(&self.factory_id, &self.gateway_id, &self.coupled_camera)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub request_id: String,
    /// ISO-8601 dispatch timestamp
    pub timestamp: String,
}
