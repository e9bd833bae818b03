//! Detection record decoding: raw per-frame JSON into a typed `DetectionEvent`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Equipment type the frontal camera is checked for
const HEAD_COVER: &str = "HEAD_COVER";
const HEAD: &str = "HEAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraRole {
    #[serde(rename = "FRONT")]
    Front,
    #[serde(rename = "UP")]
    Up,
}

impl CameraRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraRole::Front => "FRONT",
            CameraRole::Up => "UP",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FRONT" => Some(CameraRole::Front),
            "UP" => Some(CameraRole::Up),
            _ => None,
        }
    }
}

/// Groups the FRONT and UP camera of one machine position.
///
/// `cam_id` is deliberately not part of the key: the two cameras of a pair
/// have different ids but share factory, gateway and coupled-camera group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub factory_id: String,
    pub gateway_id: String,
    pub coupled_camera: String,
}

impl CorrelationKey {
    pub fn new(factory_id: &str, gateway_id: &str, coupled_camera: &str) -> Self {
        Self {
            factory_id: factory_id.to_string(),
            gateway_id: gateway_id.to_string(),
            coupled_camera: coupled_camera.to_string(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.factory_id, self.gateway_id, self.coupled_camera)
    }
}

/// Why a raw record never became a `DetectionEvent`
#[derive(Debug)]
pub enum DropReason {
    MissingMarker,
    InvalidUtf8(std::str::Utf8Error),
    Malformed(serde_json::Error),
    MissingSourceInfo,
    MissingCameraType,
    UnknownCameraType(String),
    MissingRequestId,
}

impl DropReason {
    /// Stable label used for drop counters
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::MissingMarker => "missing_marker",
            DropReason::InvalidUtf8(_) => "invalid_utf8",
            DropReason::Malformed(_) => "malformed",
            DropReason::MissingSourceInfo => "missing_source_info",
            DropReason::MissingCameraType => "missing_camera_type",
            DropReason::UnknownCameraType(_) => "unknown_camera_type",
            DropReason::MissingRequestId => "missing_request_id",
        }
    }
}

impl From<serde_json::Error> for DropReason {
    fn from(err: serde_json::Error) -> Self {
        DropReason::Malformed(err)
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingMarker => write!(f, "record has no model marker"),
            DropReason::InvalidUtf8(e) => write!(f, "record is not valid UTF-8: {}", e),
            DropReason::Malformed(e) => write!(f, "malformed detection record: {}", e),
            DropReason::MissingSourceInfo => write!(f, "record has no SourceInfo"),
            DropReason::MissingCameraType => write!(f, "SourceInfo.Camera.Type is missing"),
            DropReason::UnknownCameraType(t) => write!(f, "unknown camera type '{}'", t),
            DropReason::MissingRequestId => write!(f, "SourceInfo.RequestId is missing"),
        }
    }
}

impl std::error::Error for DropReason {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawDetection {
    #[serde(default)]
    pub persons: Vec<RawPerson>,
    #[serde(default)]
    pub total_frames: Option<u32>,
    #[serde(default, alias = "sourceInfo")]
    pub source_info: Option<RawSourceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPerson {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub body_parts: Vec<RawBodyPart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawBodyPart {
    pub name: String,
    #[serde(default)]
    pub equipment_detections: Vec<RawEquipment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEquipment {
    #[serde(rename = "Type")]
    pub equipment_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub covers_body_part: Option<RawCoverage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCoverage {
    pub value: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSourceInfo {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub factory_id: String,
    #[serde(default)]
    pub gateway_id: String,
    #[serde(default)]
    pub cam_id: String,
    #[serde(default)]
    pub couple_camera: String,
    #[serde(default)]
    pub active_machine: bool,
    #[serde(default)]
    pub tag_count: u32,
    /// Capture time in unix milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, alias = "camera")]
    pub camera: Option<RawCamera>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCamera {
    #[serde(default, rename = "Type", alias = "type")]
    pub camera_type: Option<String>,
    #[serde(default, rename = "Stream", alias = "stream")]
    pub stream: Option<String>,
}

impl RawPerson {
    /// Best confidence of a head cover that actually covers the head, 0.0 if none
    fn head_cover_confidence(&self) -> f64 {
        self.body_parts
            .iter()
            .filter(|part| part.name == HEAD)
            .flat_map(|part| part.equipment_detections.iter())
            .filter(|eq| eq.equipment_type == HEAD_COVER)
            .filter(|eq| eq.covers_body_part.as_ref().map_or(false, |c| c.value))
            .map(|eq| eq.confidence)
            .fold(0.0, f64::max)
    }
}

/// One camera frame report, immutable once parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub role: CameraRole,
    pub request_id: String,
    pub factory_id: String,
    pub gateway_id: String,
    pub cam_id: String,
    pub coupled_camera: String,
    pub machine_active: bool,
    pub timestamp_ms: i64,
    /// Lowest per-person head-cover confidence in the frame; `None` when nobody is in view
    pub ppe_confidence: Option<f64>,
    pub person_count: u32,
    pub tag_count: u32,
}

impl DetectionEvent {
    /// Decode a raw record. `received_at_ms` stamps frames that carry no capture time.
    pub fn from_json(line: &str, received_at_ms: i64) -> Result<Self, DropReason> {
        let raw: RawDetection = serde_json::from_str(line)?;
        Self::from_raw(raw, received_at_ms)
    }

    pub fn from_raw(raw: RawDetection, received_at_ms: i64) -> Result<Self, DropReason> {
        let source = raw.source_info.ok_or(DropReason::MissingSourceInfo)?;

        let camera_type = source
            .camera
            .as_ref()
            .and_then(|c| c.camera_type.as_deref())
            .ok_or(DropReason::MissingCameraType)?;
        let role = CameraRole::from_str(camera_type)
            .ok_or_else(|| DropReason::UnknownCameraType(camera_type.to_string()))?;

        let request_id = source
            .request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(DropReason::MissingRequestId)?;

        let ppe_confidence = raw
            .persons
            .iter()
            .map(RawPerson::head_cover_confidence)
            .reduce(f64::min);

        Ok(Self {
            role,
            request_id,
            factory_id: source.factory_id,
            gateway_id: source.gateway_id,
            cam_id: source.cam_id,
            coupled_camera: source.couple_camera,
            machine_active: source.active_machine,
            timestamp_ms: source.timestamp.unwrap_or(received_at_ms),
            ppe_confidence,
            person_count: raw.persons.len() as u32,
            tag_count: source.tag_count,
        })
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(&self.factory_id, &self.gateway_id, &self.coupled_camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONT_LINE: &str = r#"{"ProtectiveEquipmentModelVersion":"1.0","Persons":[{"Id":0,"BodyParts":[{"Name":"FACE","Confidence":99.1,"EquipmentDetections":[]},{"Name":"HEAD","Confidence":98.7,"EquipmentDetections":[{"Type":"HEAD_COVER","Confidence":91.5,"CoversBodyPart":{"Confidence":99.0,"Value":true}}]}]},{"Id":1,"BodyParts":[{"Name":"HEAD","Confidence":97.0,"EquipmentDetections":[{"Type":"HEAD_COVER","Confidence":75.25,"CoversBodyPart":{"Confidence":88.0,"Value":true}}]}]}],"TotalFrames":5,"SourceInfo":{"RequestId":"req-1","FactoryId":"f1","GatewayId":"gw1","CamId":"cam-front","CoupleCamera":"pair-7","ActiveMachine":true,"TagCount":2,"Timestamp":1700000000123,"Camera":{"Type":"FRONT","Stream":"kvs_front"}}}"#;

    #[test]
    fn test_parse_front_frame() {
        let event = DetectionEvent::from_json(FRONT_LINE, 0).unwrap();
        assert_eq!(event.role, CameraRole::Front);
        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.cam_id, "cam-front");
        assert_eq!(event.timestamp_ms, 1700000000123);
        assert_eq!(event.person_count, 2);
        assert_eq!(event.tag_count, 2);
        assert_eq!(event.ppe_confidence, Some(75.25));
        assert!(event.machine_active);
        assert_eq!(event.correlation_key(), CorrelationKey::new("f1", "gw1", "pair-7"));
    }

    #[test]
    fn test_uncovered_head_counts_as_zero() {
        let line = r#"{"Persons":[{"BodyParts":[{"Name":"HEAD","EquipmentDetections":[{"Type":"HEAD_COVER","Confidence":99.0,"CoversBodyPart":{"Value":false}}]}]}],"SourceInfo":{"RequestId":"r","Camera":{"Type":"FRONT"}}}"#;
        let event = DetectionEvent::from_json(line, 42).unwrap();
        assert_eq!(event.ppe_confidence, Some(0.0));
        assert_eq!(event.timestamp_ms, 42);
    }

    #[test]
    fn test_camel_case_source_info() {
        let line = r#"{"Persons":[],"sourceInfo":{"RequestId":"r","camera":{"type":"up"}}}"#;
        let event = DetectionEvent::from_json(line, 0).unwrap();
        assert_eq!(event.role, CameraRole::Up);
        assert_eq!(event.ppe_confidence, None);
        assert_eq!(event.person_count, 0);
    }

    #[test]
    fn test_missing_camera_type() {
        let line = r#"{"Persons":[],"SourceInfo":{"RequestId":"r","Camera":{"Stream":"s"}}}"#;
        let err = DetectionEvent::from_json(line, 0).unwrap_err();
        assert_eq!(err.label(), "missing_camera_type");
    }

    #[test]
    fn test_unknown_camera_type() {
        let line = r#"{"Persons":[],"SourceInfo":{"RequestId":"r","Camera":{"Type":"SIDE"}}}"#;
        let err = DetectionEvent::from_json(line, 0).unwrap_err();
        assert!(matches!(err, DropReason::UnknownCameraType(ref t) if t == "SIDE"));
    }

    #[test]
    fn test_missing_request_id() {
        let line = r#"{"Persons":[],"SourceInfo":{"Camera":{"Type":"UP"}}}"#;
        let err = DetectionEvent::from_json(line, 0).unwrap_err();
        assert_eq!(err.label(), "missing_request_id");
    }

    #[test]
    fn test_malformed_json() {
        let err = DetectionEvent::from_json(r#"{"Persons": [#"#, 0).unwrap_err();
        assert!(matches!(err, DropReason::Malformed(_)));
    }
}
