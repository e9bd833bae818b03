//! PPE compliance pipeline: correlates frontal head-cover detections with
//! overhead people counts per camera pair and alerts on non-compliant, active machines.

pub mod compliance_core;
pub mod dispatch;
pub mod pipeline;
