//! Compliance Core - windowed aggregation, stream join and alert rules
//!
//! # Architecture
//!
//! ```text
//! raw JSONL line → EventClassifier (marker + decode) → KeyRouter (shard by key)
//!     ↓
//! CountWindowAggregator<PpePredicate>    CountWindowAggregator<PeopleMatchPredicate>
//!     ↓                                       ↓
//!     └──────── SlidingWindowJoin (key, L/S windows) ────────┘
//!     ↓
//! DuplicateSuppressor (request id + key, time horizon)
//!     ↓
//! AlertRuleEvaluator (machine active && share < threshold)
//! ```

pub mod classifier;
pub mod dedup;
pub mod detection;
pub mod join;
pub mod records;
pub mod rules;
pub mod window;

pub use classifier::{ClassifyOutcome, EventClassifier, KeyRouter};
pub use dedup::DuplicateSuppressor;
pub use detection::{CameraRole, CorrelationKey, DetectionEvent, DropReason};
pub use join::SlidingWindowJoin;
pub use records::{Alert, JoinedRecord, PeopleCountPercentage, PercentageRecord, PpePercentage};
pub use rules::AlertRuleEvaluator;
pub use window::{
    ComplianceWindow, CompliancePredicate, CountWindowAggregator, PeopleMatchPredicate, PpePredicate,
};
