//! Error types for scoring, history and the citizen report store.
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("invalid range for {component}: min {min} must be below max {max}")]
    InvalidRange { component: String, min: f64, max: f64 },
    #[error("invalid weight for {component}: {weight}")]
    InvalidWeight { component: String, weight: f64 },
    #[error("non-finite reading for {component}")]
    NonFiniteReading { component: String },
    #[error("no calibration range for weighted component {0}")]
    UnknownComponent(String),
    #[error("band thresholds must increase: {moderate} < {elevated} < {critical}")]
    InvalidThresholds { moderate: f64, elevated: f64, critical: f64 },
    #[error("scale factor and ceiling must be positive: {scale_factor} / {output_ceiling}")]
    InvalidScale { scale_factor: f64, output_ceiling: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("unknown sector: {0}")]
    UnknownSector(String),
    #[error("unknown issue type: {0}")]
    UnknownIssue(String),
    #[error("severity {0} outside 1..=5")]
    SeverityOutOfRange(u8),
    #[error("report not found: {0}")]
    NotFound(Uuid),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("alert threshold must be finite and non-negative, got {0}")]
    InvalidAlertThreshold(f64),
    #[error("profile {profile} has no sectors")]
    NoSectors { profile: String },
    #[error("profile {profile} has {rows} rows, at most {max} are supported")]
    TooManyRows {
        profile: String,
        rows: usize,
        max: usize,
    },
    #[error("component {0} is configured more than once")]
    DuplicateComponent(String),
    #[error("{role} refers to unconfigured component {component}")]
    UnconfiguredComponent { role: &'static str, component: String },
    #[error("incident severity must be within 1..=5, got {0}")]
    InvalidIncidentSeverity(u8),
    #[error("read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse profile: {0}")]
    Parse(#[from] serde_json::Error),
}
