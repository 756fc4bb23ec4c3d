//! Shared types used across modules
//!
//! This module contains the persisted record shapes (profile, progress events,
//! decision records) and the closed enumerations the engine reasons about.
//! Unknown enum values are rejected at deserialization time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Midpoint score used whenever there is nothing to score.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Learner level on the curriculum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[serde(alias = "Beginner")]
    Beginner,
    #[serde(alias = "Intermediate")]
    Intermediate,
    #[serde(alias = "Advanced")]
    Advanced,
}

impl Level {
    /// The next easier level, if any
    pub fn lower(&self) -> Option<Level> {
        match self {
            Level::Beginner => None,
            Level::Intermediate => Some(Level::Beginner),
            Level::Advanced => Some(Level::Intermediate),
        }
    }

    /// The next harder level, if any
    pub fn higher(&self) -> Option<Level> {
        match self {
            Level::Beginner => Some(Level::Intermediate),
            Level::Intermediate => Some(Level::Advanced),
            Level::Advanced => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Beginner => write!(f, "beginner"),
            Level::Intermediate => write!(f, "intermediate"),
            Level::Advanced => write!(f, "advanced"),
        }
    }
}

/// Weekly time budget and similar limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: f64,
}

fn default_hours_per_week() -> f64 {
    10.0
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            hours_per_week: default_hours_per_week(),
        }
    }
}

/// The single learner profile. Only an external approval workflow mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: String,
    pub level: Level,
    pub start_date: NaiveDate,
    #[serde(default = "default_one")]
    pub current_month: u32,
    #[serde(default = "default_one")]
    pub current_week: u32,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub goals: Vec<String>,
}

fn default_one() -> u32 {
    1
}

/// One line of the progress log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Free-form event tag such as `task_completed` or `blocker`
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ProgressEvent {
    /// Create an event stamped with the current time
    pub fn new(event: impl Into<String>, message: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            message,
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Curriculum month recorded in `metadata.month`, when present
    pub fn month_hint(&self) -> Option<u32> {
        self.metadata
            .as_ref()?
            .get("month")?
            .as_u64()
            .and_then(|m| u32::try_from(m).ok())
    }
}

/// The four kinds of curriculum change the adapter may propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    LevelChange,
    RemediationWeek,
    MonthReorder,
    ProjectSwap,
}

impl DecisionType {
    /// All types in declaration order
    pub const ALL: [DecisionType; 4] = [
        DecisionType::LevelChange,
        DecisionType::RemediationWeek,
        DecisionType::MonthReorder,
        DecisionType::ProjectSwap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::LevelChange => "level_change",
            DecisionType::RemediationWeek => "remediation_week",
            DecisionType::MonthReorder => "month_reorder",
            DecisionType::ProjectSwap => "project_swap",
        }
    }

    /// Title-cased label for rendered documents
    pub fn label(&self) -> &'static str {
        match self {
            DecisionType::LevelChange => "Level Change",
            DecisionType::RemediationWeek => "Remediation Week",
            DecisionType::MonthReorder => "Month Reorder",
            DecisionType::ProjectSwap => "Project Swap",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!(
                "unknown decision type '{}' (expected one of: level_change, remediation_week, month_reorder, project_swap)",
                s
            ))
    }
}

/// Lifecycle of a decision record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    Approved,
    Rejected,
    Applied,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Proposed => write!(f, "proposed"),
            DecisionStatus::Approved => write!(f, "approved"),
            DecisionStatus::Rejected => write!(f, "rejected"),
            DecisionStatus::Applied => write!(f, "applied"),
        }
    }
}

impl FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(DecisionStatus::Proposed),
            "approved" => Ok(DecisionStatus::Approved),
            "rejected" => Ok(DecisionStatus::Rejected),
            "applied" => Ok(DecisionStatus::Applied),
            other => Err(format!(
                "unknown decision status '{}' (expected one of: proposed, approved, rejected, applied)",
                other
            )),
        }
    }
}

/// One line of the decision log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub decision_type: DecisionType,
    pub status: DecisionStatus,
    #[serde(default)]
    pub rationale: String,
    #[serde(default = "empty_object")]
    pub details: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl DecisionRecord {
    pub fn new(
        decision_type: DecisionType,
        status: DecisionStatus,
        rationale: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            decision_type,
            status,
            rationale: rationale.into(),
            details,
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A scored axis of learner progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Completion,
    Quality,
    Velocity,
    Reflection,
}

impl Dimension {
    /// All dimensions in declaration order
    pub const ALL: [Dimension; 4] = [
        Dimension::Completion,
        Dimension::Quality,
        Dimension::Velocity,
        Dimension::Reflection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Completion => "Completion",
            Dimension::Quality => "Quality",
            Dimension::Velocity => "Velocity",
            Dimension::Reflection => "Reflection",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Completion => write!(f, "completion"),
            Dimension::Quality => write!(f, "quality"),
            Dimension::Velocity => write!(f, "velocity"),
            Dimension::Reflection => write!(f, "reflection"),
        }
    }
}

/// Overall classification of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Excellent,
    OnTrack,
    NeedsAttention,
    AtRisk,
}

impl Status {
    /// Whether the CLI should exit successfully for this status
    pub fn is_passing(&self) -> bool {
        matches!(self, Status::Excellent | Status::OnTrack)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Excellent => "Excellent",
            Status::OnTrack => "On Track",
            Status::NeedsAttention => "Needs Attention",
            Status::AtRisk => "At Risk",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Excellent => write!(f, "excellent"),
            Status::OnTrack => write!(f, "on_track"),
            Status::NeedsAttention => write!(f, "needs_attention"),
            Status::AtRisk => write!(f, "at_risk"),
        }
    }
}

/// Direction of activity between two adjacent windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Improving => write!(f, "improving"),
            Trend::Stable => write!(f, "stable"),
            Trend::Declining => write!(f, "declining"),
        }
    }
}

/// Priority level of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// How far back the tally dimensions look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Configured per-dimension windows
    #[default]
    Week,
    /// 30-day windows
    Month,
    /// Everything in the log
    Overall,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Scope::Week),
            "month" => Ok(Scope::Month),
            "overall" => Ok(Scope::Overall),
            other => Err(format!("unknown scope '{}' (expected week, month or overall)", other)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Week => write!(f, "week"),
            Scope::Month => write!(f, "month"),
            Scope::Overall => write!(f, "overall"),
        }
    }
}

/// Lenient ISO-8601 timestamps.
///
/// External writers produce RFC 3339 with an offset, naive local-looking
/// datetimes, or bare dates. Naive values are taken as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

    /// Parse a timestamp string, returning `None` when no format matches
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Canonical rendering used for every record the engine writes
    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unparseable timestamp '{}'", raw)))
    }
}
