//! Tracker document generation
//!
//! The tracker is a derived view over the profile, the logs, the latest
//! evaluation and the latest proposals. It is never read back and can be
//! deleted and regenerated at any time. The reporter only arranges numbers
//! produced elsewhere; it applies no thresholds of its own.

pub mod render;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::adapter::AdaptationProposal;
use crate::config::ReporterConfig;
use crate::evaluator::{EvaluationResult, EVALUATION_EVENT};
use crate::types::{
    timestamp, DecisionRecord, DecisionStatus, DecisionType, Dimension, Level, LearnerProfile, Priority,
    ProgressEvent, Status,
};

/// A rendered tracker: generation time kept apart from content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerDocument {
    #[serde(with = "timestamp")]
    pub generated_at: DateTime<Utc>,
    pub content: TrackerContent,
}

impl TrackerDocument {
    /// Full Markdown document, generation line first
    pub fn render_markdown(&self) -> String {
        render::markdown(self)
    }

    /// Markdown without the generation line
    pub fn render_body(&self) -> String {
        render::body(&self.content)
    }
}

/// Everything in the tracker that is derived from inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerContent {
    pub learner: LearnerSummary,
    pub progress: ProgressSummary,
    pub evaluation: Option<EvaluationSummary>,
    pub months: Vec<MonthRollup>,
    pub activity: ActivitySummary,
    pub pending: Vec<PendingProposal>,
    /// Newest first
    pub recent_decisions: Vec<DecisionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSummary {
    pub id: String,
    pub level: Level,
    pub start_date: NaiveDate,
    pub hours_per_week: f64,
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub current_month: u32,
    pub current_week: u32,
    pub total_months: u32,
    pub percent_complete: u32,
    pub bar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBar {
    pub dimension: Dimension,
    pub score: f64,
    pub bar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    #[serde(with = "timestamp")]
    pub evaluated_at: DateTime<Utc>,
    pub status: Status,
    pub overall: f64,
    pub scores: Vec<ScoreBar>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthStatus {
    Completed,
    InProgress,
    Upcoming,
}

impl MonthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MonthStatus::Completed => "Completed",
            MonthStatus::InProgress => "In Progress",
            MonthStatus::Upcoming => "Upcoming",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRollup {
    pub month: u32,
    pub topic: String,
    pub status: MonthStatus,
    /// Progress events attributed to this month
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub log_entries: usize,
    pub completed_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
}

/// Where a pending proposal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingSource {
    /// Generated this cycle, not yet persisted
    Latest,
    /// A `proposed` record with no later record of the same type
    DecisionLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingProposal {
    pub decision_type: DecisionType,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub requires_approval: bool,
    pub source: PendingSource,
}

impl PendingProposal {
    fn from_proposal(proposal: &AdaptationProposal) -> Self {
        Self {
            decision_type: proposal.proposal_type,
            rationale: proposal.rationale.clone(),
            impact: Some(proposal.impact.clone()),
            priority: Some(proposal.priority),
            requires_approval: proposal.requires_approval,
            source: PendingSource::Latest,
        }
    }

    fn from_record(record: &DecisionRecord) -> Self {
        let details = &record.details;
        Self {
            decision_type: record.decision_type,
            rationale: record.rationale.clone(),
            impact: details.get("impact").and_then(|v| v.as_str()).map(str::to_string),
            priority: details
                .get("priority")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            requires_approval: details
                .get("requires_approval")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            source: PendingSource::DecisionLog,
        }
    }
}

/// Builds tracker documents
#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    /// Build a tracker stamped with the current time
    pub fn report(
        &self,
        profile: &LearnerProfile,
        events: &[ProgressEvent],
        decisions: &[DecisionRecord],
        latest_evaluation: Option<&EvaluationResult>,
        latest_proposals: &[AdaptationProposal],
    ) -> TrackerDocument {
        self.report_at(profile, events, decisions, latest_evaluation, latest_proposals, Utc::now())
    }

    /// Build a tracker stamped with `generated_at`
    pub fn report_at(
        &self,
        profile: &LearnerProfile,
        events: &[ProgressEvent],
        decisions: &[DecisionRecord],
        latest_evaluation: Option<&EvaluationResult>,
        latest_proposals: &[AdaptationProposal],
        generated_at: DateTime<Utc>,
    ) -> TrackerDocument {
        let content = TrackerContent {
            learner: LearnerSummary {
                id: profile.learner_id.clone(),
                level: profile.level,
                start_date: profile.start_date,
                hours_per_week: profile.constraints.hours_per_week,
                goals: profile.goals.clone(),
            },
            progress: self.progress(profile),
            evaluation: latest_evaluation.map(|e| self.evaluation_summary(e)),
            months: self.month_rollup(profile, events),
            activity: activity(events),
            pending: pending(decisions, latest_proposals),
            recent_decisions: self.recent_decisions(decisions),
        };

        debug!(
            "Built tracker for {}: {} pending proposal(s), {} recent decision(s)",
            profile.learner_id,
            content.pending.len(),
            content.recent_decisions.len()
        );
        TrackerDocument { generated_at, content }
    }

    fn progress(&self, profile: &LearnerProfile) -> ProgressSummary {
        let total = self.config.total_months;
        let percent = if total == 0 {
            0.0
        } else {
            let done = profile.current_month.saturating_sub(1) as f64 + profile.current_week as f64 / 4.0;
            (done / total as f64 * 100.0).clamp(0.0, 100.0)
        };
        let percent = percent.round() as u32;
        ProgressSummary {
            current_month: profile.current_month,
            current_week: profile.current_week,
            total_months: total,
            percent_complete: percent,
            bar: render::bar(percent as f64, self.config.bar_width),
        }
    }

    fn evaluation_summary(&self, evaluation: &EvaluationResult) -> EvaluationSummary {
        EvaluationSummary {
            evaluated_at: evaluation.timestamp,
            status: evaluation.status,
            overall: evaluation.overall,
            scores: Dimension::ALL
                .into_iter()
                .map(|d| {
                    let score = evaluation.score(d);
                    ScoreBar {
                        dimension: d,
                        score,
                        bar: render::bar(score, self.config.bar_width),
                    }
                })
                .collect(),
            recommendations: evaluation.recommendations.clone(),
        }
    }

    fn month_rollup(&self, profile: &LearnerProfile, events: &[ProgressEvent]) -> Vec<MonthRollup> {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for event in events.iter().filter(|e| e.event != EVALUATION_EVENT) {
            let month = event
                .month_hint()
                .or_else(|| calendar_month(profile.start_date, event.timestamp.date_naive()));
            if let Some(month) = month {
                *counts.entry(month).or_default() += 1;
            }
        }

        (1..=self.config.total_months)
            .map(|month| {
                let status = if month < profile.current_month {
                    MonthStatus::Completed
                } else if month == profile.current_month {
                    MonthStatus::InProgress
                } else {
                    MonthStatus::Upcoming
                };
                let topic = self
                    .config
                    .month_topics
                    .get(month as usize - 1)
                    .cloned()
                    .unwrap_or_else(|| format!("Month {:02}", month));
                MonthRollup {
                    month,
                    topic,
                    status,
                    events: counts.get(&month).copied().unwrap_or(0),
                }
            })
            .collect()
    }

    fn recent_decisions(&self, decisions: &[DecisionRecord]) -> Vec<DecisionRecord> {
        let mut sorted: Vec<&DecisionRecord> = decisions.iter().collect();
        sorted.sort_by_key(|d| d.timestamp);
        sorted
            .into_iter()
            .rev()
            .take(self.config.recent_decisions)
            .cloned()
            .collect()
    }
}

/// Curriculum month of a date, counting calendar months from the start date
fn calendar_month(start: NaiveDate, date: NaiveDate) -> Option<u32> {
    if date < start {
        return None;
    }
    let mut months = (date.year() - start.year()) * 12 + date.month() as i32 - start.month() as i32;
    if date.day() < start.day() {
        months -= 1;
    }
    u32::try_from(months + 1).ok()
}

/// Learner activity only; persisted evaluations are not activity
fn activity(events: &[ProgressEvent]) -> ActivitySummary {
    let learner: Vec<&ProgressEvent> = events.iter().filter(|e| e.event != EVALUATION_EVENT).collect();
    ActivitySummary {
        log_entries: learner.len(),
        completed_tasks: learner.iter().filter(|e| e.event.contains("completed")).count(),
        last_activity: learner.iter().map(|e| e.timestamp).max().map(|ts| timestamp::format(&ts)),
    }
}

/// Open `proposed` records from the log plus this cycle's proposals of other types
fn pending(decisions: &[DecisionRecord], latest: &[AdaptationProposal]) -> Vec<PendingProposal> {
    let mut sorted: Vec<&DecisionRecord> = decisions.iter().collect();
    sorted.sort_by_key(|d| d.timestamp);
    let mut last_by_type: BTreeMap<DecisionType, &DecisionRecord> = BTreeMap::new();
    for record in sorted {
        last_by_type.insert(record.decision_type, record);
    }

    let mut pending: Vec<PendingProposal> = last_by_type
        .values()
        .filter(|r| r.status == DecisionStatus::Proposed)
        .map(|r| PendingProposal::from_record(r))
        .collect();
    for proposal in latest {
        if !pending.iter().any(|p| p.decision_type == proposal.proposal_type) {
            pending.push(PendingProposal::from_proposal(proposal));
        }
    }
    pending.sort_by_key(|p| p.decision_type);
    pending
}
