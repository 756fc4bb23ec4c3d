//! Curriculum adaptation proposals
//!
//! The adapter turns an evaluation into a short, ordered list of proposals.
//! Only four kinds exist ([`DecisionType`]). Proposals are advice: nothing
//! here touches the profile, and persisting a proposal as a `proposed`
//! decision record is an explicit caller step ([`AdaptationProposal::to_decision`]).

pub mod cooldown;
pub mod rules;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AdapterConfig;
use crate::evaluator::EvaluationResult;
use crate::types::{DecisionRecord, DecisionStatus, DecisionType, LearnerProfile, Priority};

pub use cooldown::Cooldown;

/// A suggested curriculum change awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationProposal {
    #[serde(rename = "type")]
    pub proposal_type: DecisionType,
    /// Triggering signal and its value
    pub rationale: String,
    /// What changes if the proposal is approved
    pub impact: String,
    pub requires_approval: bool,
    pub priority: Priority,
    /// Structured parameters (levels, focus dimensions, month numbers)
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AdaptationProposal {
    /// The `proposed` decision record a caller appends to persist this proposal
    pub fn to_decision(&self, timestamp: DateTime<Utc>) -> DecisionRecord {
        let mut details = match &self.details {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        details.insert("impact".to_string(), self.impact.clone().into());
        details.insert("priority".to_string(), self.priority.to_string().into());
        details.insert("requires_approval".to_string(), self.requires_approval.into());

        DecisionRecord::new(
            self.proposal_type,
            DecisionStatus::Proposed,
            self.rationale.clone(),
            serde_json::Value::Object(details),
        )
        .at(timestamp)
    }
}

/// Applies the threshold table and the cooldown to evaluations
#[derive(Debug, Clone)]
pub struct Adapter {
    config: AdapterConfig,
}

impl Adapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Proposals for this evaluation, ordered by decision type
    pub fn adapt(
        &self,
        evaluation: &EvaluationResult,
        profile: &LearnerProfile,
        decisions: &[DecisionRecord],
    ) -> Vec<AdaptationProposal> {
        let cooldown = Cooldown::from_history(decisions, self.config.cooldown_window);

        let mut proposals: Vec<AdaptationProposal> = rules::candidates(evaluation, profile, &self.config)
            .into_iter()
            .filter(|p| match cooldown.blocking(p.proposal_type) {
                Some(record) => {
                    debug!(
                        "Suppressing {} proposal: {} record from {} is within the last {} decisions",
                        p.proposal_type, record.status, record.timestamp, self.config.cooldown_window
                    );
                    false
                }
                None => true,
            })
            .collect();
        proposals.sort_by_key(|p| p.proposal_type);

        info!(
            "Generated {} proposal(s) for {} at overall {:.1}",
            proposals.len(),
            profile.learner_id,
            evaluation.overall
        );
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::evaluator::EvaluationSignals;
    use crate::types::{Dimension, Level, Status, Trend};
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
    }

    fn profile(level: Level) -> LearnerProfile {
        LearnerProfile {
            learner_id: "learner-1".to_string(),
            level,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            current_month: 5,
            current_week: 2,
            constraints: Default::default(),
            goals: Vec::new(),
        }
    }

    fn evaluation(overall: f64, scores: [f64; 4], trend: Trend, blockers: usize) -> EvaluationResult {
        let config = EvaluatorConfig::default();
        EvaluationResult {
            timestamp: now(),
            learner_id: "learner-1".to_string(),
            level: Level::Intermediate,
            scores: Dimension::ALL.into_iter().zip(scores).collect::<BTreeMap<_, _>>(),
            weights: config.weights.as_map(),
            overall,
            status: config.status_bands.classify(overall),
            recommendations: Vec::new(),
            signals: EvaluationSignals {
                trend,
                blockers,
                ..EvaluationSignals::default()
            },
        }
    }

    fn adapter() -> Adapter {
        Adapter::new(AdapterConfig::default())
    }

    fn types(proposals: &[AdaptationProposal]) -> Vec<DecisionType> {
        proposals.iter().map(|p| p.proposal_type).collect()
    }

    fn history(types: &[DecisionType]) -> Vec<DecisionRecord> {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                DecisionRecord::new(*t, DecisionStatus::Proposed, "earlier", serde_json::json!({}))
                    .at(now() - Duration::days(30) + Duration::hours(i as i64))
            })
            .collect()
    }

    #[test]
    fn test_low_overall_downgrades_only() {
        let eval = evaluation(35.0, [35.0, 35.0, 35.0, 35.0], Trend::Stable, 0);
        let proposals = adapter().adapt(&eval, &profile(Level::Intermediate), &[]);
        assert_eq!(types(&proposals), vec![DecisionType::LevelChange]);
        let proposal = &proposals[0];
        assert_eq!(proposal.details["direction"], "downgrade");
        assert_eq!(proposal.details["to"], "beginner");
        assert!(proposal.requires_approval);
        assert_eq!(proposal.priority, Priority::High);
        assert!(proposal.rationale.contains("35.0"));
    }

    #[test]
    fn test_beginner_gets_remediation_instead_of_downgrade() {
        let eval = evaluation(35.0, [30.0, 45.0, 25.0, 40.0], Trend::Declining, 0);
        let proposals = adapter().adapt(&eval, &profile(Level::Beginner), &[]);
        assert_eq!(types(&proposals), vec![DecisionType::RemediationWeek]);
        let proposal = &proposals[0];
        assert!(proposal.requires_approval);
        assert_eq!(proposal.priority, Priority::High);
        assert_eq!(
            proposal.details["focus"],
            serde_json::json!(["completion", "quality", "velocity", "reflection"])
        );
        assert!(proposal.impact.contains("month 06 starts 1 week later"));
    }

    #[test]
    fn test_single_weak_dimension_is_auto_approvable() {
        let eval = evaluation(62.0, [75.0, 70.0, 65.0, 30.0], Trend::Stable, 0);
        let proposals = adapter().adapt(&eval, &profile(Level::Intermediate), &[]);
        assert_eq!(types(&proposals), vec![DecisionType::RemediationWeek]);
        assert!(!proposals[0].requires_approval);
        assert_eq!(proposals[0].priority, Priority::Low);
        assert_eq!(proposals[0].details["focus"], serde_json::json!(["reflection"]));
        assert!(proposals[0].rationale.starts_with("Reflection score (30.0)"));
    }

    #[test]
    fn test_auto_approval_can_be_disabled() {
        let config = AdapterConfig {
            auto_approve_remediation: false,
            ..AdapterConfig::default()
        };
        let eval = evaluation(62.0, [75.0, 70.0, 65.0, 30.0], Trend::Stable, 0);
        let proposals = Adapter::new(config).adapt(&eval, &profile(Level::Intermediate), &[]);
        assert!(proposals[0].requires_approval);
        assert_eq!(proposals[0].priority, Priority::Medium);
    }

    #[test]
    fn test_low_overall_without_weak_dimension_focuses_lowest() {
        let eval = evaluation(55.0, [58.0, 52.0, 52.0, 57.0], Trend::Stable, 0);
        let proposals = adapter().adapt(&eval, &profile(Level::Intermediate), &[]);
        assert_eq!(types(&proposals), vec![DecisionType::RemediationWeek]);
        assert_eq!(proposals[0].details["focus"], serde_json::json!(["quality"]));
        assert!(proposals[0].requires_approval);
        assert_eq!(proposals[0].priority, Priority::Medium);
    }

    #[test]
    fn test_strong_learner_upgrade_and_reorder() {
        let eval = evaluation(93.0, [95.0, 90.0, 92.0, 94.0], Trend::Improving, 0);
        let proposals = adapter().adapt(&eval, &profile(Level::Beginner), &[]);
        assert_eq!(
            types(&proposals),
            vec![DecisionType::LevelChange, DecisionType::MonthReorder]
        );
        assert_eq!(proposals[0].details["direction"], "upgrade");
        assert_eq!(proposals[0].priority, Priority::Medium);
        assert_eq!(proposals[1].details["swap"], serde_json::json!([6, 7]));
        assert!(proposals.iter().all(|p| p.requires_approval));
    }

    #[test]
    fn test_declining_trend_blocks_upgrade() {
        let eval = evaluation(93.0, [95.0, 90.0, 92.0, 94.0], Trend::Declining, 0);
        assert!(adapter().adapt(&eval, &profile(Level::Beginner), &[]).is_empty());
    }

    #[test]
    fn test_advanced_cannot_upgrade() {
        let eval = evaluation(93.0, [95.0, 80.0, 92.0, 94.0], Trend::Stable, 0);
        assert!(adapter().adapt(&eval, &profile(Level::Advanced), &[]).is_empty());
    }

    #[test]
    fn test_project_swap_needs_blockers() {
        let eval = evaluation(45.0, [40.0, 42.0, 60.0, 55.0], Trend::Stable, 2);
        assert!(!types(&adapter().adapt(&eval, &profile(Level::Intermediate), &[]))
            .contains(&DecisionType::ProjectSwap));

        let eval = evaluation(45.0, [40.0, 42.0, 60.0, 55.0], Trend::Stable, 3);
        let proposals = adapter().adapt(&eval, &profile(Level::Intermediate), &[]);
        assert_eq!(
            types(&proposals),
            vec![DecisionType::RemediationWeek, DecisionType::ProjectSwap]
        );
        let swap = &proposals[1];
        assert_eq!(swap.priority, Priority::High);
        assert!(swap.requires_approval);
        assert_eq!(swap.details["blockers"], 3);
    }

    #[test]
    fn test_cooldown_suppresses_duplicate_remediation() {
        let eval = evaluation(62.0, [75.0, 70.0, 65.0, 30.0], Trend::Stable, 0);
        let first = adapter().adapt(&eval, &profile(Level::Intermediate), &[]);
        assert_eq!(types(&first), vec![DecisionType::RemediationWeek]);

        // The remediation record sits at position K-1 of the recent history.
        let mut decisions = history(&[
            DecisionType::MonthReorder,
            DecisionType::MonthReorder,
            DecisionType::MonthReorder,
        ]);
        decisions.push(first[0].to_decision(now() - Duration::days(1)));
        decisions.extend(history(&[DecisionType::ProjectSwap]).into_iter().map(|d| d.at(now())));

        let second = adapter().adapt(&eval, &profile(Level::Intermediate), &decisions);
        assert!(second.is_empty());
    }

    #[test]
    fn test_cooldown_ages_out() {
        let eval = evaluation(35.0, [35.0, 35.0, 35.0, 35.0], Trend::Stable, 0);
        let mut decisions = history(&[DecisionType::LevelChange]);
        assert!(adapter().adapt(&eval, &profile(Level::Intermediate), &decisions).is_empty());

        for i in 0..4 {
            decisions.push(
                DecisionRecord::new(DecisionType::ProjectSwap, DecisionStatus::Rejected, "", serde_json::json!({}))
                    .at(now() - Duration::days(10) + Duration::hours(i)),
            );
        }
        assert!(adapter().adapt(&eval, &profile(Level::Intermediate), &decisions).is_empty());

        decisions.push(
            DecisionRecord::new(DecisionType::MonthReorder, DecisionStatus::Rejected, "", serde_json::json!({}))
                .at(now() - Duration::days(5)),
        );
        let proposals = adapter().adapt(&eval, &profile(Level::Intermediate), &decisions);
        assert_eq!(types(&proposals), vec![DecisionType::LevelChange]);
    }

    #[test]
    fn test_cooldown_window_is_configurable() {
        let eval = evaluation(35.0, [35.0, 35.0, 35.0, 35.0], Trend::Stable, 0);
        let decisions = history(&[DecisionType::LevelChange, DecisionType::ProjectSwap]);
        let config = AdapterConfig {
            cooldown_window: 1,
            ..AdapterConfig::default()
        };
        let proposals = Adapter::new(config).adapt(&eval, &profile(Level::Intermediate), &decisions);
        assert_eq!(types(&proposals), vec![DecisionType::LevelChange]);
    }

    #[test]
    fn test_deterministic_across_history_order() {
        let eval = evaluation(45.0, [40.0, 42.0, 60.0, 55.0], Trend::Stable, 4);
        let mut decisions = history(&[DecisionType::MonthReorder, DecisionType::LevelChange]);
        let first = adapter().adapt(&eval, &profile(Level::Intermediate), &decisions);
        decisions.reverse();
        let second = adapter().adapt(&eval, &profile(Level::Intermediate), &decisions);
        assert_eq!(first, second);
    }

    #[test]
    fn test_only_known_types_emitted() {
        let profile = profile(Level::Intermediate);
        let mut seen = std::collections::BTreeSet::new();
        for overall in (0..=100).step_by(5) {
            for blockers in [0, 5] {
                let s = overall as f64;
                let eval = evaluation(s, [s, s, s, s], Trend::Improving, blockers);
                let proposals = adapter().adapt(&eval, &profile, &[]);
                let kinds = types(&proposals);
                let mut sorted = kinds.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(kinds, sorted, "ordered and unique at overall {}", overall);
                seen.extend(kinds);
            }
        }
        assert!(seen.iter().all(|t| DecisionType::ALL.contains(t)));
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_to_decision_carries_details() {
        let eval = evaluation(35.0, [35.0, 35.0, 35.0, 35.0], Trend::Stable, 0);
        let proposal = adapter().adapt(&eval, &profile(Level::Intermediate), &[]).remove(0);
        let record = proposal.to_decision(now());
        assert_eq!(record.decision_type, DecisionType::LevelChange);
        assert_eq!(record.status, DecisionStatus::Proposed);
        assert_eq!(record.timestamp, now());
        assert_eq!(record.rationale, proposal.rationale);
        assert_eq!(record.details["to"], "beginner");
        assert_eq!(record.details["priority"], "high");
        assert_eq!(record.details["requires_approval"], true);
        assert_eq!(eval.status, Status::AtRisk);
    }
}
