//! Threshold table: which proposal types an evaluation makes eligible
//!
//! Rules see only the evaluation, the profile and the configuration. The
//! decision history is applied afterwards by the cooldown filter.

use serde_json::json;

use super::AdaptationProposal;
use crate::config::AdapterConfig;
use crate::evaluator::EvaluationResult;
use crate::types::{DecisionType, Dimension, LearnerProfile, Priority, Trend};

/// Eligible proposals in declaration order, at most one per type
pub fn candidates(
    evaluation: &EvaluationResult,
    profile: &LearnerProfile,
    config: &AdapterConfig,
) -> Vec<AdaptationProposal> {
    let mut proposals = Vec::new();

    let level_change = level_change(evaluation, profile, config);
    let downgrading = level_change
        .as_ref()
        .is_some_and(|p| p.details.get("direction").and_then(|d| d.as_str()) == Some("downgrade"));
    proposals.extend(level_change);

    if !downgrading {
        proposals.extend(remediation_week(evaluation, profile, config));
    }
    proposals.extend(month_reorder(evaluation, profile, config));
    proposals.extend(project_swap(evaluation, profile, config));
    proposals
}

fn level_change(
    evaluation: &EvaluationResult,
    profile: &LearnerProfile,
    config: &AdapterConfig,
) -> Option<AdaptationProposal> {
    let overall = evaluation.overall;

    if overall < config.downgrade_below {
        let to = profile.level.lower()?;
        return Some(AdaptationProposal {
            proposal_type: DecisionType::LevelChange,
            rationale: format!(
                "Overall score ({:.1}) is below {:.1}; reducing scope may help rebuild momentum",
                overall, config.downgrade_below
            ),
            impact: format!("Level changes from {} to {}; remaining months use the narrower scope", profile.level, to),
            requires_approval: true,
            priority: Priority::High,
            details: json!({
                "direction": "downgrade",
                "from": profile.level,
                "to": to,
                "review_at_month": profile.current_month + 3,
            }),
        });
    }

    if overall >= config.upgrade_at_or_above && evaluation.trend() != Trend::Declining {
        let to = profile.level.higher()?;
        return Some(AdaptationProposal {
            proposal_type: DecisionType::LevelChange,
            rationale: format!(
                "Overall score ({:.1}) is at or above {:.1} with a {} trend",
                overall,
                config.upgrade_at_or_above,
                evaluation.trend()
            ),
            impact: format!("Level changes from {} to {}; remaining months use the wider scope", profile.level, to),
            requires_approval: true,
            priority: Priority::Medium,
            details: json!({
                "direction": "upgrade",
                "from": profile.level,
                "to": to,
                "review_at_month": profile.current_month + 3,
            }),
        });
    }

    None
}

fn remediation_week(
    evaluation: &EvaluationResult,
    profile: &LearnerProfile,
    config: &AdapterConfig,
) -> Option<AdaptationProposal> {
    let overall = evaluation.overall;
    let weak: Vec<Dimension> = Dimension::ALL
        .into_iter()
        .filter(|d| evaluation.score(*d) < config.weak_dimension_below)
        .collect();

    if weak.is_empty() && overall >= config.remediation_below {
        return None;
    }

    let (focus, rationale) = if weak.is_empty() {
        // Overall alone is low: focus on the weakest dimension, first on ties.
        let lowest = Dimension::ALL
            .into_iter()
            .fold(Dimension::Completion, |lowest, d| {
                if evaluation.score(d) < evaluation.score(lowest) {
                    d
                } else {
                    lowest
                }
            });
        (
            vec![lowest],
            format!(
                "Overall score ({:.1}) is below {:.1}; weakest dimension is {} ({:.1})",
                overall,
                config.remediation_below,
                lowest,
                evaluation.score(lowest)
            ),
        )
    } else {
        let parts: Vec<String> = weak
            .iter()
            .map(|d| format!("{} score ({:.1}) is below {:.1}", d.label(), evaluation.score(*d), config.weak_dimension_below))
            .collect();
        (weak.clone(), parts.join("; "))
    };

    let auto_approvable =
        config.auto_approve_remediation && weak.len() == 1 && overall >= config.auto_approve_min_overall;
    let priority = if auto_approvable {
        Priority::Low
    } else if overall < config.remediation_high_priority_below {
        Priority::High
    } else {
        Priority::Medium
    };

    let month = profile.current_month;
    Some(AdaptationProposal {
        proposal_type: DecisionType::RemediationWeek,
        rationale,
        impact: format!(
            "Extra week after week {} of month {:02}; month {:02} starts 1 week later",
            config.remediation_after_week,
            month,
            month + 1
        ),
        requires_approval: !auto_approvable,
        priority,
        details: json!({
            "focus": focus,
            "month": month,
            "insert_after_week": config.remediation_after_week,
        }),
    })
}

fn month_reorder(
    evaluation: &EvaluationResult,
    profile: &LearnerProfile,
    config: &AdapterConfig,
) -> Option<AdaptationProposal> {
    let quality = evaluation.score(Dimension::Quality);
    let velocity = evaluation.score(Dimension::Velocity);
    let eligible = evaluation.overall >= config.upgrade_at_or_above
        && quality >= config.reorder_min_quality
        && velocity >= config.reorder_min_velocity
        && evaluation.trend() != Trend::Declining;
    if !eligible {
        return None;
    }

    let (first, second) = (profile.current_month + 1, profile.current_month + 2);
    Some(AdaptationProposal {
        proposal_type: DecisionType::MonthReorder,
        rationale: format!(
            "Quality ({:.1}) and velocity ({:.1}) are strong; harder content could come sooner",
            quality, velocity
        ),
        impact: format!(
            "Months {:02} and {:02} swap order; content coverage is unchanged",
            first, second
        ),
        requires_approval: true,
        priority: Priority::Low,
        details: json!({ "swap": [first, second] }),
    })
}

fn project_swap(
    evaluation: &EvaluationResult,
    profile: &LearnerProfile,
    config: &AdapterConfig,
) -> Option<AdaptationProposal> {
    let quality = evaluation.score(Dimension::Quality);
    let completion = evaluation.score(Dimension::Completion);
    let blockers = evaluation.signals.blockers;
    let eligible = quality < config.swap_max_quality
        && completion < config.swap_max_completion
        && blockers >= config.swap_min_blockers;
    if !eligible {
        return None;
    }

    let month = profile.current_month;
    Some(AdaptationProposal {
        proposal_type: DecisionType::ProjectSwap,
        rationale: format!(
            "{} blockers recorded while quality ({:.1}) and completion ({:.1}) are low",
            blockers, quality, completion
        ),
        impact: format!(
            "Month {:02} project is replaced by an alternative covering the same skills",
            month
        ),
        requires_approval: true,
        priority: Priority::High,
        details: json!({
            "month": month,
            "blockers": blockers,
            "alternatives": [
                "Simplified version with reduced scope",
                "Alternative project focusing on same skills",
            ],
        }),
    })
}
