//! Markdown rendering of tracker documents

use std::fmt::Write;

use super::{TrackerContent, TrackerDocument};
use crate::types::timestamp;

const FILLED: char = '█';
const EMPTY: char = '░';

/// Text bar for a 0-100 value, e.g. `[█████░░░░░]`
pub fn bar(value: f64, width: usize) -> String {
    let fraction = (value / 100.0).clamp(0.0, 1.0);
    let filled = ((fraction * width as f64).floor() as usize).min(width);
    let mut out = String::with_capacity(width * 3 + 2);
    out.push('[');
    out.extend(std::iter::repeat(FILLED).take(filled));
    out.extend(std::iter::repeat(EMPTY).take(width - filled));
    out.push(']');
    out
}

/// Escape a value for a Markdown table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn markdown(doc: &TrackerDocument) -> String {
    format!(
        "_Generated: {}_\n\n{}",
        timestamp::format(&doc.generated_at),
        body(&doc.content)
    )
}

// Writing into a String cannot fail, so `writeln!` results are ignored.
pub fn body(content: &TrackerContent) -> String {
    let mut out = String::new();

    let learner = &content.learner;
    let _ = writeln!(out, "# Learning Tracker\n");
    let _ = writeln!(out, "## Learner\n");
    let _ = writeln!(out, "- **ID**: {}", learner.id);
    let _ = writeln!(out, "- **Level**: {}", learner.level);
    let _ = writeln!(out, "- **Started**: {}", learner.start_date);
    let _ = writeln!(out, "- **Hours per week**: {}", learner.hours_per_week);
    if !learner.goals.is_empty() {
        let _ = writeln!(out, "- **Goals**:");
        for goal in &learner.goals {
            let _ = writeln!(out, "  - {}", goal);
        }
    }
    out.push('\n');

    let progress = &content.progress;
    let _ = writeln!(out, "## Overall Progress\n");
    let _ = writeln!(
        out,
        "Month {} of {}, week {} ({}% complete)\n",
        progress.current_month, progress.total_months, progress.current_week, progress.percent_complete
    );
    let _ = writeln!(out, "```\n{} {}%\n```\n", progress.bar, progress.percent_complete);

    let _ = writeln!(out, "## Current Status\n");
    match &content.evaluation {
        Some(eval) => {
            let _ = writeln!(
                out,
                "**{}** ({:.1}), evaluated {}\n",
                eval.status.label(),
                eval.overall,
                timestamp::format(&eval.evaluated_at)
            );
            let _ = writeln!(out, "```");
            for score in &eval.scores {
                let _ = writeln!(out, "{:<11} {} {:>5.1}", score.dimension.label(), score.bar, score.score);
            }
            let _ = writeln!(out, "```\n");
            if !eval.recommendations.is_empty() {
                let _ = writeln!(out, "### Next Actions\n");
                for rec in &eval.recommendations {
                    let _ = writeln!(out, "- [ ] {}", rec);
                }
                out.push('\n');
            }
        }
        None => {
            let _ = writeln!(out, "No evaluation yet.\n");
        }
    }

    let _ = writeln!(out, "## Monthly Milestones\n");
    let _ = writeln!(out, "| Month | Topic | Status | Events |");
    let _ = writeln!(out, "|-------|-------|--------|--------|");
    for month in &content.months {
        let _ = writeln!(
            out,
            "| {:02} | {} | {} | {} |",
            month.month,
            cell(&month.topic),
            month.status.label(),
            month.events
        );
    }
    out.push('\n');

    let activity = &content.activity;
    let _ = writeln!(out, "## Activity\n");
    let _ = writeln!(out, "- **Log entries**: {}", activity.log_entries);
    let _ = writeln!(out, "- **Completed tasks**: {}", activity.completed_tasks);
    if let Some(last) = &activity.last_activity {
        let _ = writeln!(out, "- **Last activity**: {}", last);
    }
    out.push('\n');

    let _ = writeln!(out, "## Pending Proposals\n");
    if content.pending.is_empty() {
        let _ = writeln!(out, "None.\n");
    } else {
        for pending in &content.pending {
            let approval = if pending.requires_approval {
                "requires approval"
            } else {
                "auto-approvable"
            };
            let priority = pending.priority.map(|p| format!("{}, ", p)).unwrap_or_default();
            let _ = writeln!(
                out,
                "- **{}** ({}{}): {}",
                pending.decision_type.label(),
                priority,
                approval,
                pending.rationale
            );
            if let Some(impact) = &pending.impact {
                let _ = writeln!(out, "  - Impact: {}", impact);
            }
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Recent Decisions\n");
    if content.recent_decisions.is_empty() {
        let _ = writeln!(out, "None.");
    } else {
        let _ = writeln!(out, "| Date | Type | Status | Rationale |");
        let _ = writeln!(out, "|------|------|--------|-----------|");
        for record in &content.recent_decisions {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                record.timestamp.format("%Y-%m-%d"),
                record.decision_type.label(),
                record.status,
                cell(&record.rationale)
            );
        }
    }

    out
}
