//! Progress evaluation
//!
//! Turns the progress log into four dimension scores, a weighted overall
//! score, a status band and recommendations. Scoring is a pure function of
//! the profile, the log, already-collected external signals and `now`; the
//! evaluator never writes anything. Persisting a result is a separate,
//! explicit caller step (see [`EvaluationResult::to_progress_event`]).

pub mod signals;
pub mod window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::EvaluatorConfig;
use crate::error::{EngineError, Result};
use crate::memory::{MemorySnapshot, MemoryStore};
use crate::types::{timestamp, Dimension, Level, LearnerProfile, ProgressEvent, Scope, Status, Trend, NEUTRAL_SCORE};

pub use signals::{
    collect_signals, providers_from_config, DegradedSignal, ExternalSignals, GitCommitProvider,
    SignalKind, SignalProvider, SignalValue, TestReportProvider, TestTally,
};
use window::{count_tag, days_before, tally, trend, window_start, Timeline};

/// Tag of progress events that carry a persisted evaluation
pub const EVALUATION_EVENT: &str = "evaluation";

/// Window length used by every tally dimension under [`Scope::Month`]
const MONTH_SCOPE_DAYS: i64 = 30;

/// Intermediate values behind the scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSignals {
    pub scope: Scope,
    /// True when the log had nothing countable and every score is neutral
    pub neutral_default: bool,
    pub trend: Trend,
    /// Relative change in activity between the two velocity windows
    pub trend_change: f64,
    pub recent_events: usize,
    pub prior_events: usize,
    /// Qualifying events counted per tally dimension
    pub qualifying: BTreeMap<Dimension, usize>,
    /// Blocker events inside the quality window
    pub blockers: usize,
    pub commits: Option<u32>,
    pub test_pass_ratio: Option<f64>,
    /// Providers that fell back to their neutral contribution
    pub degraded: Vec<DegradedSignal>,
    /// Log lines skipped as malformed while loading
    pub skipped_log_lines: usize,
    /// Practices in the best-practices file
    pub best_practices: usize,
}

impl Default for EvaluationSignals {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            neutral_default: false,
            trend: Trend::Stable,
            trend_change: 0.0,
            recent_events: 0,
            prior_events: 0,
            qualifying: BTreeMap::new(),
            blockers: 0,
            commits: None,
            test_pass_ratio: None,
            degraded: Vec::new(),
            skipped_log_lines: 0,
            best_practices: 0,
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub learner_id: String,
    pub level: Level,
    /// Score per dimension, 0-100
    pub scores: BTreeMap<Dimension, f64>,
    pub weights: BTreeMap<Dimension, f64>,
    /// Weighted sum of the scores, 0-100
    pub overall: f64,
    pub status: Status,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub signals: EvaluationSignals,
}

impl EvaluationResult {
    /// Score of one dimension (neutral if absent)
    pub fn score(&self, dimension: Dimension) -> f64 {
        self.scores.get(&dimension).copied().unwrap_or(NEUTRAL_SCORE)
    }

    pub fn trend(&self) -> Trend {
        self.signals.trend
    }

    /// Equal in everything except the generation timestamp
    pub fn content_eq(&self, other: &EvaluationResult) -> bool {
        let aligned = EvaluationResult {
            timestamp: other.timestamp,
            ..self.clone()
        };
        aligned == *other
    }

    /// The `evaluation` event a caller appends to persist this result
    pub fn to_progress_event(&self) -> ProgressEvent {
        let mut event = ProgressEvent::new(
            EVALUATION_EVENT,
            Some(format!("Evaluation: {} ({:.1})", self.status, self.overall)),
        )
        .at(self.timestamp);
        event.metadata = serde_json::to_value(self).ok();
        event
    }

    /// Newest evaluation persisted in the progress log
    pub fn latest_in(events: &[ProgressEvent]) -> Option<EvaluationResult> {
        events
            .iter()
            .filter(|e| e.event == EVALUATION_EVENT)
            .filter_map(|e| serde_json::from_value::<EvaluationResult>(e.metadata.clone()?).ok())
            .max_by_key(|r| r.timestamp)
    }

    /// Load an evaluation from an explicitly named JSON file
    pub fn load_file(path: &Path) -> Result<EvaluationResult> {
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::InvalidInputFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| EngineError::InvalidInputFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_score(value: f64) -> f64 {
    round1(value.clamp(0.0, 100.0))
}

/// Scores progress logs against an [`EvaluatorConfig`]
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    scope: Scope,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            scope: Scope::default(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Lower bound of a tally window under the current scope
    fn tally_days(&self, configured: i64) -> Option<i64> {
        match self.scope {
            Scope::Week => Some(configured),
            Scope::Month => Some(MONTH_SCOPE_DAYS),
            Scope::Overall => None,
        }
    }

    /// Where external providers should start counting
    pub fn signal_window_start(&self, profile: &LearnerProfile, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, self.tally_days(self.config.quality.window_days)).unwrap_or_else(|| {
            profile
                .start_date
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc())
                .unwrap_or(now)
        })
    }

    /// Evaluate as of the current time
    pub fn evaluate(
        &self,
        profile: &LearnerProfile,
        events: &[ProgressEvent],
        external: &ExternalSignals,
    ) -> EvaluationResult {
        self.evaluate_at(profile, events, external, Utc::now())
    }

    /// Evaluate as of `now`
    pub fn evaluate_at(
        &self,
        profile: &LearnerProfile,
        events: &[ProgressEvent],
        external: &ExternalSignals,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        self.evaluate_with_practices(profile, events, 0, external, now)
    }

    /// Evaluate as of `now`, crediting `best_practices` captured practices to reflection
    pub fn evaluate_with_practices(
        &self,
        profile: &LearnerProfile,
        events: &[ProgressEvent],
        best_practices: usize,
        external: &ExternalSignals,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let cfg = &self.config;
        let timeline = Timeline::new(events, &cfg.ignored_tags, now);

        let mut signals = EvaluationSignals {
            scope: self.scope,
            best_practices,
            commits: external.commits,
            test_pass_ratio: external.test_results.and_then(|t| t.pass_ratio()),
            degraded: external.degraded.clone(),
            ..EvaluationSignals::default()
        };

        let scores: BTreeMap<Dimension, f64> = if timeline.is_empty() {
            debug!("No countable events, using neutral scores");
            signals.neutral_default = true;
            Dimension::ALL.iter().map(|d| (*d, NEUTRAL_SCORE)).collect()
        } else {
            self.score_dimensions(&timeline, now, &mut signals)
        };

        let overall = round1(
            Dimension::ALL
                .iter()
                .map(|d| scores[d] * cfg.weights.get(*d))
                .sum::<f64>()
                .clamp(0.0, 100.0),
        );
        let status = cfg.status_bands.classify(overall);

        let recommendations = if signals.neutral_default {
            Vec::new()
        } else {
            Dimension::ALL
                .iter()
                .filter(|d| scores[d] < cfg.recommendation_threshold)
                .map(|d| cfg.recommendations.for_dimension(*d).to_string())
                .collect()
        };

        info!(
            "Evaluated {}: overall {:.1} ({}), {} recommendation(s)",
            profile.learner_id,
            overall,
            status,
            recommendations.len()
        );

        EvaluationResult {
            timestamp: now,
            learner_id: profile.learner_id.clone(),
            level: profile.level,
            scores,
            weights: cfg.weights.as_map(),
            overall,
            status,
            recommendations,
            signals,
        }
    }

    fn score_dimensions(
        &self,
        timeline: &Timeline<'_>,
        now: DateTime<Utc>,
        signals: &mut EvaluationSignals,
    ) -> BTreeMap<Dimension, f64> {
        let cfg = &self.config;
        let mut scores = BTreeMap::new();

        let window = timeline.between(window_start(now, self.tally_days(cfg.completion.window_days)), now);
        let (points, matched) = tally(window, &cfg.completion.increments);
        signals.qualifying.insert(Dimension::Completion, matched);
        scores.insert(Dimension::Completion, clamp_score(cfg.completion.base + points));

        let window = timeline.between(window_start(now, self.tally_days(cfg.quality.window_days)), now);
        let (points, matched) = tally(window, &cfg.quality.increments);
        signals.qualifying.insert(Dimension::Quality, matched);
        signals.blockers = count_tag(window, &cfg.blocker_tag);
        let commit_points = signals
            .commits
            .map(|c| (c as f64 * cfg.quality.commit_increment).min(cfg.quality.commit_cap))
            .unwrap_or(cfg.quality.neutral_commit_contribution);
        let test_points = signals
            .test_pass_ratio
            .map(|r| r * cfg.quality.test_ratio_weight)
            .unwrap_or(cfg.quality.neutral_test_contribution);
        scores.insert(
            Dimension::Quality,
            clamp_score(cfg.quality.base + points + commit_points + test_points),
        );

        let window = timeline.between(window_start(now, self.tally_days(cfg.reflection.window_days)), now);
        let (points, matched) = tally(window, &cfg.reflection.increments);
        signals.qualifying.insert(Dimension::Reflection, matched);
        let practice_points =
            (signals.best_practices as f64 * cfg.reflection.practice_increment).min(cfg.reflection.practice_cap);
        scores.insert(
            Dimension::Reflection,
            clamp_score(cfg.reflection.base + points + practice_points),
        );

        // Velocity always compares two fixed adjacent windows.
        let days = cfg.velocity.window_days;
        let recent_start = days_before(now, days);
        let recent = timeline.between(recent_start, now).len();
        let prior = match recent_start {
            Some(start) => timeline.between(days_before(start, days), start).len(),
            None => 0,
        };
        let (direction, change) = trend(recent, prior, cfg.velocity.trend_tolerance);
        let bonus = match direction {
            Trend::Improving => cfg.velocity.improving_bonus,
            Trend::Stable => cfg.velocity.stable_bonus,
            Trend::Declining => cfg.velocity.declining_bonus,
        };
        signals.recent_events = recent;
        signals.prior_events = prior;
        signals.trend = direction;
        signals.trend_change = round1(change * 100.0) / 100.0;
        scores.insert(
            Dimension::Velocity,
            clamp_score(cfg.velocity.base + recent as f64 * cfg.velocity.per_event + bonus),
        );

        debug!(
            "Dimension scores: {:?}, trend {} ({} recent / {} prior)",
            scores, direction, recent, prior
        );
        scores
    }

    /// Evaluate a loaded snapshot, carrying its skipped-line and best-practice counts
    pub fn evaluate_snapshot(
        &self,
        snapshot: &MemorySnapshot,
        external: &ExternalSignals,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let mut result = self.evaluate_with_practices(
            &snapshot.profile,
            &snapshot.events,
            snapshot.best_practices,
            external,
            now,
        );
        result.signals.skipped_log_lines = snapshot.skipped_lines;
        result
    }

    /// Load the store and evaluate it as of now
    pub fn evaluate_store(&self, store: &MemoryStore, external: &ExternalSignals) -> Result<EvaluationResult> {
        let snapshot = store.snapshot()?;
        Ok(self.evaluate_snapshot(&snapshot, external, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

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
            goals: vec!["Ship a capstone".to_string()],
        }
    }

    fn ev(tag: &str, hours_ago: i64) -> ProgressEvent {
        ProgressEvent::new(tag, None).at(now() - Duration::hours(hours_ago))
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(EvaluatorConfig::default())
    }

    fn scenario_a() -> Vec<ProgressEvent> {
        let mut events: Vec<ProgressEvent> = (1..=6).map(|d| ev("task_completed", d * 20)).collect();
        events.push(ev("week_end", 2));
        events
    }

    #[test]
    fn test_empty_log_is_neutral() {
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &[], &ExternalSignals::none(), now());
        for dimension in Dimension::ALL {
            assert_eq!(result.score(dimension), NEUTRAL_SCORE);
        }
        assert_eq!(result.overall, 50.0);
        assert!(result.recommendations.is_empty());
        assert!(result.signals.neutral_default);
        assert_eq!(result.signals.trend, Trend::Stable);
    }

    #[test]
    fn test_only_evaluation_events_is_neutral() {
        let events = vec![ev(EVALUATION_EVENT, 3), ev(EVALUATION_EVENT, 30)];
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert!(result.signals.neutral_default);
        assert_eq!(result.overall, 50.0);
    }

    #[test]
    fn test_scenario_a_completion_week() {
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &scenario_a(), &ExternalSignals::none(), now());
        assert_eq!(result.score(Dimension::Completion), 98.0);
        assert_eq!(result.score(Dimension::Quality), 50.0);
        assert_eq!(result.score(Dimension::Velocity), 80.0);
        assert_eq!(result.score(Dimension::Reflection), 30.0);
        assert_eq!(result.overall, 67.9);
        assert_eq!(result.status, Status::OnTrack);
        assert_eq!(result.signals.trend, Trend::Improving);
        assert_eq!(result.signals.qualifying[&Dimension::Completion], 7);
        assert_eq!(
            result.recommendations,
            vec!["Run a retrospective to capture reflections and learnings".to_string()]
        );
    }

    #[test]
    fn test_completion_is_monotonic() {
        let evaluator = evaluator();
        let mut events = vec![ev("review", 30), ev("blocker", 50)];
        let mut previous = evaluator
            .evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now())
            .score(Dimension::Completion);
        for i in 0..12 {
            events.push(ev("task_completed", 1 + i * 10));
            let score = evaluator
                .evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now())
                .score(Dimension::Completion);
            assert!(score >= previous, "{} < {} after {} tasks", score, previous, i + 1);
            assert!(score <= 100.0);
            previous = score;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_first_event_not_below_neutral() {
        let result = evaluator().evaluate_at(
            &profile(Level::Beginner),
            &[ev("task_completed", 1)],
            &ExternalSignals::none(),
            now(),
        );
        assert!(result.score(Dimension::Completion) >= NEUTRAL_SCORE);
        assert!(result.score(Dimension::Velocity) >= NEUTRAL_SCORE);
    }

    #[test]
    fn test_deterministic() {
        let evaluator = evaluator();
        let events = scenario_a();
        let first = evaluator.evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        let second = evaluator.evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(first, second);

        let later = evaluator.evaluate_at(
            &profile(Level::Beginner),
            &events,
            &ExternalSignals::none(),
            now() + Duration::seconds(1),
        );
        assert!(first.content_eq(&later));
        assert_ne!(first.timestamp, later.timestamp);
    }

    #[test]
    fn test_out_of_order_log_scores_the_same() {
        let mut events = scenario_a();
        events.push(ev("review", 200));
        events.push(ev("journal_entry", 500));
        let sorted = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        events.reverse();
        let reversed = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(sorted, reversed);
    }

    #[test]
    fn test_events_outside_window_do_not_count() {
        let events = vec![ev("task_completed", 24 * 8), ev("task_completed", 24 * 20)];
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(result.score(Dimension::Completion), 42.0);
        assert_eq!(result.signals.recent_events, 1);
        assert_eq!(result.signals.prior_events, 1);
        assert_eq!(result.signals.trend, Trend::Stable);

        let overall = evaluator()
            .with_scope(Scope::Overall)
            .evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(overall.score(Dimension::Completion), 58.0);
    }

    #[test]
    fn test_declining_velocity() {
        let mut events: Vec<ProgressEvent> = (0..10).map(|i| ev("task_completed", 24 * 15 + i)).collect();
        events.push(ev("review", 24));
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(result.signals.trend, Trend::Declining);
        assert_eq!(result.score(Dimension::Velocity), 30.0);
    }

    #[test]
    fn test_external_signals_feed_quality() {
        let events = vec![ev("review", 5)];
        let evaluator = evaluator();
        let neutral = evaluator.evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(neutral.score(Dimension::Quality), 60.0);

        let degraded = ExternalSignals {
            degraded: vec![DegradedSignal {
                provider: "git:.".to_string(),
                reason: "timed out".to_string(),
            }],
            ..ExternalSignals::none()
        };
        let result = evaluator.evaluate_at(&profile(Level::Beginner), &events, &degraded, now());
        assert_eq!(result.score(Dimension::Quality), 60.0);
        assert_eq!(result.signals.degraded.len(), 1);

        let measured = ExternalSignals {
            commits: Some(2),
            test_results: Some(TestTally { passed: 1, failed: 1 }),
            degraded: Vec::new(),
        };
        let result = evaluator.evaluate_at(&profile(Level::Beginner), &events, &measured, now());
        assert_eq!(result.score(Dimension::Quality), 54.5);
        assert_eq!(result.signals.test_pass_ratio, Some(0.5));
    }

    #[test]
    fn test_best_practices_feed_reflection() {
        let evaluator = evaluator();
        let events = scenario_a();
        let external = ExternalSignals::none();

        let none = evaluator.evaluate_with_practices(&profile(Level::Beginner), &events, 0, &external, now());
        assert_eq!(none.score(Dimension::Reflection), 30.0);

        let three = evaluator.evaluate_with_practices(&profile(Level::Beginner), &events, 3, &external, now());
        assert_eq!(three.score(Dimension::Reflection), 45.0);
        assert_eq!(three.signals.best_practices, 3);
        assert!(three.overall > none.overall);

        // Capped at 40 points.
        let many = evaluator.evaluate_with_practices(&profile(Level::Beginner), &events, 20, &external, now());
        assert_eq!(many.score(Dimension::Reflection), 70.0);
    }

    #[test]
    fn test_best_practices_keep_empty_log_neutral() {
        let result =
            evaluator().evaluate_with_practices(&profile(Level::Beginner), &[], 4, &ExternalSignals::none(), now());
        assert!(result.signals.neutral_default);
        assert_eq!(result.score(Dimension::Reflection), NEUTRAL_SCORE);
        assert_eq!(result.signals.best_practices, 4);
    }

    #[test]
    fn test_huge_windows_do_not_panic() {
        let mut config = EvaluatorConfig::default();
        config.completion.window_days = 200_000_000;
        config.velocity.window_days = i64::MAX;
        let result = Evaluator::new(config).evaluate_at(
            &profile(Level::Beginner),
            &[ev("task_completed", 2), ev("task_completed", 24 * 400)],
            &ExternalSignals::none(),
            now(),
        );
        assert_eq!(result.signals.qualifying[&Dimension::Completion], 2);
        assert_eq!(result.signals.recent_events, 2);
        assert_eq!(result.signals.prior_events, 0);
    }

    #[test]
    fn test_blockers_counted() {
        let events = vec![ev("blocker", 2), ev("Blocker", 30), ev("blocker", 24 * 20)];
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert_eq!(result.signals.blockers, 2);
    }

    #[test]
    fn test_recommendations_in_dimension_order() {
        let events: Vec<ProgressEvent> = (0..2).map(|i| ev("blocker", 24 * 20 + i)).collect();
        let failing = ExternalSignals {
            commits: Some(0),
            test_results: Some(TestTally { passed: 0, failed: 3 }),
            degraded: Vec::new(),
        };
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &events, &failing, now());
        let config = EvaluatorConfig::default();
        assert_eq!(
            result.recommendations,
            vec![
                config.recommendations.completion.clone(),
                config.recommendations.quality.clone(),
                config.recommendations.velocity.clone(),
                config.recommendations.reflection.clone(),
            ]
        );
        assert_eq!(result.status, Status::AtRisk);
    }

    #[test]
    fn test_evaluation_event_round_trip() {
        let result = evaluator().evaluate_at(&profile(Level::Beginner), &scenario_a(), &ExternalSignals::none(), now());
        let event = result.to_progress_event();
        assert_eq!(event.event, EVALUATION_EVENT);
        assert_eq!(event.message.as_deref(), Some("Evaluation: on_track (67.9)"));

        let mut events = scenario_a();
        events.push(event);
        assert_eq!(EvaluationResult::latest_in(&events), Some(result.clone()));

        // Persisted evaluations do not change the next evaluation.
        let again = evaluator().evaluate_at(&profile(Level::Beginner), &events, &ExternalSignals::none(), now());
        assert!(again.content_eq(&result));
    }

    #[test]
    fn test_load_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = EvaluationResult::load_file(&dir.path().join("eval.json")).unwrap_err();
        assert!(matches!(missing, EngineError::InvalidInputFile { .. }));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(EvaluationResult::load_file(&path).is_err());
    }

    #[test]
    fn test_evaluate_store_without_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_dir(dir.path());
        let err = evaluator().evaluate_store(&store, &ExternalSignals::none()).unwrap_err();
        assert!(matches!(err, EngineError::ProfileNotFound { .. }));
    }
}
