//! Configuration management
//!
//! Every threshold, weight and window the engine uses lives here, in one
//! immutable value passed explicitly into the evaluator and adapter. The file
//! format is TOML and every field has a default, so a partial file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::EngineError;
use crate::types::{Dimension, Status, NEUTRAL_SCORE};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the memory files live
    #[serde(default)]
    pub paths: PathsConfig,
    /// Scoring weights, windows and bands
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Proposal threshold table and cooldown
    #[serde(default)]
    pub adapter: AdapterConfig,
    /// External signal providers
    #[serde(default)]
    pub signals: SignalConfig,
    /// Tracker rendering
    #[serde(default)]
    pub reporter: ReporterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding learner_profile.json, progress_log.jsonl and decisions.jsonl
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    /// Tracker document, relative to the memory directory unless absolute
    #[serde(default = "default_tracker_file")]
    pub tracker_file: PathBuf,
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from(".claude/memory")
}

fn default_tracker_file() -> PathBuf {
    PathBuf::from("tracker.md")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            memory_dir: default_memory_dir(),
            tracker_file: default_tracker_file(),
        }
    }
}

impl PathsConfig {
    /// Resolved tracker path
    pub fn tracker_path(&self) -> PathBuf {
        if self.tracker_file.is_absolute() {
            self.tracker_file.clone()
        } else {
            self.memory_dir.join(&self.tracker_file)
        }
    }
}

/// Weight of each dimension in the overall score. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub completion: f64,
    pub quality: f64,
    pub velocity: f64,
    pub reflection: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            completion: 0.30,
            quality: 0.25,
            velocity: 0.25,
            reflection: 0.20,
        }
    }
}

impl Weights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Completion => self.completion,
            Dimension::Quality => self.quality,
            Dimension::Velocity => self.velocity,
            Dimension::Reflection => self.reflection,
        }
    }

    pub fn as_map(&self) -> BTreeMap<Dimension, f64> {
        Dimension::ALL.iter().map(|d| (*d, self.get(*d))).collect()
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

/// Lower bounds of the status bands. Anything below `needs_attention` is at risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBands {
    pub excellent: f64,
    pub on_track: f64,
    pub needs_attention: f64,
}

impl Default for StatusBands {
    fn default() -> Self {
        Self {
            excellent: 80.0,
            on_track: 60.0,
            needs_attention: 40.0,
        }
    }
}

impl StatusBands {
    pub fn classify(&self, overall: f64) -> Status {
        if overall >= self.excellent {
            Status::Excellent
        } else if overall >= self.on_track {
            Status::OnTrack
        } else if overall >= self.needs_attention {
            Status::NeedsAttention
        } else {
            Status::AtRisk
        }
    }
}

/// Longest scoring window accepted by [`Config::validate`]
pub const MAX_WINDOW_DAYS: i64 = 36_500;

fn increments(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(tag, inc)| (tag.to_string(), *inc)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub window_days: i64,
    pub base: f64,
    /// Points added per qualifying event, keyed by event tag
    pub increments: BTreeMap<String, f64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            base: 42.0,
            increments: increments(&[
                ("task_completed", 8.0),
                ("week_end", 8.0),
                ("week_completed", 8.0),
                ("milestone", 12.0),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub window_days: i64,
    pub base: f64,
    pub increments: BTreeMap<String, f64>,
    /// Points per commit reported by the git provider
    pub commit_increment: f64,
    /// Ceiling of the commit contribution
    pub commit_cap: f64,
    /// Commit contribution when the provider is absent or degraded
    pub neutral_commit_contribution: f64,
    /// Points for a 100% test pass ratio
    pub test_ratio_weight: f64,
    /// Test contribution when the provider is absent or degraded
    pub neutral_test_contribution: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            base: 40.0,
            increments: increments(&[
                ("review", 10.0),
                ("tests_passed", 10.0),
                ("test", 10.0),
                ("harden", 10.0),
                ("publish", 10.0),
            ]),
            commit_increment: 1.0,
            commit_cap: 5.0,
            neutral_commit_contribution: 5.0,
            test_ratio_weight: 5.0,
            neutral_test_contribution: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Length of each of the two adjacent windows
    pub window_days: i64,
    pub base: f64,
    pub per_event: f64,
    pub improving_bonus: f64,
    pub stable_bonus: f64,
    pub declining_bonus: f64,
    /// Relative change below which the trend counts as stable
    pub trend_tolerance: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            base: 25.0,
            per_event: 5.0,
            improving_bonus: 20.0,
            stable_bonus: 10.0,
            declining_bonus: 0.0,
            trend_tolerance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    pub window_days: i64,
    pub base: f64,
    pub increments: BTreeMap<String, f64>,
    /// Points per practice in the best-practices file
    pub practice_increment: f64,
    /// Ceiling of the best-practice contribution
    pub practice_cap: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            base: 30.0,
            increments: increments(&[
                ("retrospective", 20.0),
                ("journal_entry", 20.0),
                ("best_practice", 20.0),
                ("reflection", 20.0),
            ]),
            practice_increment: 5.0,
            practice_cap: 40.0,
        }
    }
}

/// One recommendation per dimension, emitted when that dimension is low
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationText {
    pub completion: String,
    pub quality: String,
    pub velocity: String,
    pub reflection: String,
}

impl Default for RecommendationText {
    fn default() -> Self {
        Self {
            completion: "Focus on completing planned tasks before adding new ones".to_string(),
            quality: "Run a hardening pass on recent work to improve quality signals".to_string(),
            velocity: "Check for blockers and re-plan the week to restore momentum".to_string(),
            reflection: "Run a retrospective to capture reflections and learnings".to_string(),
        }
    }
}

impl RecommendationText {
    pub fn for_dimension(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Completion => &self.completion,
            Dimension::Quality => &self.quality,
            Dimension::Velocity => &self.velocity,
            Dimension::Reflection => &self.reflection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub status_bands: StatusBands,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub velocity: VelocityConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// A dimension strictly below this gets its recommendation
    #[serde(default = "default_recommendation_threshold")]
    pub recommendation_threshold: f64,
    #[serde(default)]
    pub recommendations: RecommendationText,
    /// Tags never counted by any window (engine-generated events)
    #[serde(default = "default_ignored_tags")]
    pub ignored_tags: Vec<String>,
    /// Tag counted into `signals.blockers`
    #[serde(default = "default_blocker_tag")]
    pub blocker_tag: String,
}

fn default_recommendation_threshold() -> f64 {
    50.0
}

fn default_ignored_tags() -> Vec<String> {
    vec![crate::evaluator::EVALUATION_EVENT.to_string()]
}

fn default_blocker_tag() -> String {
    "blocker".to_string()
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            status_bands: StatusBands::default(),
            completion: CompletionConfig::default(),
            quality: QualityConfig::default(),
            velocity: VelocityConfig::default(),
            reflection: ReflectionConfig::default(),
            recommendation_threshold: default_recommendation_threshold(),
            recommendations: RecommendationText::default(),
            ignored_tags: default_ignored_tags(),
            blocker_tag: default_blocker_tag(),
        }
    }
}

/// Threshold table the adapter applies to an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Overall below this proposes a level downgrade
    pub downgrade_below: f64,
    /// Overall below this proposes a remediation week
    pub remediation_below: f64,
    /// Overall at or above this (with a non-declining trend) proposes an upgrade
    pub upgrade_at_or_above: f64,
    /// A dimension below this is weak
    pub weak_dimension_below: f64,
    pub reorder_min_quality: f64,
    pub reorder_min_velocity: f64,
    pub swap_max_quality: f64,
    pub swap_max_completion: f64,
    pub swap_min_blockers: usize,
    /// Number of most recent decision records scanned for a same-type record
    pub cooldown_window: usize,
    /// Allow single-dimension remediation weeks to skip approval
    pub auto_approve_remediation: bool,
    /// Overall required for a remediation week to be auto-approvable
    pub auto_approve_min_overall: f64,
    /// Remediation weeks below this overall are high priority
    pub remediation_high_priority_below: f64,
    /// Week after which a remediation week is inserted
    pub remediation_after_week: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            downgrade_below: 40.0,
            remediation_below: 60.0,
            upgrade_at_or_above: 90.0,
            weak_dimension_below: 50.0,
            reorder_min_quality: 85.0,
            reorder_min_velocity: 85.0,
            swap_max_quality: 50.0,
            swap_max_completion: 50.0,
            swap_min_blockers: 3,
            cooldown_window: 5,
            auto_approve_remediation: true,
            auto_approve_min_overall: 50.0,
            remediation_high_priority_below: 50.0,
            remediation_after_week: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Per-provider timeout
    #[serde(default = "default_signal_timeout")]
    pub timeout_ms: u64,
    /// Repository whose commit history feeds the quality dimension
    #[serde(default)]
    pub git_repo: Option<PathBuf>,
    /// JSON file with `{"passed": n, "failed": m}`
    #[serde(default)]
    pub test_report: Option<PathBuf>,
}

fn default_signal_timeout() -> u64 {
    2000
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_signal_timeout(),
            git_repo: None,
            test_report: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    #[serde(default = "default_total_months")]
    pub total_months: u32,
    /// Topic per month, month 1 first
    #[serde(default = "default_month_topics")]
    pub month_topics: Vec<String>,
    /// Number of decision records listed in the tracker
    #[serde(default = "default_recent_decisions")]
    pub recent_decisions: usize,
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
}

fn default_total_months() -> u32 {
    12
}

fn default_month_topics() -> Vec<String> {
    [
        "Foundations & Setup",
        "Data Engineering",
        "ML Fundamentals",
        "Deep Learning",
        "NLP & LLMs",
        "Computer Vision",
        "MLOps & Deployment",
        "System Design",
        "Evaluation & Testing",
        "Advanced Topics",
        "Capstone Project",
        "Portfolio & Career",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_recent_decisions() -> usize {
    5
}

fn default_bar_width() -> usize {
    20
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            total_months: default_total_months(),
            month_topics: default_month_topics(),
            recent_decisions: default_recent_decisions(),
            bar_width: default_bar_width(),
        }
    }
}

fn min_increment(increments: &BTreeMap<String, f64>) -> Option<f64> {
    increments.values().copied().fold(None, |acc, v| match acc {
        Some(m) if m <= v => Some(m),
        _ => Some(v),
    })
}

impl Config {
    /// Load configuration.
    ///
    /// An explicitly named file must exist and parse. Without one, the
    /// platform default location is used if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(EngineError::InvalidInputFile {
                        path: path.to_path_buf(),
                        reason: "file does not exist".to_string(),
                    }
                    .into());
                }
                Self::load_from(path)?
            }
            None => match config_path() {
                Ok(path) if path.exists() => Self::load_from(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Config::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating it
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents).map_err(|e| EngineError::InvalidInputFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject a configuration the engine cannot score with
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let ev = &self.evaluator;

        for dimension in Dimension::ALL {
            if ev.weights.get(dimension) < 0.0 {
                return Err(EngineError::Config(format!("weight for {} is negative", dimension)));
            }
        }
        let total = ev.weights.total();
        if (total - 1.0).abs() > 0.001 {
            return Err(EngineError::Config(format!("weights sum to {:.3}, expected 1.0", total)));
        }

        let bands = &ev.status_bands;
        if !(bands.excellent > bands.on_track && bands.on_track > bands.needs_attention) {
            return Err(EngineError::Config(
                "status bands must be strictly descending: excellent > on_track > needs_attention".to_string(),
            ));
        }

        for (name, days) in [
            ("completion", ev.completion.window_days),
            ("quality", ev.quality.window_days),
            ("velocity", ev.velocity.window_days),
            ("reflection", ev.reflection.window_days),
        ] {
            if days < 1 {
                return Err(EngineError::Config(format!("{} window must be at least one day", name)));
            }
            if days > MAX_WINDOW_DAYS {
                return Err(EngineError::Config(format!(
                    "{} window must be at most {} days",
                    name, MAX_WINDOW_DAYS
                )));
            }
        }

        // Contributions only ever add, so more activity never lowers a score.
        for (name, increments) in [
            ("completion", &ev.completion.increments),
            ("quality", &ev.quality.increments),
            ("reflection", &ev.reflection.increments),
        ] {
            if let Some((tag, inc)) = increments.iter().find(|(_, inc)| **inc < 0.0) {
                return Err(EngineError::Config(format!(
                    "{} increment for '{}' is negative ({})",
                    name, tag, inc
                )));
            }
        }
        for (name, value) in [
            ("quality.commit_increment", ev.quality.commit_increment),
            ("quality.commit_cap", ev.quality.commit_cap),
            ("quality.test_ratio_weight", ev.quality.test_ratio_weight),
            ("velocity.per_event", ev.velocity.per_event),
            ("reflection.practice_increment", ev.reflection.practice_increment),
            ("reflection.practice_cap", ev.reflection.practice_cap),
        ] {
            if value < 0.0 {
                return Err(EngineError::Config(format!("{} is negative ({})", name, value)));
            }
        }
        let vel = &ev.velocity;
        if !(vel.declining_bonus <= vel.stable_bonus && vel.stable_bonus <= vel.improving_bonus) {
            return Err(EngineError::Config(
                "velocity bonuses must satisfy declining <= stable <= improving".to_string(),
            ));
        }

        // The first qualifying event must never score below an empty log.
        let floors = [
            ("completion", min_increment(&ev.completion.increments).map(|inc| ev.completion.base + inc)),
            (
                "quality",
                min_increment(&ev.quality.increments).map(|inc| {
                    ev.quality.base
                        + inc
                        + ev.quality.neutral_commit_contribution
                        + ev.quality.neutral_test_contribution
                }),
            ),
            ("reflection", min_increment(&ev.reflection.increments).map(|inc| ev.reflection.base + inc)),
            (
                "velocity",
                Some(ev.velocity.base + ev.velocity.per_event + ev.velocity.improving_bonus),
            ),
        ];
        for (name, floor) in floors {
            if let Some(floor) = floor {
                if floor < NEUTRAL_SCORE {
                    return Err(EngineError::Config(format!(
                        "{} scores {:.1} for its first event, below the neutral {:.0}",
                        name, floor, NEUTRAL_SCORE
                    )));
                }
            }
        }

        let ad = &self.adapter;
        if !(ad.downgrade_below <= ad.remediation_below && ad.remediation_below <= ad.upgrade_at_or_above) {
            return Err(EngineError::Config(
                "adapter thresholds must satisfy downgrade_below <= remediation_below <= upgrade_at_or_above".to_string(),
            ));
        }
        if ad.cooldown_window == 0 {
            return Err(EngineError::Config("cooldown_window must be at least 1".to_string()));
        }

        if self.reporter.bar_width == 0 {
            return Err(EngineError::Config("bar_width must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Get the default configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "path-engine", "path-engine")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
