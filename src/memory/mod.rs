//! Memory store for the learner's persisted state
//!
//! Provides:
//! - The learner profile (single JSON object, read-only to the engine)
//! - The progress log (append-only JSON Lines)
//! - The decision log (append-only JSON Lines)
//! - Captured best practices (Markdown, one `### ` heading per practice)
//! - The regenerable tracker document
//!
//! The engine only reads and appends. Nothing here rewrites history.

pub mod jsonl;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::types::{DecisionRecord, LearnerProfile, ProgressEvent};

pub use jsonl::{append_jsonl, read_jsonl, write_atomic, LogRead, SkippedLine};

pub const PROFILE_FILE: &str = "learner_profile.json";
pub const PROGRESS_LOG_FILE: &str = "progress_log.jsonl";
pub const DECISIONS_LOG_FILE: &str = "decisions.jsonl";
pub const BEST_PRACTICES_FILE: &str = "best_practices.md";

/// Heading that opens one captured best practice
const PRACTICE_HEADING: &str = "### ";

/// Everything one evaluation cycle reads, loaded in one go
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    pub profile: LearnerProfile,
    pub events: Vec<ProgressEvent>,
    pub decisions: Vec<DecisionRecord>,
    /// Progress and decision log lines that could not be parsed
    pub skipped_lines: usize,
    /// Practices captured in the best-practices file
    pub best_practices: usize,
}

/// File-backed store rooted at a memory directory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    base_dir: PathBuf,
}

impl MemoryStore {
    /// Create a store over an existing or future memory directory
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn profile_path(&self) -> PathBuf {
        self.base_dir.join(PROFILE_FILE)
    }

    pub fn progress_log_path(&self) -> PathBuf {
        self.base_dir.join(PROGRESS_LOG_FILE)
    }

    pub fn decisions_log_path(&self) -> PathBuf {
        self.base_dir.join(DECISIONS_LOG_FILE)
    }

    pub fn best_practices_path(&self) -> PathBuf {
        self.base_dir.join(BEST_PRACTICES_FILE)
    }

    /// Load the learner profile
    pub fn load_profile(&self) -> Result<LearnerProfile> {
        let path = self.profile_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::ProfileNotFound { path });
            }
            Err(e) => {
                return Err(EngineError::InvalidInputFile {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        serde_json::from_str(&contents).map_err(|e| EngineError::InvalidInputFile {
            path,
            reason: e.to_string(),
        })
    }

    /// Read the progress log in append order
    pub fn load_events(&self) -> LogRead<ProgressEvent> {
        read_jsonl(&self.progress_log_path())
    }

    /// Read the decision log in append order
    pub fn load_decisions(&self) -> LogRead<DecisionRecord> {
        read_jsonl(&self.decisions_log_path())
    }

    /// Number of practices in the best-practices file.
    ///
    /// A missing file holds none. An unreadable one is logged and counts as none.
    pub fn best_practices_count(&self) -> usize {
        let path = self.best_practices_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .filter(|line| line.trim_start().starts_with(PRACTICE_HEADING))
                .count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                0
            }
        }
    }

    /// Load profile, both logs and the best-practice count
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let profile = self.load_profile()?;
        let events = self.load_events();
        let decisions = self.load_decisions();
        Ok(MemorySnapshot {
            profile,
            skipped_lines: events.skipped.len() + decisions.skipped.len(),
            events: events.entries,
            decisions: decisions.entries,
            best_practices: self.best_practices_count(),
        })
    }

    /// Append one progress event
    pub fn append_event(&self, event: &ProgressEvent) -> Result<()> {
        append_jsonl(&self.progress_log_path(), event)?;
        info!("Appended '{}' event to progress log", event.event);
        Ok(())
    }

    /// Append one decision record
    pub fn append_decision(&self, record: &DecisionRecord) -> Result<()> {
        append_jsonl(&self.decisions_log_path(), record)?;
        info!(
            "Appended {} decision ({}) to decision log",
            record.decision_type, record.status
        );
        Ok(())
    }

    /// Replace the tracker document
    pub fn write_tracker(&self, path: &Path, contents: &str) -> Result<()> {
        write_atomic(path, contents)?;
        info!("Tracker updated: {}", path.display());
        Ok(())
    }
}
