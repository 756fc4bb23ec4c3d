//! Path Engine - Learner Progress Evaluation Library
//!
//! Tracks one learner against a structured curriculum:
//! - Evaluator: scores completion, quality, velocity and reflection from the progress log
//! - Adapter: turns an evaluation into bounded curriculum-change proposals
//! - Reporter: renders the regenerable tracker document
//! - Memory store: profile, append-only progress and decision logs
//!
//! The engine is advisory. It reads and appends; it never edits the profile.
//!
//! # Example
//!
//! ```ignore
//! use path_engine::{Adapter, Config, Evaluator, ExternalSignals, MemoryStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let store = MemoryStore::with_dir(&config.paths.memory_dir);
//!     let snapshot = store.snapshot()?;
//!     let evaluation = Evaluator::new(config.evaluator.clone())
//!         .evaluate(&snapshot.profile, &snapshot.events, &ExternalSignals::none());
//!     let proposals = Adapter::new(config.adapter.clone())
//!         .adapt(&evaluation, &snapshot.profile, &snapshot.decisions);
//!     println!("{} ({} proposals)", evaluation.status, proposals.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod error;
pub mod config;
pub mod memory;

// Engine
pub mod evaluator;
pub mod adapter;
pub mod reporter;
pub mod cycle;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{
    DecisionRecord,
    DecisionStatus,
    DecisionType,
    Dimension,
    LearnerProfile,
    Level,
    Priority,
    ProgressEvent,
    Scope,
    Status,
    Trend,
    NEUTRAL_SCORE,
};

pub use error::EngineError;

pub use config::Config;

pub use memory::{MemorySnapshot, MemoryStore};

pub use evaluator::{
    EvaluationResult,
    Evaluator,
    ExternalSignals,
    SignalProvider,
};

pub use adapter::{AdaptationProposal, Adapter};

pub use reporter::{Reporter, TrackerDocument};

pub use cycle::{CycleStage, EvaluationCycle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Learner Progress Evaluation Library", NAME, VERSION)
}
