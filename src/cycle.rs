//! One evaluation cycle
//!
//! `Idle -> Evaluated -> ProposalsGenerated -> DecisionRecorded -> Idle`.
//! Each arrow is an explicit method call and nothing fires on its own.
//! Persisting the evaluation or the proposals is a separate call again, so a
//! dry run simply skips those steps.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::adapter::{AdaptationProposal, Adapter};
use crate::config::Config;
use crate::evaluator::{collect_signals, providers_from_config, EvaluationResult, Evaluator, ExternalSignals};
use crate::memory::{MemorySnapshot, MemoryStore};
use crate::reporter::{Reporter, TrackerDocument};
use crate::types::{DecisionRecord, DecisionStatus, DecisionType, Scope};

/// Where a cycle currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Evaluated,
    ProposalsGenerated,
    DecisionRecorded,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Idle => write!(f, "idle"),
            CycleStage::Evaluated => write!(f, "evaluated"),
            CycleStage::ProposalsGenerated => write!(f, "proposals generated"),
            CycleStage::DecisionRecorded => write!(f, "decision recorded"),
        }
    }
}

/// State of one evaluate -> adapt -> report pass over a memory store
pub struct EvaluationCycle {
    store: MemoryStore,
    config: Config,
    snapshot: MemorySnapshot,
    stage: CycleStage,
    evaluation: Option<EvaluationResult>,
    proposals: Vec<AdaptationProposal>,
    evaluation_persisted: bool,
    proposals_persisted: bool,
}

impl EvaluationCycle {
    /// Load the store. Fails when the profile is missing or unreadable.
    pub fn load(store: MemoryStore, config: Config) -> Result<Self> {
        let snapshot = store
            .snapshot()
            .with_context(|| format!("Failed to load memory from {}", store.base_dir().display()))?;
        info!(
            "Loaded {} events and {} decisions for {}",
            snapshot.events.len(),
            snapshot.decisions.len(),
            snapshot.profile.learner_id
        );
        Ok(Self {
            store,
            config,
            snapshot,
            stage: CycleStage::Idle,
            evaluation: None,
            proposals: Vec::new(),
            evaluation_persisted: false,
            proposals_persisted: false,
        })
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn snapshot(&self) -> &MemorySnapshot {
        &self.snapshot
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn proposals(&self) -> &[AdaptationProposal] {
        &self.proposals
    }

    fn expect_stage(&self, allowed: &[CycleStage], action: &str) -> Result<()> {
        if !allowed.contains(&self.stage) {
            bail!("Cannot {} while the cycle is {}", action, self.stage);
        }
        Ok(())
    }

    /// Collect external signals, then evaluate as of now
    pub async fn evaluate(&mut self, scope: Scope) -> Result<&EvaluationResult> {
        self.expect_stage(&[CycleStage::Idle], "evaluate")?;
        let now = Utc::now();
        let evaluator = Evaluator::new(self.config.evaluator.clone()).with_scope(scope);
        let providers = providers_from_config(&self.config.signals);
        let external = collect_signals(
            &providers,
            Duration::from_millis(self.config.signals.timeout_ms),
            evaluator.signal_window_start(&self.snapshot.profile, now),
        )
        .await;
        self.evaluate_with(scope, &external, now)
    }

    /// Evaluate with signals that were already collected
    pub fn evaluate_with(
        &mut self,
        scope: Scope,
        external: &ExternalSignals,
        now: DateTime<Utc>,
    ) -> Result<&EvaluationResult> {
        self.expect_stage(&[CycleStage::Idle], "evaluate")?;
        let evaluator = Evaluator::new(self.config.evaluator.clone()).with_scope(scope);
        let result = evaluator.evaluate_snapshot(&self.snapshot, external, now);
        self.stage = CycleStage::Evaluated;
        self.evaluation_persisted = false;
        Ok(&*self.evaluation.insert(result))
    }

    /// Start from an evaluation produced elsewhere (e.g. a saved file)
    pub fn use_evaluation(&mut self, evaluation: EvaluationResult) -> Result<&EvaluationResult> {
        self.expect_stage(&[CycleStage::Idle], "load an evaluation")?;
        self.stage = CycleStage::Evaluated;
        self.evaluation_persisted = false;
        Ok(&*self.evaluation.insert(evaluation))
    }

    /// Append the evaluation to the progress log as an `evaluation` event.
    /// Only once per evaluation.
    pub fn persist_evaluation(&mut self) -> Result<()> {
        let Some(evaluation) = &self.evaluation else {
            bail!("Cannot persist an evaluation while the cycle is {}", self.stage);
        };
        if self.evaluation_persisted {
            bail!("This cycle's evaluation is already saved");
        }
        let event = evaluation.to_progress_event();
        self.store.append_event(&event).context("Failed to save evaluation")?;
        self.snapshot.events.push(event);
        self.evaluation_persisted = true;
        Ok(())
    }

    /// Run the adapter over the current evaluation
    pub fn adapt(&mut self) -> Result<&[AdaptationProposal]> {
        self.expect_stage(&[CycleStage::Evaluated], "adapt")?;
        let Some(evaluation) = &self.evaluation else {
            bail!("Cannot adapt without an evaluation");
        };
        let adapter = Adapter::new(self.config.adapter.clone());
        self.proposals = adapter.adapt(evaluation, &self.snapshot.profile, &self.snapshot.decisions);
        self.stage = CycleStage::ProposalsGenerated;
        self.proposals_persisted = false;
        Ok(&self.proposals)
    }

    /// Append every proposal to the decision log with status `proposed`.
    /// Only once per set of proposals.
    pub fn persist_proposals(&mut self, now: DateTime<Utc>) -> Result<Vec<DecisionRecord>> {
        self.expect_stage(&[CycleStage::ProposalsGenerated], "persist proposals")?;
        if self.proposals_persisted {
            bail!("This cycle's proposals are already saved");
        }
        let mut records = Vec::with_capacity(self.proposals.len());
        for proposal in &self.proposals {
            let record = proposal.to_decision(now);
            self.store.append_decision(&record).context("Failed to save proposal")?;
            records.push(record);
        }
        self.snapshot.decisions.extend(records.iter().cloned());
        self.proposals_persisted = true;
        Ok(records)
    }

    /// The external approval step: record a decision on a proposal type
    pub fn record_decision(
        &mut self,
        decision_type: DecisionType,
        status: DecisionStatus,
        rationale: &str,
        details: serde_json::Value,
    ) -> Result<DecisionRecord> {
        self.expect_stage(&[CycleStage::ProposalsGenerated], "record a decision")?;
        let record = record_decision(&self.store, decision_type, status, rationale, details)?;
        self.snapshot.decisions.push(record.clone());
        self.stage = CycleStage::DecisionRecorded;
        Ok(record)
    }

    /// Close the cycle after a recorded decision
    pub fn finish(&mut self) -> Result<()> {
        self.expect_stage(&[CycleStage::DecisionRecorded], "finish")?;
        self.evaluation = None;
        self.proposals.clear();
        self.evaluation_persisted = false;
        self.proposals_persisted = false;
        self.stage = CycleStage::Idle;
        Ok(())
    }

    /// This cycle's evaluation, else the newest one persisted in the log
    pub fn latest_evaluation(&self) -> Option<EvaluationResult> {
        self.evaluation
            .clone()
            .or_else(|| EvaluationResult::latest_in(&self.snapshot.events))
    }

    /// Build the tracker from the current state. Valid at any stage.
    pub fn report(&self) -> TrackerDocument {
        let evaluation = self.latest_evaluation();
        Reporter::new(self.config.reporter.clone()).report(
            &self.snapshot.profile,
            &self.snapshot.events,
            &self.snapshot.decisions,
            evaluation.as_ref(),
            &self.proposals,
        )
    }

    /// Write the tracker Markdown to the configured path
    pub fn write_tracker(&self, document: &TrackerDocument) -> Result<PathBuf> {
        let path = self.config.paths.tracker_path();
        self.store
            .write_tracker(&path, &document.render_markdown())
            .context("Failed to update tracker")?;
        Ok(path)
    }
}

/// Append a decision record, the approval action taken outside the engine
pub fn record_decision(
    store: &MemoryStore,
    decision_type: DecisionType,
    status: DecisionStatus,
    rationale: &str,
    details: serde_json::Value,
) -> Result<DecisionRecord> {
    let record = DecisionRecord::new(decision_type, status, rationale, details);
    store.append_decision(&record).context("Failed to record decision")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PROFILE_FILE;
    use chrono::TimeZone;

    fn setup() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROFILE_FILE),
            r#"{"learner_id":"l-7","level":"intermediate","start_date":"2026-01-05","current_month":3,"current_week":1}"#,
        )
        .unwrap();
        let store = MemoryStore::with_dir(dir.path());
        (dir, store)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_profile_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EvaluationCycle::load(MemoryStore::with_dir(dir.path()), Config::default()).is_err());
    }

    #[test]
    fn test_out_of_order_calls_fail() {
        let (_dir, store) = setup();
        let mut cycle = EvaluationCycle::load(store, Config::default()).unwrap();
        assert!(cycle.adapt().is_err());
        assert!(cycle.persist_proposals(now()).is_err());
        assert!(cycle.persist_evaluation().is_err());
        assert!(cycle
            .record_decision(DecisionType::LevelChange, DecisionStatus::Approved, "ok", serde_json::json!({}))
            .is_err());
        assert!(cycle.finish().is_err());
        assert_eq!(cycle.stage(), CycleStage::Idle);

        cycle.evaluate_with(Scope::Week, &ExternalSignals::none(), now()).unwrap();
        assert!(cycle.evaluate_with(Scope::Week, &ExternalSignals::none(), now()).is_err());
    }

    #[test]
    fn test_full_cycle() {
        let (_dir, store) = setup();
        let mut cycle = EvaluationCycle::load(store.clone(), Config::default()).unwrap();

        let evaluation = cycle.evaluate_with(Scope::Week, &ExternalSignals::none(), now()).unwrap().clone();
        assert_eq!(evaluation.overall, 50.0);
        cycle.persist_evaluation().unwrap();
        assert_eq!(store.load_events().entries.len(), 1);

        // Neutral 50 is below the remediation line.
        let proposals = cycle.adapt().unwrap().to_vec();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposal_type, DecisionType::RemediationWeek);
        assert_eq!(cycle.stage(), CycleStage::ProposalsGenerated);

        let records = cycle.persist_proposals(now()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.load_decisions().entries.len(), 1);

        let doc = cycle.report();
        assert_eq!(doc.content.pending.len(), 1);
        assert!(doc.content.evaluation.is_some());

        cycle
            .record_decision(
                DecisionType::RemediationWeek,
                DecisionStatus::Approved,
                "Learner agreed",
                serde_json::json!({}),
            )
            .unwrap();
        assert_eq!(cycle.stage(), CycleStage::DecisionRecorded);
        cycle.finish().unwrap();
        assert_eq!(cycle.stage(), CycleStage::Idle);
        assert_eq!(store.load_decisions().entries.len(), 2);

        // The persisted evaluation is picked up by a fresh cycle.
        let reloaded = EvaluationCycle::load(store, Config::default()).unwrap();
        assert_eq!(reloaded.latest_evaluation(), Some(evaluation));
        assert!(reloaded.report().content.pending.is_empty());
    }

    #[test]
    fn test_persisting_twice_fails() {
        let (_dir, store) = setup();
        let mut cycle = EvaluationCycle::load(store.clone(), Config::default()).unwrap();

        cycle.evaluate_with(Scope::Week, &ExternalSignals::none(), now()).unwrap();
        cycle.persist_evaluation().unwrap();
        assert!(cycle.persist_evaluation().is_err());
        assert_eq!(store.load_events().entries.len(), 1);

        assert_eq!(cycle.adapt().unwrap().len(), 1);
        cycle.persist_proposals(now()).unwrap();
        assert!(cycle.persist_proposals(now()).is_err());
        assert_eq!(store.load_decisions().entries.len(), 1);
        assert_eq!(cycle.snapshot().decisions.len(), 1);
    }

    #[test]
    fn test_write_tracker() {
        let (dir, store) = setup();
        let mut config = Config::default();
        config.paths.memory_dir = dir.path().to_path_buf();
        let cycle = EvaluationCycle::load(store, config).unwrap();
        let doc = cycle.report();
        let path = cycle.write_tracker(&doc).unwrap();
        assert_eq!(path, dir.path().join("tracker.md"));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("_Generated: "));
        assert!(written.ends_with(&doc.render_body()));
    }
}
