//! External quality signals
//!
//! Providers read version-control history or test results. Each call is
//! bounded by a timeout; a provider that times out, errors, or answers with
//! the wrong kind of value is recorded as degraded and its contribution falls
//! back to the neutral default. Collection never fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SignalConfig;
use crate::error::EngineError;

/// What a provider measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Commits,
    TestResults,
}

/// A provider's answer
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Commits(u32),
    TestResults { passed: u32, failed: u32 },
}

/// Source of an external quality signal
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Name used in logs and in degraded-signal reports
    fn name(&self) -> String;

    fn kind(&self) -> SignalKind;

    /// Measure activity since `since`
    async fn fetch(&self, since: DateTime<Utc>) -> Result<SignalValue>;
}

/// Pass/fail counts from a test run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestTally {
    pub passed: u32,
    pub failed: u32,
}

impl TestTally {
    /// Fraction of passing tests, `None` for an empty run
    pub fn pass_ratio(&self) -> Option<f64> {
        let total = self.passed as f64 + self.failed as f64;
        if total == 0.0 {
            None
        } else {
            Some(self.passed as f64 / total)
        }
    }
}

/// A provider whose value was replaced by the neutral default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedSignal {
    pub provider: String,
    pub reason: String,
}

/// Collected external signals for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignals {
    #[serde(default)]
    pub commits: Option<u32>,
    #[serde(default)]
    pub test_results: Option<TestTally>,
    #[serde(default)]
    pub degraded: Vec<DegradedSignal>,
}

impl ExternalSignals {
    /// No providers configured
    pub fn none() -> Self {
        Self::default()
    }

    fn degrade(&mut self, provider: String, reason: String) {
        warn!("Signal provider '{}' degraded to neutral: {}", provider, reason);
        self.degraded.push(DegradedSignal { provider, reason });
    }
}

/// Run every provider concurrently, each bounded by `timeout`.
///
/// Results are folded in provider order, so the outcome does not depend on
/// which provider finishes first.
pub async fn collect_signals(
    providers: &[Box<dyn SignalProvider>],
    timeout: Duration,
    since: DateTime<Utc>,
) -> ExternalSignals {
    let pending = providers.iter().map(|provider| async move {
        let outcome = tokio::time::timeout(timeout, provider.fetch(since)).await;
        (provider, outcome)
    });
    let outcomes = join_all(pending).await;

    let mut signals = ExternalSignals::none();
    for (provider, outcome) in outcomes {
        let name = provider.name();
        match outcome {
            Ok(Ok(value)) => match (provider.kind(), value) {
                (SignalKind::Commits, SignalValue::Commits(count)) => {
                    debug!("{} reported {} commits", name, count);
                    signals.commits = Some(signals.commits.unwrap_or(0).saturating_add(count));
                }
                (SignalKind::TestResults, SignalValue::TestResults { passed, failed }) => {
                    debug!("{} reported {} passed / {} failed", name, passed, failed);
                    let tally = signals.test_results.get_or_insert_with(TestTally::default);
                    tally.passed = tally.passed.saturating_add(passed);
                    tally.failed = tally.failed.saturating_add(failed);
                }
                (kind, value) => {
                    signals.degrade(name, format!("returned {:?} for a {:?} signal", value, kind));
                }
            },
            Ok(Err(e)) => signals.degrade(name, format!("{:#}", e)),
            Err(_) => {
                let err = EngineError::ExternalSignalTimeout {
                    provider: name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                signals.degrade(name, err.to_string());
            }
        }
    }
    signals
}

/// Commit count from `git rev-list`
pub struct GitCommitProvider {
    repo: PathBuf,
}

impl GitCommitProvider {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }
}

#[async_trait]
impl SignalProvider for GitCommitProvider {
    fn name(&self) -> String {
        format!("git:{}", self.repo.display())
    }

    fn kind(&self) -> SignalKind {
        SignalKind::Commits
    }

    async fn fetch(&self, since: DateTime<Utc>) -> Result<SignalValue> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .arg("rev-list")
            .arg("--count")
            .arg(format!("--since={}", since.to_rfc3339()))
            .arg("HEAD")
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run git")?;

        if !output.status.success() {
            anyhow::bail!(
                "git rev-list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let count = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u32>()
            .context("Unexpected git rev-list output")?;
        Ok(SignalValue::Commits(count))
    }
}

/// Pass/fail counts from a JSON test report: `{"passed": n, "failed": m}`
pub struct TestReportProvider {
    path: PathBuf,
}

impl TestReportProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SignalProvider for TestReportProvider {
    fn name(&self) -> String {
        format!("tests:{}", self.path.display())
    }

    fn kind(&self) -> SignalKind {
        SignalKind::TestResults
    }

    async fn fetch(&self, _since: DateTime<Utc>) -> Result<SignalValue> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read test report {}", self.path.display()))?;
        let tally: TestTally = serde_json::from_str(&contents).context("Failed to parse test report")?;
        Ok(SignalValue::TestResults {
            passed: tally.passed,
            failed: tally.failed,
        })
    }
}

/// Providers enabled by the configuration
pub fn providers_from_config(config: &SignalConfig) -> Vec<Box<dyn SignalProvider>> {
    let mut providers: Vec<Box<dyn SignalProvider>> = Vec::new();
    if let Some(repo) = &config.git_repo {
        providers.push(Box::new(GitCommitProvider::new(repo.clone())));
    }
    if let Some(report) = &config.test_report {
        providers.push(Box::new(TestReportProvider::new(report.clone())));
    }
    providers
}
