//! CLI interface for path-engine

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapter::AdaptationProposal;
use crate::config::{self, Config};
use crate::cycle::{self, EvaluationCycle};
use crate::evaluator::EvaluationResult;
use crate::memory::MemoryStore;
use crate::reporter::render;
use crate::types::{DecisionStatus, DecisionType, ProgressEvent, Scope};

#[derive(Parser)]
#[command(name = "path-engine")]
#[command(about = "Evaluate learner progress and propose curriculum adjustments", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the profile and the progress and decision logs
    #[arg(long, global = true, env = "PATH_ENGINE_MEMORY_DIR")]
    memory_dir: Option<PathBuf>,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score recent progress; exits 1 unless the status is excellent or on_track
    Evaluate {
        /// Window scope: week, month or overall
        #[arg(long, default_value = "week")]
        scope: Scope,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Append the result to the progress log as an `evaluation` event
        #[arg(long)]
        save: bool,
    },
    /// Propose curriculum adjustments from an evaluation
    Adapt {
        /// Print proposals as JSON
        #[arg(long)]
        json: bool,
        /// Append proposals to the decision log with status `proposed`
        #[arg(long)]
        save: bool,
        /// Use a saved evaluation instead of evaluating now
        #[arg(long)]
        eval_file: Option<PathBuf>,
    },
    /// Render the tracker document
    Report {
        /// Write the tracker file
        #[arg(long)]
        update_tracker: bool,
        /// Print the document as JSON
        #[arg(long)]
        json: bool,
        /// Use a saved evaluation instead of the latest persisted one
        #[arg(long)]
        eval_file: Option<PathBuf>,
    },
    /// Append a progress event
    Log {
        /// Event tag, e.g. task_completed, blocker, journal_entry
        event: String,
        /// Free-form message
        #[arg(short, long)]
        message: Option<String>,
        /// Metadata entry as key=value (repeatable); values are parsed as JSON when possible
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Record a decision on a proposal (approval step)
    Decide {
        /// level_change, remediation_week, month_reorder or project_swap
        decision_type: DecisionType,
        /// proposed, approved, rejected or applied
        status: DecisionStatus,
        /// Why the decision was taken
        #[arg(short, long)]
        rationale: String,
        /// Details as a JSON object
        #[arg(long)]
        details: Option<String>,
    },
    /// Show or initialize configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

/// Effective configuration and the store it points at
fn load_context(explicit: Option<&Path>, memory_dir: Option<PathBuf>) -> Result<(Config, MemoryStore)> {
    let mut config = Config::load(explicit)?;
    if let Some(dir) = memory_dir {
        config.paths.memory_dir = dir;
    }
    let store = MemoryStore::with_dir(&config.paths.memory_dir);
    Ok((config, store))
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Evaluate { scope, json, save } => {
            let (config, store) = load_context(explicit, cli.memory_dir)?;
            let mut cycle = EvaluationCycle::load(store, config)?;
            let evaluation = cycle.evaluate(scope).await?.clone();
            if save {
                cycle.persist_evaluation()?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                print_evaluation(&evaluation);
                if save {
                    println!("\nEvaluation saved to {}", cycle.store().progress_log_path().display());
                }
            }
            return Ok(if evaluation.status.is_passing() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }
        Commands::Adapt { json, save, eval_file } => {
            let (config, store) = load_context(explicit, cli.memory_dir)?;
            let mut cycle = EvaluationCycle::load(store, config)?;
            match eval_file {
                Some(path) => {
                    let evaluation = EvaluationResult::load_file(&path)?;
                    cycle.use_evaluation(evaluation)?;
                }
                None => {
                    cycle.evaluate(Scope::Week).await?;
                }
            }
            let proposals = cycle.adapt()?.to_vec();
            if save {
                cycle.persist_proposals(Utc::now())?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&proposals)?);
            } else {
                print_proposals(&proposals);
                if save && !proposals.is_empty() {
                    println!("\n{} proposal(s) saved to the decision log", proposals.len());
                }
            }
        }
        Commands::Report { update_tracker, json, eval_file } => {
            let (config, store) = load_context(explicit, cli.memory_dir)?;
            let mut cycle = EvaluationCycle::load(store, config)?;
            let evaluation = match eval_file {
                Some(path) => Some(EvaluationResult::load_file(&path)?),
                None => cycle.latest_evaluation(),
            };
            match evaluation {
                Some(evaluation) => {
                    cycle.use_evaluation(evaluation)?;
                }
                None => {
                    cycle.evaluate(Scope::Week).await?;
                }
            }
            cycle.adapt()?;

            let document = cycle.report();
            if json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                println!("{}", document.render_markdown());
            }
            if update_tracker {
                let path = cycle.write_tracker(&document)?;
                eprintln!("Tracker updated: {}", path.display());
            }
        }
        Commands::Log { event, message, meta } => {
            let (_, store) = load_context(explicit, cli.memory_dir)?;
            let mut progress = ProgressEvent::new(event, message);
            if !meta.is_empty() {
                progress = progress.with_metadata(parse_meta(&meta)?);
            }
            store.append_event(&progress)?;
            println!("Logged '{}' at {}", progress.event, crate::types::timestamp::format(&progress.timestamp));
        }
        Commands::Decide { decision_type, status, rationale, details } => {
            let details = match details {
                Some(raw) => {
                    let value: serde_json::Value =
                        serde_json::from_str(&raw).context("--details must be a JSON object")?;
                    if !value.is_object() {
                        bail!("--details must be a JSON object");
                    }
                    value
                }
                None => serde_json::json!({}),
            };
            let (_, store) = load_context(explicit, cli.memory_dir)?;
            let record = cycle::record_decision(&store, decision_type, status, &rationale, details)?;
            println!("Recorded {} {} decision", record.status, record.decision_type);
        }
        Commands::Config { show, init } => {
            return config_command(explicit, cli.memory_dir, show, init);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn config_command(
    explicit: Option<&Path>,
    memory_dir: Option<PathBuf>,
    show: bool,
    init: bool,
) -> Result<ExitCode> {
    if init {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => config::config_path()?,
        };
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        Config::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    if show {
        let mut config = Config::load(explicit)?;
        if let Some(dir) = memory_dir {
            config.paths.memory_dir = dir;
        }
        print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Configuration options:");
    println!("  --show    Print the effective configuration");
    println!("  --init    Write the default configuration file");
    println!();
    match config::config_path() {
        Ok(path) => println!("Default location: {}", path.display()),
        Err(e) => println!("Default location unavailable: {}", e),
    }
    Ok(ExitCode::SUCCESS)
}

/// Parse `key=value` pairs into a JSON object
fn parse_meta(pairs: &[String]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid --meta '{}', expected key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid --meta '{}', key is empty", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(serde_json::Value::Object(map))
}

fn print_evaluation(evaluation: &EvaluationResult) {
    println!(
        "Evaluation for {} ({}), scope {}",
        evaluation.learner_id, evaluation.level, evaluation.signals.scope
    );
    println!();
    for (dimension, score) in &evaluation.scores {
        println!("  {:<11} {} {:>5.1}", dimension.label(), render::bar(*score, 20), score);
    }
    println!();
    println!("Overall: {:.1} ({})", evaluation.overall, evaluation.status.label());
    println!(
        "Trend:   {} ({} recent / {} prior events)",
        evaluation.signals.trend, evaluation.signals.recent_events, evaluation.signals.prior_events
    );
    if evaluation.signals.neutral_default {
        println!("No activity logged yet; all dimensions use the neutral default.");
    }
    if !evaluation.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for rec in &evaluation.recommendations {
            println!("  - {}", rec);
        }
    }
    for degraded in &evaluation.signals.degraded {
        println!("Signal '{}' unavailable: {}", degraded.provider, degraded.reason);
    }
    if evaluation.signals.best_practices > 0 {
        println!("Best practices captured: {}", evaluation.signals.best_practices);
    }
    if evaluation.signals.skipped_log_lines > 0 {
        println!("Skipped {} malformed log line(s)", evaluation.signals.skipped_log_lines);
    }
}

fn print_proposals(proposals: &[AdaptationProposal]) {
    if proposals.is_empty() {
        println!("No adaptations needed.");
        return;
    }
    println!("{} proposal(s):", proposals.len());
    for (i, proposal) in proposals.iter().enumerate() {
        println!();
        println!("{}. {} [{}]", i + 1, proposal.proposal_type.label(), proposal.priority);
        println!("   Rationale: {}", proposal.rationale);
        println!("   Impact:    {}", proposal.impact);
        println!(
            "   Approval:  {}",
            if proposal.requires_approval {
                "required"
            } else {
                "not required"
            }
        );
    }
}
