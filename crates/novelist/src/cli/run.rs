//! Run and retry command handlers.

use super::RunArgs;
use anyhow::Context;
use novelist_core::{ConceptId, NovelistConfig, RunId};
use novelist_interface::RunStore;
use novelist_models::OpenAICompatibleClient;
use novelist_pipeline::{RunCoordinator, RunRequest, RunSummary};
use novelist_storage::{FileRunStore, TextFileSource};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// How a command ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Work finished
    Success,
    /// Interrupted; rerun with the same run id to continue
    Paused,
}

impl CommandOutcome {
    /// Process exit code.
    pub fn exit_code(self) -> u8 {
        match self {
            CommandOutcome::Success => 0,
            CommandOutcome::Paused => 3,
        }
    }
}

/// Loads configuration from `path`, or from the user config directory when
/// no path is given and `novelist/novelist.toml` exists there.
///
/// `state_dir` overrides `run.state_dir`.
pub fn load_config(path: Option<&Path>, state_dir: Option<&Path>) -> anyhow::Result<NovelistConfig> {
    let default_path = dirs::config_dir()
        .map(|dir| dir.join("novelist").join("novelist.toml"))
        .filter(|candidate| candidate.is_file());
    let path = path.map(Path::to_path_buf).or(default_path);

    let mut config = NovelistConfig::load(path.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    if let Some(dir) = state_dir {
        config.run.state_dir = dir.to_path_buf();
    }
    Ok(config)
}

/// Reads example concepts from a JSON file holding an array or one object.
pub fn load_seed_ideas(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed ideas from {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Seed ideas in {} are not valid JSON", path.display()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        other => anyhow::bail!(
            "Seed ideas must be a JSON array or object, found {}",
            json_type(&other)
        ),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parses a run id given on the command line.
fn parse_run_id(raw: &str) -> anyhow::Result<RunId> {
    raw.parse::<RunId>()
        .with_context(|| format!("Invalid run id '{}'", raw))
}

/// Cancels `token` on Ctrl+C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, pausing after in-flight requests");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });
}

/// Builds a coordinator over the file store with Ctrl+C wired to
/// cancellation.
fn build_coordinator(
    config: &NovelistConfig,
    source: TextFileSource,
    store: Arc<FileRunStore>,
) -> anyhow::Result<RunCoordinator> {
    let driver = OpenAICompatibleClient::from_env(&config.llm)
        .context("Failed to create completion client")?;
    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());
    Ok(RunCoordinator::new(Arc::new(driver), Arc::new(source), store).with_cancellation(token))
}

/// Runs the coordinator until it completes, pauses or fails.
async fn drive(coordinator: &RunCoordinator, request: RunRequest) -> anyhow::Result<CommandOutcome> {
    let summary = coordinator.run(request).await?;
    print_summary(&summary);

    if summary.paused {
        Ok(CommandOutcome::Paused)
    } else {
        Ok(CommandOutcome::Success)
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} reached phase {}", summary.run_id, summary.phase);
    println!("  completed: {}", summary.completed.len());
    for (id, reason) in &summary.failed {
        println!("  failed {}: {}", id, reason);
    }
    if summary.paused {
        println!(
            "Paused. Resume with: novelist run --run-id {} --source <path>",
            summary.run_id
        );
    }
}

/// Handle `novelist run`.
#[instrument(skip_all, fields(source = %args.source.display()))]
pub async fn handle_run_command(
    args: RunArgs,
    mut config: NovelistConfig,
) -> anyhow::Result<CommandOutcome> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let run_id = match &args.run_id {
        Some(raw) => parse_run_id(raw)?,
        None => RunId::generate(),
    };
    let store = Arc::new(FileRunStore::new(config.run.state_dir.clone()));
    let existing = store.load_state(&run_id).await?;

    let seeds = match &args.seed_ideas {
        Some(path) => load_seed_ideas(path)?,
        None => Vec::new(),
    };

    // A resumed run keeps its own endpoint settings.
    let driver_config = match &existing {
        Some(state) => {
            info!(run_id = %run_id, phase = %state.phase(), "Resuming run");
            state.config().clone()
        }
        None => {
            info!(run_id = %run_id, "Starting run");
            config.clone()
        }
    };

    let mut source = TextFileSource::new();
    let title = args
        .title
        .clone()
        .or_else(|| existing.as_ref().and_then(|s| s.source_title().clone()));
    if let Some(title) = title {
        source = source.with_title(title);
    }
    if let Some(author) = &args.author {
        source = source.with_author(author.clone());
    }

    let identifier = source_identifier(&args.source);
    let request = RunRequest::new(run_id, identifier, config).with_seed_concepts(seeds);
    let coordinator = build_coordinator(&driver_config, source, store)?;
    drive(&coordinator, request).await
}

/// Handle `novelist retry`.
#[instrument(skip(config))]
pub async fn handle_retry_command(
    run_id: &str,
    concept: &str,
    config: NovelistConfig,
) -> anyhow::Result<CommandOutcome> {
    let run_id = parse_run_id(run_id)?;
    let concept_id: ConceptId = concept
        .parse()
        .with_context(|| format!("Invalid concept id '{}'", concept))?;

    let store = Arc::new(FileRunStore::new(config.run.state_dir.clone()));
    let state = store
        .load_state(&run_id)
        .await?
        .with_context(|| format!("Run {} not found in {}", run_id, store.root().display()))?;

    let mut source = TextFileSource::new();
    if let Some(title) = state.source_title() {
        source = source.with_title(title.clone());
    }
    let coordinator = build_coordinator(state.config(), source, store)?;
    let state = coordinator.reopen(&run_id, concept_id).await?;
    info!(concept_id = %concept_id, "Concept reopened, resuming run");

    let request = RunRequest::new(
        run_id,
        state.source_identifier().clone(),
        state.config().clone(),
    );
    drive(&coordinator, request).await
}

fn source_identifier(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}
