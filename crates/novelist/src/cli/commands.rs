//! Command-line argument definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use novelist_core::NovelistConfig;
use std::path::PathBuf;

/// Generate spin-off novels from a source text.
#[derive(Parser, Debug)]
#[command(name = "novelist")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "NOVELIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding run state (overrides run.state_dir)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a run, or resume the run named by --run-id
    Run(RunArgs),

    /// Show phase, concept statuses, scores and draft counts of a run
    Status {
        /// Run to inspect
        #[arg(long)]
        run_id: String,
    },

    /// Reopen a failed or paused concept and resume its run
    Retry {
        /// Run containing the concept
        #[arg(long)]
        run_id: String,

        /// Concept to reopen (`idea-003` or `3`)
        #[arg(long)]
        concept: String,
    },
}

/// Arguments of the `run` command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Source novel as a UTF-8 text file
    #[arg(short, long)]
    pub source: PathBuf,

    /// Title of the source (defaults to the file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Author of the source
    #[arg(long)]
    pub author: Option<String>,

    /// Number of concepts to generate
    #[arg(short, long)]
    pub num_ideas: Option<u32>,

    /// Number of concepts to refine (defaults to --num-ideas)
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Maximum drafts per concept
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Concepts refined concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Ask for a source summary before generating concepts
    #[arg(long)]
    pub summarize: bool,

    /// JSON file of example concepts to steer away from
    #[arg(long)]
    pub seed_ideas: Option<PathBuf>,

    /// Run identifier; an existing run with this id is resumed
    #[arg(long)]
    pub run_id: Option<String>,
}

impl RunArgs {
    /// Applies command-line overrides to `config`.
    pub fn apply(&self, config: &mut NovelistConfig) {
        if let Some(n) = self.num_ideas {
            config.run.num_ideas = n;
        }
        if let Some(k) = self.top_k {
            config.run.select_top_k = Some(k);
        }
        if let Some(n) = self.max_iterations {
            config.run.max_iterations = n;
        }
        if let Some(n) = self.workers {
            config.run.workers = n;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if self.summarize {
            config.run.summarize_source = true;
        }
    }
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}
