use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(
    name = "docwell",
    about = "Find the passages in your documents that answer a question"
)]
pub struct Cli {
    /// Directory containing the source documents
    #[arg(long, global = true)]
    pub input_dir: Option<PathBuf>,

    /// Directory holding the persisted index (defaults to XDG data home)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Target tokens per chunk (0 disables smart chunking)
    #[arg(long, global = true)]
    pub chunk_tokens: Option<usize>,

    /// Neighbouring chunks added around each hit (0 disables expansion)
    #[arg(long, global = true)]
    pub window: Option<usize>,

    /// Words per chunk for text files when smart chunking is disabled
    #[arg(long, global = true)]
    pub chunk_words: Option<usize>,

    /// Chunks per embedding call while building
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            input_dir: self.input_dir.clone(),
            data_dir: self.data_dir.clone(),
            chunk_tokens: self.chunk_tokens,
            window: self.window,
            chunk_words: self.chunk_words,
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the index, building it first if it does not exist
    Index(IndexArgs),
    /// Retrieve the passages most relevant to a query
    Search(SearchArgs),
    /// Show configuration and index statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Discard any existing index and rebuild from the input directory
    #[arg(long)]
    pub force: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of nearest chunks to retrieve
    #[arg(short = 'n', long, default_value = "3")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docwell",
            &mut std::io::stdout(),
        );
    }
}
