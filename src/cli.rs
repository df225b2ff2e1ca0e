use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{embedding::EmbedderKind, search::DEFAULT_TOP_K};

#[derive(Debug, Parser)]
#[command(
    name = "docvec",
    about = "Incremental local vector index and semantic retrieval for your documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding backend
    #[arg(long, global = true, value_enum)]
    pub embedder: Option<EmbedderKind>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index new documents from the source folders
    Index(IndexArgs),
    /// Find the chunks most similar to a query
    Search(SearchArgs),
    /// Show index and configuration status
    Status(StatusArgs),
    /// Manage persistent settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Source folder to index (repeatable; defaults to the OneDrive folder)
    #[arg(short, long = "source")]
    pub sources: Vec<PathBuf>,

    /// Glob of root-relative paths to skip (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Re-index files that are already indexed
    #[arg(long)]
    pub force: bool,

    /// Files per batch; the index is saved after each batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between files, in milliseconds
    #[arg(long)]
    pub file_delay_ms: Option<u64>,

    /// Pause between batches, in milliseconds
    #[arg(long)]
    pub batch_cooldown_ms: Option<u64>,

    /// Maximum chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by adjacent chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_K)]
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

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show stored settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// Setting name (e.g. batch_size, source_roots, embedder)
        key: String,
        /// New value
        value: String,
    },
    /// Remove a stored setting (revert to default)
    Unset {
        /// Setting name
        key: String,
    },
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
            "docvec",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docvec", "search", "cancer treatment"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "cancer treatment");
                assert_eq!(args.count, DEFAULT_TOP_K);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
        assert!(cli.embedder.is_none());
    }

    #[test]
    fn parse_index_flags() {
        let cli = Cli::parse_from([
            "docvec",
            "--embedder",
            "hashing",
            "index",
            "-s",
            "/a",
            "--source",
            "/b",
            "--exclude",
            "drafts/**",
            "--batch-size",
            "5",
            "--force",
        ]);
        assert_eq!(cli.embedder, Some(EmbedderKind::Hashing));
        match cli.command {
            Command::Index(args) => {
                assert_eq!(
                    args.sources,
                    vec![PathBuf::from("/a"), PathBuf::from("/b")]
                );
                assert_eq!(args.exclude, vec!["drafts/**"]);
                assert_eq!(args.batch_size, Some(5));
                assert!(args.force);
                assert!(args.file_delay_ms.is_none());
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["docvec", "-q", "-v", "status"]).is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
