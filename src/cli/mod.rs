//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "recall",
    version,
    author = "neur0map",
    about = "Retrieval core for a personal knowledge assistant",
    long_about = "Recall routes a question to the right personal-data collections, searches them in \
                  parallel, fuses and balances the results, and renders a time-aware context for a \
                  language model to answer from."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/recall/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file ("fast", "thorough" or a declared one)
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the retrieval pipeline over documents loaded from a JSON file
    Query {
        /// Question to retrieve evidence for
        query: String,

        /// JSON file mapping collection names to document arrays
        #[arg(short, long, value_name = "FILE")]
        data: PathBuf,

        /// Maximum number of documents to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Stage to bypass (repeatable)
        #[arg(long = "skip-stage", value_name = "STAGE")]
        skip_stages: Vec<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a query is classified
    Analyze {
        /// Query text
        query: String,
    },

    /// Show which collections heuristic routing picks for a query
    Route {
        /// Query text
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section (e.g. "router")
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default configuration path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
