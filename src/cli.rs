use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::IndexConfig;

#[derive(Debug, Parser)]
#[command(
    name = "irdex",
    version,
    about = "Inverted-index full-text search over a document tree"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// JSON index configuration (default: <data dir>/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Build the index from a document tree (full rebuild)
    Index(IndexArgs),
    /// Add, subtract or delete individual documents
    Update(UpdateArgs),
    /// Recount documents and compare them against the index
    Check(CheckArgs),
    /// Query the index
    Search(SearchArgs),
    /// Print both stores
    Dump,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Per-run overrides of the configuration file.
#[derive(Debug, Default, Args)]
pub struct ConfigOverrides {
    /// Fold word case when indexing
    #[arg(long)]
    pub ignore_case: bool,

    /// Minimum indexed word length
    #[arg(long)]
    pub min_word_size: Option<usize>,

    /// Words never indexed, as `|`-separated DOS patterns
    #[arg(long)]
    pub bad_words: Option<String>,

    /// Index each directory's files as one document
    #[arg(long)]
    pub dir_as_doc: bool,

    /// Suffix of files whose `<...>` markup is skipped (repeatable)
    #[arg(long = "skip-tags", value_name = "SUFFIX")]
    pub skip_tag_xml: Vec<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut IndexConfig) {
        if self.ignore_case {
            config.ignore_case = true;
        }
        if let Some(size) = self.min_word_size {
            config.min_word_size = size;
        }
        if let Some(bad_words) = &self.bad_words {
            config.bad_words = Some(bad_words.clone());
        }
        if self.dir_as_doc {
            config.dir_content_as_doc = true;
        }
        config.skip_tag_xml.extend(self.skip_tag_xml.iter().cloned());
    }
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Document tree (default: `directory` from the configuration)
    pub directory: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Files to (re)index
    #[arg(long, num_args = 1.., value_name = "FILE")]
    pub add: Vec<PathBuf>,

    /// Files whose word counts are subtracted
    #[arg(long = "sub", num_args = 1.., value_name = "FILE")]
    pub subtract: Vec<PathBuf>,

    /// Files removed from the index
    #[arg(long = "del", num_args = 1.., value_name = "FILE")]
    pub delete: Vec<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl UpdateArgs {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.subtract.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Document tree (default: `directory` from the configuration)
    pub directory: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Query: words, a wildcard pattern, or a boolean expression
    pub query: String,

    /// 1-based result page
    #[arg(short, long, default_value_t = 1)]
    pub page: usize,

    /// Results per page
    #[arg(short = 'n', long, default_value_t = 10)]
    pub per_page: usize,

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
            "irdex",
            &mut std::io::stdout(),
        );
    }
}
