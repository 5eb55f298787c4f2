//! CLI parser and dispatch to command-specific modules.

mod init;
mod match_cmd;
mod source;
mod sync;
mod usage;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::llm::ModelId;

#[derive(Parser)]
#[command(name = "trailsync")]
#[command(about = "Mountain trail condition monitor")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage monitored sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Fetch sources, extract conditions and store them
    Sync {
        /// Only process this source ID
        #[arg(long)]
        source: Option<i32>,
        /// Model to use (overrides prompt files and config)
        #[arg(long, value_enum)]
        model: Option<ModelId>,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Extract even when the page is unchanged
        #[arg(long)]
        force: bool,
        /// Skip the confirmation prompt for --force
        #[arg(short, long)]
        yes: bool,
    },

    /// Show recent LLM usage and cost
    Usage {
        /// Only show this source ID
        #[arg(long)]
        source: Option<i32>,
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Preview how a candidate file would reconcile against stored records
    Match {
        /// Source ID whose stored records are matched
        #[arg(long)]
        source: i32,
        /// JSON file with candidate records
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Add a source
    Add {
        /// Display name of the publishing organization
        name: String,
        /// Prompt key (selects {id:03}_{key}.yaml)
        prompt_key: String,
        /// Page to fetch
        url: String,
        /// Explicit ID (defaults to the next free one)
        #[arg(long)]
        id: Option<i32>,
        /// Secondary URL shown to readers
        #[arg(long)]
        url2: Option<String>,
        /// Organization type (e.g. MUNICIPALITY, MOUNTAIN_HUT)
        #[arg(long)]
        organization: Option<String>,
        /// Data format (WEB or BLOG)
        #[arg(long)]
        format: Option<String>,
        /// Mountain area (e.g. OKUTAMA)
        #[arg(long)]
        area: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List sources
    List,
    /// Show one source
    Show {
        /// Source ID
        id: i32,
    },
}

/// Parse arguments, load settings and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Source { command } => match command {
            SourceCommands::Add {
                name,
                prompt_key,
                url,
                id,
                url2,
                organization,
                format,
                area,
                description,
            } => {
                source::cmd_source_add(
                    &settings,
                    source::NewSourceArgs {
                        name,
                        prompt_key,
                        url,
                        id,
                        url2,
                        organization,
                        format,
                        area,
                        description,
                    },
                )
                .await
            }
            SourceCommands::List => source::cmd_source_list(&settings).await,
            SourceCommands::Show { id } => source::cmd_source_show(&settings, id).await,
        },
        Commands::Sync {
            source,
            model,
            dry_run,
            force,
            yes,
        } => {
            sync::cmd_sync(
                &settings,
                &config,
                sync::SyncOptions {
                    source_id: source,
                    model,
                    dry_run,
                    force,
                    yes,
                },
            )
            .await
        }
        Commands::Usage { source, limit } => usage::cmd_usage(&settings, source, limit).await,
        Commands::Match { source, file } => {
            match_cmd::cmd_match(&settings, &config, source, &file).await
        }
    }
}
