//! Porter CLI - command-line runner for tracker migrations.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use porter::{EntityKind, StopSignal};
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;

#[derive(Parser)]
#[command(name = "porter")]
#[command(version)]
#[command(about = "Staged, resumable issue tracker migration")]
#[command(
    long_about = "Porter moves accounts, projects, issues and issue links from Yandex Tracker \
to YouTrack, one stage at a time. Every stage records what it migrated in a JSON \
mapping file, so an interrupted run can be resumed and a finished one re-run \
without creating duplicates."
)]
#[command(after_long_help = r#"EXAMPLES
    Write an example configuration file:
        $ porter init

    Run every stage in order:
        $ porter run

    Continue after an interruption, skipping completed stages:
        $ porter run --resume

    Run only the links stage:
        $ porter run --stage links

    Check which issues still have no mapping, then retry two of them:
        $ porter verify --stage work-items
        $ porter run --stage work-items --only OPS-12,OPS-40

    Show progress without touching either system:
        $ porter status

CONFIGURATION
    Porter reads configuration from:
      1. ~/.config/porter/config.toml (or $XDG_CONFIG_HOME/porter/config.toml)
      2. ./porter.toml
      3. Environment variables (PORTER_* prefix, sections separated by __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    PORTER_SOURCE__TOKEN              Tracker OAuth token
    PORTER_SOURCE__ORG_ID             Tracker organization id
    PORTER_SOURCE__CLOUD_ORG          Send X-Cloud-Org-Id instead of X-Org-ID (true/false)
    PORTER_TARGET__URL                YouTrack base URL
    PORTER_TARGET__TOKEN              YouTrack permanent token
    PORTER_MIGRATION__STATE_DIR       Directory for mapping files (default: .)
    PORTER_MIGRATION__REQUEST_DELAY_MS  Pause after every request (default: 500)
"#)]
struct Cli {
    /// Directory holding the mapping files (overrides migration.state_dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate data stage by stage
    Run {
        /// Run a single stage (accounts, projects, work-items, links)
        #[arg(long)]
        stage: Option<EntityKind>,

        /// Skip stages already marked completed
        #[arg(long)]
        resume: bool,

        /// Only process these source ids (repeatable or comma-separated)
        #[arg(long, requires = "stage", value_name = "ID")]
        only: Vec<String>,

        /// Stop a stage after more than this many record errors
        #[arg(long, value_name = "COUNT")]
        error_threshold: Option<usize>,

        /// Do not copy comments onto new work items
        #[arg(long)]
        no_comments: bool,
    },
    /// Show per-stage progress from the mapping files
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Compare source listings with the mapping files
    Verify {
        /// Verify a single stage (default: accounts, projects and work-items)
        #[arg(long)]
        stage: Option<EntityKind>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Write an example configuration file
    Init {
        /// Where to write it
        #[arg(long, default_value = config::LOCAL_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man pages
    Man {
        /// Output directory (prints the main page to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Ctrl+C asks the running stage to stop after the current record
    let stop = StopSignal::new();
    shutdown::setup_shutdown_handler(stop.clone());

    // Structured logging only when not attached to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("porter=info,porter_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    // Config file -> env vars -> defaults, then CLI flags on top
    let mut config = config::Config::load();
    if let Some(dir) = cli.state_dir {
        config.migration.state_dir = dir;
    }

    match cli.command {
        Commands::Run {
            stage,
            resume,
            only,
            error_threshold,
            no_comments,
        } => {
            if error_threshold.is_some() {
                config.migration.error_threshold = error_threshold;
            }
            if no_comments {
                config.migration.migrate_comments = false;
            }
            commands::run::handle_run(&config, stage, resume, only, stop).await?;
        }
        Commands::Status { output } => {
            commands::status::handle_status(&config, output)?;
        }
        Commands::Verify { stage, output } => {
            commands::verify::handle_verify(&config, stage, output).await?;
        }
        Commands::Init { path, force } => {
            commands::init::handle_init(&path, force)?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
        }
    }

    Ok(())
}
