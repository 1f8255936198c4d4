//! repowiki - keeps a repository wiki up to date after every commit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repowiki::cli;
use repowiki::cli::enable::EnableOptions;
use repowiki::cli::run::UpdateOptions;
use repowiki::Error;

#[derive(Parser)]
#[command(name = "repowiki")]
#[command(about = "Auto-generate and update a repository wiki on every commit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the post-commit hook and write the config
    Enable {
        /// Generation engine: qoder, claude-code, codex
        #[arg(long)]
        engine: Option<String>,

        /// Path to the engine binary
        #[arg(long)]
        engine_path: Option<PathBuf>,

        /// Model name (engine-specific)
        #[arg(long)]
        model: Option<String>,

        /// Reinstall the hook even if present
        #[arg(long)]
        force: bool,

        /// Don't auto-commit wiki changes
        #[arg(long)]
        no_auto_commit: bool,
    },

    /// Remove the post-commit hook
    Disable,

    /// Show configuration, hook and wiki status
    Status,

    /// Regenerate the whole wiki
    Generate,

    /// Update the wiki for recent changes
    Update {
        /// Commit to document (defaults to HEAD)
        #[arg(long, conflicts_with = "since_last")]
        commit: Option<String>,

        /// Cover everything since the last processed commit
        #[arg(long)]
        since_last: bool,

        /// Internal: invoked by the post-commit hook
        #[arg(long, hide = true)]
        from_hook: bool,
    },

    /// Print the latest run log
    Logs,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repowiki=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Enable {
            engine,
            engine_path,
            model,
            force,
            no_auto_commit,
        } => cli::enable::run(EnableOptions {
            engine,
            engine_path,
            model,
            force,
            no_auto_commit,
        }),
        Commands::Disable => cli::disable::run(),
        Commands::Status => cli::status::run(),
        Commands::Generate => cli::run::generate().await,
        Commands::Update {
            commit,
            since_last,
            from_hook,
        } => {
            cli::run::update(UpdateOptions {
                commit,
                since_last,
                from_hook,
            })
            .await
        }
        Commands::Logs => cli::logs::run(),
    }
}
