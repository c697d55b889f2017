use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "coinsmith-cli", version, about = "Coinsmith CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scripted session and print the final payload
    Play(commands::play::PlayArgs),
    /// Persisted streak and personal best
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Stored session results
    Results {
        #[command(subcommand)]
        action: commands::results::ResultsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so stdout stays machine-readable.
/// Filter with COINSMITH_LOG, e.g. `COINSMITH_LOG=coinsmith_core=debug`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("COINSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Play(args) => commands::play::run(args),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Results { action } => commands::results::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
