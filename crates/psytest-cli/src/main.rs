//! psytest CLI — take and manage timed test sessions from a terminal.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use psytest_core::model::TestKind;

mod commands;

#[derive(Parser)]
#[command(name = "psytest", version, about = "Timed CMT and 16PF test sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Identifies one session.
#[derive(Args)]
struct SessionArgs {
    /// Test type: cmt or 16pf
    #[arg(long)]
    test: TestKind,

    /// Access token issued for the candidate
    #[arg(long)]
    token: String,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a test interactively
    Take(SessionArgs),

    /// Show countdown and progress of a session
    Status(SessionArgs),

    /// Submit the locally saved answers
    Submit(SessionArgs),

    /// Delete the locally saved answers of a session
    Clear(SessionArgs),

    /// List sessions with locally saved answers
    Sessions {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config file
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,psytest=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take(args) => commands::take::execute(args.test, args.token, args.config).await,
        Commands::Status(args) => {
            commands::status::execute(args.test, args.token, args.config).await
        }
        Commands::Submit(args) => {
            commands::submit::execute(args.test, args.token, args.config).await
        }
        Commands::Clear(args) => commands::clear::execute(args.test, args.token, args.config),
        Commands::Sessions { config } => commands::sessions::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
