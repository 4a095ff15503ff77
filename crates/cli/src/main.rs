//! filewatch CLI - fw command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod settings;

/// fw - stream file changes under a path
#[derive(Parser)]
#[command(name = "fw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $FILEWATCH_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print changes under a file or directory until interrupted
    Watch {
        /// File or directory to watch
        path: PathBuf,

        /// One JSON object per line instead of text
        #[arg(long)]
        json: bool,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Use the polling backend instead of the native one
        #[arg(long)]
        poll: bool,
    },
    /// Show configuration
    Config {
        /// Print a documented example config
        #[arg(long, conflicts_with_all = ["path", "show"])]
        example: bool,

        /// Print which config file is in effect
        #[arg(long, conflicts_with = "show")]
        path: bool,

        /// Print the effective configuration (default)
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Events go to stdout; keep logs out of the way
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            path,
            json,
            count,
            poll,
        } => cmd::watch::run(path, cli.config, json, count, poll).await,
        Commands::Config {
            example,
            path,
            show: _,
        } => {
            if example {
                cmd::config::run_example()
            } else if path {
                cmd::config::run_path(cli.config)
            } else {
                cmd::config::run_show(cli.config)
            }
        }
    }
}
