use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dubber")]
#[command(author, version, about = "Video dubbing pipeline orchestrator")]
pub struct Cli {
    /// Path to config file (defaults to ./config.toml when present)
    #[arg(short, long, global = true, env = "DUBBER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the HTTP gateway (the default)
    Serve,

    /// Dub a single video and exit
    Run {
        /// Input video file
        input: PathBuf,

        /// Where to write the dubbed video
        output: PathBuf,

        /// Use the higher-quality lip-sync model
        #[arg(long)]
        hd: bool,

        /// Skip the service health check
        #[arg(long)]
        skip_health: bool,
    },
}
