use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "decant", version, about = "Batch-convert encrypted media containers into plain media files")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert every container in SOURCE not yet present in DESTINATION
    Convert {
        #[command(flatten)]
        directories: Directories,

        /// Parent directory for private scratch space (defaults to the system temporary directory)
        #[arg(long)]
        scratch: Option<PathBuf>,

        /// Decoder program to run instead of searching PATH
        #[arg(long)]
        decoder: Option<PathBuf>,

        /// Container extension to look for
        #[arg(long)]
        extension: Option<String>,
    },

    /// Show which files would be converted and which skipped
    Plan {
        #[command(flatten)]
        directories: Directories,

        /// Container extension to look for
        #[arg(long)]
        extension: Option<String>,
    },

    /// Show the remembered source and destination directories
    LastUsed,
}

#[derive(Debug, Args)]
pub struct Directories {
    /// Directory holding the encrypted containers (defaults to the last used)
    pub source: Option<PathBuf>,

    /// Directory to write converted files into (defaults to the last used)
    pub destination: Option<PathBuf>,
}
