use std::path::PathBuf;

use bulkup_protocol::UploadMode;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch file and directory uploads", long_about = None)]
pub struct Cli {
    /// Config file to use instead of the per-user default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a directory tree without uploading anything.
    Scan {
        dir: PathBuf,
        /// Apply only the hard limits used for background imports.
        #[arg(long)]
        unattended: bool,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Upload a directory tree into a local receiver directory.
    Upload(UploadArgs),
    /// Print the effective configuration.
    Config {
        /// Write it to the config file.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub dir: PathBuf,
    /// Receiver directory the files are reassembled in.
    #[arg(long = "into")]
    pub into: PathBuf,
    /// Destination prefix inside the receiver.
    #[arg(long)]
    pub dest: Option<String>,
    #[arg(long)]
    pub unattended: bool,
    /// Upload size-warned files without asking.
    #[arg(short, long)]
    pub yes: bool,
    /// Number of transfer workers.
    #[arg(short = 'c', long)]
    pub workers: Option<usize>,
    /// Re-upload failed files this many times, each in a new transaction.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
    /// Hide the progress bar.
    #[arg(short, long)]
    pub quiet: bool,
}

/// `--unattended` overrides the configured mode.
pub fn mode_for(unattended: bool, configured: UploadMode) -> UploadMode {
    if unattended {
        UploadMode::Unattended
    } else {
        configured
    }
}
