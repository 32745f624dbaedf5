use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shoebox", version)]
#[command(about = "Back up a local media tree to S3-compatible object storage")]
pub struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true, value_name = "PATH", env = "SHOEBOX_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the configured bucket is reachable
    Probe,
    /// Inventory the backup root and print totals
    Scan(ScanArgs),
    /// Compare the backup root against the bucket, printing events as JSON lines
    Check(ScanArgs),
    /// Upload the backup root (or part of it), printing events as JSON lines
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Skip unreadable entries instead of aborting
    #[arg(long)]
    pub skip_errors: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    /// Only upload this folder, relative to the backup root
    #[arg(long, value_name = "REL")]
    pub folder: Option<String>,
    /// Flatten keys to <timestamp>_<name> instead of keeping relative paths
    #[arg(long)]
    pub flat: bool,
    /// Delete local files once they're uploaded
    #[arg(long)]
    pub delete: bool,
    /// Opaque id echoed back on upload events (repeatable)
    #[arg(long = "context", value_name = "ID")]
    pub context_ids: Vec<String>,
}
